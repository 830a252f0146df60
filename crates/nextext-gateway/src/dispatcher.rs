use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use tokio::sync::mpsc;
use tracing::debug;
use uuid::Uuid;

use nextext_types::events::ConversationEvent;
use nextext_types::models::{Message, UserId};

/// Routes inbound channel messages to the conversation views that asked for
/// them. Each subscription is keyed by the (viewer, partner) pair it was
/// registered for; anything that matches no subscription is dropped.
#[derive(Clone, Default)]
pub struct Dispatcher {
    inner: Arc<DispatcherInner>,
}

#[derive(Default)]
struct DispatcherInner {
    /// subscription id -> route
    routes: RwLock<HashMap<Uuid, Route>>,
}

struct Route {
    viewer_id: UserId,
    partner_id: UserId,
    tx: mpsc::UnboundedSender<ConversationEvent>,
}

impl Dispatcher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register interest in messages between `viewer_id` and `partner_id`.
    /// Dropping the returned [`Subscription`] unregisters it.
    pub fn subscribe(&self, viewer_id: UserId, partner_id: UserId) -> Subscription {
        let id = Uuid::new_v4();
        let (tx, rx) = mpsc::unbounded_channel();
        self.inner
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(
                id,
                Route {
                    viewer_id,
                    partner_id,
                    tx,
                },
            );
        debug!("Subscribed {} to conversation {}<->{}", id, viewer_id, partner_id);

        Subscription {
            id,
            rx,
            dispatcher: self.clone(),
        }
    }

    pub fn unsubscribe(&self, id: Uuid) {
        let removed = self
            .inner
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(&id);
        if removed.is_some() {
            debug!("Unsubscribed {}", id);
        }
    }

    /// Deliver `message` to every matching subscription. Returns how many
    /// received it.
    pub fn dispatch(&self, message: &Message) -> usize {
        let routes = self.inner.routes.read().unwrap_or_else(PoisonError::into_inner);
        let mut delivered = 0;
        for route in routes.values() {
            if message.is_between(route.viewer_id, route.partner_id)
                && route.tx.send(ConversationEvent::Message(message.clone())).is_ok()
            {
                delivered += 1;
            }
        }

        if delivered == 0 {
            debug!(
                "Dropped message {} ({} -> {}): no active conversation",
                message.id, message.sender_id, message.recipient_id
            );
        }
        delivered
    }

    /// Tell every subscriber the channel is gone and forget them all.
    pub fn close_all(&self) {
        let routes: Vec<Route> = self
            .inner
            .routes
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .drain()
            .map(|(_, route)| route)
            .collect();
        for route in routes {
            let _ = route.tx.send(ConversationEvent::Closed);
        }
    }

    pub fn subscriber_count(&self) -> usize {
        self.inner.routes.read().unwrap_or_else(PoisonError::into_inner).len()
    }
}

/// One conversation view's feed of channel events.
pub struct Subscription {
    id: Uuid,
    rx: mpsc::UnboundedReceiver<ConversationEvent>,
    dispatcher: Dispatcher,
}

impl Subscription {
    /// Next event, or `None` once the subscription has been closed and
    /// drained.
    pub async fn recv(&mut self) -> Option<ConversationEvent> {
        self.rx.recv().await
    }

    /// Non-blocking variant of [`Subscription::recv`].
    pub fn try_recv(&mut self) -> Option<ConversationEvent> {
        self.rx.try_recv().ok()
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        self.dispatcher.unsubscribe(self.id);
    }
}
