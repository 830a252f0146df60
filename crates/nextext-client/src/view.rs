use tracing::debug;

use nextext_api::Result;
use nextext_gateway::{Admission, ChannelManager, ChannelState, Conversation, Subscription};
use nextext_types::events::ConversationEvent;
use nextext_types::models::{ConversationPartner, Identity, Message};

/// An open conversation: its timeline plus the live subscription feeding it.
/// Dropping the view unsubscribes it; the channel itself stays up.
pub struct ConversationView {
    conversation: Conversation,
    subscription: Subscription,
    channel: ChannelManager,
}

impl ConversationView {
    pub(crate) fn new(
        conversation: Conversation,
        subscription: Subscription,
        channel: ChannelManager,
    ) -> Self {
        Self {
            conversation,
            subscription,
            channel,
        }
    }

    pub fn viewer(&self) -> &Identity {
        self.conversation.viewer()
    }

    pub fn partner(&self) -> &ConversationPartner {
        self.conversation.partner()
    }

    pub fn timeline(&self) -> &[Message] {
        self.conversation.timeline()
    }

    pub fn is_live(&self) -> bool {
        self.channel.state() == ChannelState::Open
    }

    /// Send to this conversation's partner. Blank content is a no-op
    /// (`Ok(false)`). The message shows up in the timeline when the backend
    /// echoes it back.
    pub async fn send(&self, content: &str) -> Result<bool> {
        self.channel.send(self.partner().id, content).await
    }

    /// Wait for the next message that lands in the timeline. `None` once the
    /// channel has closed.
    pub async fn next_message(&mut self) -> Option<Message> {
        loop {
            match self.subscription.recv().await? {
                ConversationEvent::Message(message) => {
                    if let Some(appended) = self.admit(message) {
                        return Some(appended);
                    }
                }
                ConversationEvent::Closed => return None,
            }
        }
    }

    /// Admit whatever is already queued without waiting. Returns the
    /// messages that were appended.
    pub fn drain_pending(&mut self) -> Vec<Message> {
        let mut appended = Vec::new();
        while let Some(event) = self.subscription.try_recv() {
            if let ConversationEvent::Message(message) = event {
                appended.extend(self.admit(message));
            }
        }
        appended
    }

    fn admit(&mut self, message: Message) -> Option<Message> {
        let id = message.id;
        match self.conversation.admit(message.clone()) {
            Admission::Appended => Some(message),
            other => {
                debug!("Message {} not appended: {:?}", id, other);
                None
            }
        }
    }
}
