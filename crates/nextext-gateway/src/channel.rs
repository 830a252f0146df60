use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use futures_util::stream::{SplitSink, SplitStream};
use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::{Mutex, mpsc, watch};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message as Frame;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async};
use tracing::{debug, info, warn};

use nextext_api::{ClientConfig, ClientError, Result, Session};
use nextext_types::events::OutboundMessage;
use nextext_types::models::{Message, UserId};

use crate::dispatcher::{Dispatcher, Subscription};

type Socket = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Lifecycle of the chat channel: Closed -> Connecting -> Open -> Closed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChannelState {
    Closed,
    Connecting,
    Open,
}

/// Owns the single live chat connection for a session.
///
/// There is no reconnect: after a transport failure the state returns to
/// `Closed` and stays there until [`ChannelManager::connect`] is called again.
/// Every transition into `Closed` ends all current subscriptions.
#[derive(Clone)]
pub struct ChannelManager {
    inner: Arc<ChannelInner>,
}

struct ChannelInner {
    config: ClientConfig,
    session: Session,
    dispatcher: Dispatcher,
    state: watch::Sender<ChannelState>,
    /// Bumped on every connect/close so a stale reader cannot mark a newer
    /// connection closed. Only changed while `link` is locked.
    generation: AtomicU64,
    link: Mutex<Option<Link>>,
}

impl ChannelInner {
    /// Publish `Closed` and tell every subscriber.
    fn mark_closed(&self) {
        self.state.send_replace(ChannelState::Closed);
        self.dispatcher.close_all();
    }
}

struct Link {
    outbound: mpsc::UnboundedSender<OutboundMessage>,
    reader: JoinHandle<()>,
    writer: JoinHandle<()>,
}

impl Link {
    fn abort(self) {
        self.reader.abort();
        self.writer.abort();
    }
}

impl ChannelManager {
    pub fn new(config: ClientConfig, session: Session) -> Self {
        let (state, _) = watch::channel(ChannelState::Closed);
        Self {
            inner: Arc::new(ChannelInner {
                config,
                session,
                dispatcher: Dispatcher::new(),
                state,
                generation: AtomicU64::new(0),
                link: Mutex::new(None),
            }),
        }
    }

    pub fn state(&self) -> ChannelState {
        *self.inner.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<ChannelState> {
        self.inner.state.subscribe()
    }

    pub fn dispatcher(&self) -> &Dispatcher {
        &self.inner.dispatcher
    }

    /// Register a conversation view's interest in `viewer_id <-> partner_id`
    /// traffic. Works in any state; events flow once the channel is open.
    pub fn subscribe(&self, viewer_id: UserId, partner_id: UserId) -> Subscription {
        self.inner.dispatcher.subscribe(viewer_id, partner_id)
    }

    /// Open the channel if it is not already open. Requires both a credential
    /// and an identity in the session.
    ///
    /// On failure the channel is `Closed` and every waiting subscription has
    /// been sent [`ConversationEvent::Closed`](nextext_types::events::ConversationEvent::Closed).
    pub async fn connect(&self) -> Result<()> {
        let mut link = self.inner.link.lock().await;
        if link.is_some() && self.state() == ChannelState::Open {
            return Ok(());
        }

        if let Some(stale) = link.take() {
            stale.abort();
        }

        match self.open_link().await {
            Ok(opened) => {
                *link = Some(opened);
                Ok(())
            }
            Err(e) => {
                warn!("Chat channel unavailable: {}", e);
                self.inner.mark_closed();
                Err(e)
            }
        }
    }

    /// Handshake and spawn the loops. Called with `link` locked.
    async fn open_link(&self) -> Result<Link> {
        let credential = self
            .inner
            .session
            .credential()
            .ok_or_else(|| ClientError::Channel("no credential".into()))?;
        let identity = self
            .inner
            .session
            .identity()
            .ok_or_else(|| ClientError::Channel("identity not loaded".into()))?;

        let url = self.inner.config.channel_url(credential.expose())?;
        self.inner.state.send_replace(ChannelState::Connecting);
        info!("{} ({}) connecting chat channel", identity.username, identity.id);

        let (socket, _) = connect_async(url.as_str())
            .await
            .map_err(|e| ClientError::Channel(e.to_string()))?;

        let generation = self.inner.generation.fetch_add(1, Ordering::AcqRel) + 1;
        let (sink, source) = socket.split();
        let (outbound, outbound_rx) = mpsc::unbounded_channel();

        self.inner.state.send_replace(ChannelState::Open);
        let writer = tokio::spawn(write_loop(sink, outbound_rx));
        let reader = tokio::spawn(read_loop(
            source,
            self.inner.dispatcher.clone(),
            Arc::downgrade(&self.inner),
            generation,
        ));

        info!("{} ({}) chat channel open", identity.username, identity.id);
        Ok(Link {
            outbound,
            reader,
            writer,
        })
    }

    /// Queue `content` for `partner_id`. Content is trimmed; an empty result
    /// is a no-op and returns `Ok(false)` without touching the channel.
    ///
    /// Nothing is added to any timeline here: the backend echoes the stored
    /// message back over the channel.
    pub async fn send(&self, partner_id: UserId, content: &str) -> Result<bool> {
        let content = content.trim();
        if content.is_empty() {
            return Ok(false);
        }

        let link = self.inner.link.lock().await;
        let link = match link.as_ref() {
            Some(link) if self.state() == ChannelState::Open => link,
            _ => return Err(ClientError::Channel("channel is not open".into())),
        };

        link.outbound
            .send(OutboundMessage {
                to: partner_id,
                content: content.to_string(),
            })
            .map_err(|_| ClientError::Channel("channel is closed".into()))?;
        debug!("Queued message for {}", partner_id);
        Ok(true)
    }

    /// Tear the connection down and end every subscription.
    pub async fn close(&self) {
        let mut link = self.inner.link.lock().await;
        self.inner.generation.fetch_add(1, Ordering::AcqRel);

        if let Some(Link {
            outbound, reader, ..
        }) = link.take()
        {
            reader.abort();
            // writer drains what is queued, then sends a close frame
            drop(outbound);
            info!("Chat channel closed");
        }

        self.inner.mark_closed();
    }
}

async fn write_loop(
    mut sink: SplitSink<Socket, Frame>,
    mut outbound: mpsc::UnboundedReceiver<OutboundMessage>,
) {
    while let Some(message) = outbound.recv().await {
        let text = match serde_json::to_string(&message) {
            Ok(text) => text,
            Err(e) => {
                warn!("Failed to encode outbound message: {}", e);
                continue;
            }
        };
        if let Err(e) = sink.send(Frame::text(text)).await {
            warn!("Chat channel write failed: {}", e);
            break;
        }
    }
    let _ = sink.close().await;
}

async fn read_loop(
    mut source: SplitStream<Socket>,
    dispatcher: Dispatcher,
    channel: Weak<ChannelInner>,
    generation: u64,
) {
    while let Some(frame) = source.next().await {
        match frame {
            Ok(Frame::Text(text)) => match serde_json::from_str::<Message>(text.as_str()) {
                Ok(message) => {
                    dispatcher.dispatch(&message);
                }
                Err(e) => {
                    let raw: String = text.chars().take(200).collect();
                    warn!("Ignoring malformed channel frame: {} -- raw: {}", e, raw);
                }
            },
            Ok(Frame::Close(_)) => break,
            Ok(_) => {}
            Err(e) => {
                warn!("Chat channel failed: {}", e);
                break;
            }
        }
    }

    let Some(channel) = channel.upgrade() else {
        return;
    };
    let mut link = channel.link.lock().await;
    // Only the connection that is still current may report the close.
    if channel.generation.load(Ordering::Acquire) != generation {
        return;
    }
    // dropping the outbound sender lets the writer finish and release the sink
    drop(link.take());
    channel.mark_closed();
    info!("Chat channel closed by peer");
}
