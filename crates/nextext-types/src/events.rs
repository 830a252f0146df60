use serde::{Deserialize, Serialize};

use crate::models::{Message, UserId};

/// Frame sent FROM client TO backend over the chat channel.
///
/// Inbound frames are bare [`Message`] objects, so there is no matching
/// inbound envelope type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OutboundMessage {
    pub to: UserId,
    pub content: String,
}

/// Events delivered to a single conversation subscription.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ConversationEvent {
    /// A channel message between the viewer and this conversation's partner.
    Message(Message),

    /// The underlying channel closed; no further messages will follow.
    Closed,
}
