use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

/// Backend user ids are plain integers.
pub type UserId = i64;

/// The authenticated user. Fetched once per credential and immutable after.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Identity {
    pub id: UserId,
    pub username: String,
}

/// The other participant of a one-to-one conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConversationPartner {
    pub id: UserId,
    pub username: String,
}

impl ConversationPartner {
    /// Stand-in used when a partner lookup comes back empty, so the
    /// conversation stays usable.
    pub fn placeholder(id: UserId) -> Self {
        Self {
            id,
            username: format!("User {}", id),
        }
    }
}

/// A chat message as stored and relayed by the backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Message {
    pub id: i64,
    pub sender_id: UserId,
    pub recipient_id: UserId,
    pub content: String,
    /// ISO-8601, as emitted by the backend. Often lacks a UTC offset.
    pub timestamp: String,
}

impl Message {
    /// True when this message travels between `viewer` and `partner`, in
    /// either direction.
    pub fn is_between(&self, viewer: UserId, partner: UserId) -> bool {
        (self.sender_id == viewer && self.recipient_id == partner)
            || (self.sender_id == partner && self.recipient_id == viewer)
    }

    /// Parse the timestamp. Offset-less values are taken as UTC.
    pub fn sent_at(&self) -> Option<DateTime<Utc>> {
        self.timestamp
            .parse::<DateTime<Utc>>()
            .or_else(|_| {
                NaiveDateTime::parse_from_str(&self.timestamp, "%Y-%m-%dT%H:%M:%S%.f")
                    .map(|ndt| ndt.and_utc())
            })
            .ok()
    }
}
