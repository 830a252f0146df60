//! Per-conversation timeline: fetched history followed by live messages, in
//! arrival order, each message at most once.

use std::collections::HashSet;

use tracing::debug;

use nextext_types::models::{ConversationPartner, Identity, Message};

/// What [`Conversation::admit`] did with a message.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Appended to the end of the timeline.
    Appended,
    /// Already present (history overlap or a repeated echo).
    Duplicate,
    /// Not a message between the viewer and this partner.
    Rejected,
}

#[derive(Debug, Clone)]
pub struct Conversation {
    viewer: Identity,
    partner: ConversationPartner,
    timeline: Vec<Message>,
    seen: HashSet<i64>,
}

impl Conversation {
    pub fn new(viewer: Identity, partner: ConversationPartner) -> Self {
        Self {
            viewer,
            partner,
            timeline: Vec::new(),
            seen: HashSet::new(),
        }
    }

    pub fn viewer(&self) -> &Identity {
        &self.viewer
    }

    pub fn partner(&self) -> &ConversationPartner {
        &self.partner
    }

    pub fn timeline(&self) -> &[Message] {
        &self.timeline
    }

    /// Replace the timeline with `history` (oldest first).
    ///
    /// Seeding again resets the timeline to exactly the new history. Live
    /// messages that raced the fetch stay queued in the view's subscription
    /// and are offered through [`Conversation::admit`] afterwards, where any
    /// already in the history come back as duplicates.
    pub fn seed_history(&mut self, history: Vec<Message>) {
        self.timeline.clear();
        self.seen.clear();
        for message in history {
            if self.belongs(&message) && self.seen.insert(message.id) {
                self.timeline.push(message);
            }
        }
        debug!(
            "Seeded conversation with {}: {} messages",
            self.partner.id,
            self.timeline.len()
        );
    }

    /// Offer a live message. Ordering is arrival order; timestamps are never
    /// consulted.
    pub fn admit(&mut self, message: Message) -> Admission {
        if !self.belongs(&message) {
            return Admission::Rejected;
        }
        if self.seen.insert(message.id) {
            self.timeline.push(message);
            Admission::Appended
        } else {
            Admission::Duplicate
        }
    }

    fn belongs(&self, message: &Message) -> bool {
        message.is_between(self.viewer.id, self.partner.id)
    }
}
