use nextext_types::models::{ConversationPartner, UserId};

/// Users the viewer can start a conversation with.
#[derive(Debug, Clone, Default)]
pub struct ContactList {
    contacts: Vec<ConversationPartner>,
}

impl ContactList {
    /// Build from a user listing, leaving out the viewer's own entry.
    pub fn new(users: Vec<ConversationPartner>, viewer_id: UserId) -> Self {
        Self {
            contacts: users.into_iter().filter(|u| u.id != viewer_id).collect(),
        }
    }

    pub fn all(&self) -> &[ConversationPartner] {
        &self.contacts
    }

    pub fn len(&self) -> usize {
        self.contacts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.contacts.is_empty()
    }

    /// Case-insensitive substring match on username, in listing order.
    pub fn search(&self, text: &str) -> Vec<&ConversationPartner> {
        let needle = text.to_lowercase();
        self.contacts
            .iter()
            .filter(|c| c.username.to_lowercase().contains(&needle))
            .collect()
    }
}
