//! User directory: id → username lookups for display.

use std::collections::HashMap;

use crate::models::{Conversation, User};

pub const UNKNOWN_PEER: &str = "Unknown User";
pub const UNKNOWN_SENDER: &str = "User";
pub const SELF_LABEL: &str = "Me";

/// Snapshot of `GET /users`, kept in fetch order for the new-chat picker.
#[derive(Debug, Clone, Default)]
pub struct Directory {
    users: Vec<User>,
    names: HashMap<String, String>,
}

impl Directory {
    pub fn from_users(users: Vec<User>) -> Self {
        let names = users
            .iter()
            .map(|u| (u.id.clone(), u.username.clone()))
            .collect();
        Self { users, names }
    }

    pub fn name_of(&self, user_id: &str) -> Option<&str> {
        self.names.get(user_id).map(String::as_str)
    }

    pub fn users(&self) -> &[User] {
        &self.users
    }

    /// Everyone except `me`, in directory order.
    pub fn others<'a>(&'a self, me: &'a str) -> impl Iterator<Item = &'a User> + 'a {
        self.users.iter().filter(move |u| u.id != me)
    }

    /// Resolve a user by exact id or exact username.
    pub fn resolve(&self, target: &str) -> Option<&User> {
        self.users
            .iter()
            .find(|u| u.id == target)
            .or_else(|| self.users.iter().find(|u| u.username == target))
    }

    /// Title shown for a conversation: the group name for groups, otherwise
    /// the other participant's username.
    pub fn conversation_name(&self, conv: &Conversation, me: &str) -> String {
        if conv.is_group {
            return conv.group_name.clone().unwrap_or_default();
        }
        conv.peer_of(me)
            .and_then(|peer| self.name_of(peer))
            .unwrap_or(UNKNOWN_PEER)
            .to_string()
    }

    /// Label shown above a message bubble.
    pub fn sender_label(&self, sender_id: &str, me: &str) -> String {
        if sender_id == me {
            return SELF_LABEL.to_string();
        }
        self.name_of(sender_id)
            .unwrap_or(UNKNOWN_SENDER)
            .to_string()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}
