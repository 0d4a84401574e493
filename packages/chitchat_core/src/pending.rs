//! Sent-but-unconfirmed messages.
//!
//! Sending is fire-and-forget; the authoritative copy comes back as a
//! `new_message` push. Each send is tracked here under a client-generated id
//! until its echo arrives.

use uuid::Uuid;

use crate::models::Message;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PendingSend {
    pub client_msg_id: String,
    pub conversation_id: String,
    pub text: String,
}

#[derive(Debug, Clone, Default)]
pub struct PendingSends {
    entries: Vec<PendingSend>,
}

impl PendingSends {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a send and return its client id.
    pub fn track(&mut self, conversation_id: &str, text: &str) -> String {
        let client_msg_id = Uuid::new_v4().to_string();
        self.entries.push(PendingSend {
            client_msg_id: client_msg_id.clone(),
            conversation_id: conversation_id.to_string(),
            text: text.to_string(),
        });
        client_msg_id
    }

    /// Drop a tracked send without an echo (e.g. the frame never left).
    pub fn forget(&mut self, client_msg_id: &str) {
        self.entries.retain(|p| p.client_msg_id != client_msg_id);
    }

    /// Match an authoritative message against the oldest pending send with the
    /// same conversation and text. Only messages from `me` can match.
    pub fn reconcile(&mut self, message: &Message, me: &str) -> Option<PendingSend> {
        if message.sender_id != me {
            return None;
        }
        let pos = self.entries.iter().position(|p| {
            p.conversation_id == message.conversation_id && p.text == message.text
        })?;
        Some(self.entries.remove(pos))
    }

    pub fn for_conversation<'a>(
        &'a self,
        conversation_id: &'a str,
    ) -> impl Iterator<Item = &'a PendingSend> + 'a {
        self.entries
            .iter()
            .filter(move |p| p.conversation_id == conversation_id)
    }

    pub fn drop_conversation(&mut self, conversation_id: &str) {
        self.entries.retain(|p| p.conversation_id != conversation_id);
    }

    /// Give up on every unconfirmed send, returning how many there were.
    pub fn abandon_all(&mut self) -> usize {
        let n = self.entries.len();
        self.entries.clear();
        n
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
