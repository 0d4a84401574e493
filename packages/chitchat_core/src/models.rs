//! Records exchanged with the chat backend.

use serde::{Deserialize, Serialize};

/// Directory entry from `GET /users`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub username: String,
}

/// Conversation summary from `GET /chat/recent/{user_id}`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversation {
    pub id: String,
    #[serde(default)]
    pub is_group: bool,
    #[serde(default)]
    pub group_name: Option<String>,
    #[serde(default)]
    pub participants: Vec<String>,
    /// Seconds. `None` until the first message is sent.
    #[serde(default)]
    pub last_message_at: Option<f64>,
}

impl Conversation {
    /// First participant that is not `me`.
    pub fn peer_of(&self, me: &str) -> Option<&str> {
        self.participants
            .iter()
            .map(String::as_str)
            .find(|p| *p != me)
    }

    pub fn activity_label(&self) -> &'static str {
        if self.last_message_at.is_some() {
            "Active recently"
        } else {
            "New chat"
        }
    }
}

/// A single chat message.
///
/// The backend omits `conversation_id` from history rows and from the body
/// of push envelopes, so it defaults to empty on decode and is filled in
/// with [`Message::in_conversation`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    #[serde(default)]
    pub conversation_id: String,
    pub sender_id: String,
    pub text: String,
    /// Seconds.
    #[serde(default)]
    pub timestamp: f64,
}

impl Message {
    pub fn in_conversation(mut self, conversation_id: &str) -> Self {
        if self.conversation_id.is_empty() {
            self.conversation_id = conversation_id.to_string();
        }
        self
    }
}

/// Body of `POST /auth/login` on success.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoginResponse {
    pub access_token: String,
    pub user_id: String,
    pub username: String,
}

/// Identity of the logged-in user, as persisted between runs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub username: String,
}

impl From<LoginResponse> for Session {
    fn from(resp: LoginResponse) -> Self {
        Self {
            token: resp.access_token,
            user_id: resp.user_id,
            username: resp.username,
        }
    }
}
