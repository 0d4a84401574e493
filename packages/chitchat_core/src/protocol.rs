//! WebSocket frame types for `/ws/{user_id}`.

use serde::{Deserialize, Serialize};

use crate::models::Message;

/// Frames sent FROM the client TO the server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientFrame {
    Message {
        conversation_id: String,
        text: String,
        sender_id: String,
        /// Client-generated id used to reconcile the echo. Servers that don't
        /// know the field ignore it.
        #[serde(default, skip_serializing_if = "Option::is_none")]
        client_msg_id: Option<String>,
    },
}

/// Events pushed FROM the server TO the client.
#[derive(Debug, Clone, PartialEq)]
pub enum ServerEvent {
    NewMessage {
        conversation_id: String,
        message: Message,
    },
    NewChat {
        chat_id: Option<String>,
    },
    /// Any other `type`. Carries the type string for logging.
    Unknown(String),
}

#[derive(Debug, thiserror::Error)]
pub enum ProtocolError {
    #[error("malformed frame: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("frame has no \"type\" field")]
    MissingType,
}

#[derive(Deserialize)]
struct NewMessageFrame {
    conversation_id: String,
    message: Message,
}

#[derive(Deserialize)]
struct NewChatFrame {
    #[serde(default)]
    chat_id: Option<String>,
}

/// Decode one text frame.
///
/// Unrecognised event types decode to [`ServerEvent::Unknown`] rather than an
/// error so that newer servers don't break older clients. The embedded
/// message is stamped with the envelope's conversation id.
pub fn parse_server_event(text: &str) -> Result<ServerEvent, ProtocolError> {
    let value: serde_json::Value = serde_json::from_str(text)?;
    let kind = value
        .get("type")
        .and_then(|t| t.as_str())
        .ok_or(ProtocolError::MissingType)?
        .to_string();

    match kind.as_str() {
        "new_message" => {
            let frame: NewMessageFrame = serde_json::from_value(value)?;
            let message = frame.message.in_conversation(&frame.conversation_id);
            Ok(ServerEvent::NewMessage {
                conversation_id: frame.conversation_id,
                message,
            })
        }
        "new_chat" => {
            let frame: NewChatFrame = serde_json::from_value(value)?;
            Ok(ServerEvent::NewChat {
                chat_id: frame.chat_id,
            })
        }
        _ => Ok(ServerEvent::Unknown(kind)),
    }
}
