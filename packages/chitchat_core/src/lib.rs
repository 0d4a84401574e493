//! Wire types, view rules, and validation for the chitchat client.
//!
//! Nothing in here touches the network or the filesystem; the `chitchat`
//! binary owns all I/O.

pub mod compose;
pub mod directory;
pub mod error;
pub mod filter;
pub mod models;
pub mod pending;
pub mod protocol;

pub use compose::{NewConversation, is_blank};
pub use directory::Directory;
pub use error::{ErrorDetail, ValidationError};
pub use filter::{ChatTab, filter_conversations};
pub use models::{Conversation, LoginResponse, Message, Session, User};
pub use pending::{PendingSend, PendingSends};
pub use protocol::{ClientFrame, ServerEvent, parse_server_event};
