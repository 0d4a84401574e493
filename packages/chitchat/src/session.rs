//! Persisted login: `session.toml` in the data directory.
//!
//! Holds three string entries (`token`, `user_id`, `username`). The token is
//! never inspected here; an expired token only shows up as a failed API call.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use chitchat_core::Session;

#[derive(Debug, Default, Serialize, Deserialize)]
struct StoredSession {
    #[serde(default)]
    token: Option<String>,
    #[serde(default)]
    user_id: Option<String>,
    #[serde(default)]
    username: Option<String>,
}

/// Explicit owner of the persisted session. Passed to whatever needs the
/// current identity instead of reading a global.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Read the stored session. `None` when there is no file or the token or
    /// user id is missing; callers must send the user to authentication.
    pub fn load(&self) -> Result<Option<Session>> {
        let raw = match std::fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => {
                return Err(e)
                    .with_context(|| format!("Failed to read session file {:?}", self.path));
            }
        };

        let stored: StoredSession = toml::from_str(&raw)
            .with_context(|| format!("Failed to parse session file {:?}", self.path))?;

        let token = stored.token.filter(|t| !t.is_empty());
        let user_id = stored.user_id.filter(|u| !u.is_empty());
        match (token, user_id) {
            (Some(token), Some(user_id)) => Ok(Some(Session {
                token,
                user_id,
                username: stored.username.unwrap_or_default(),
            })),
            _ => {
                debug!(path = %self.path.display(), "session file incomplete");
                Ok(None)
            }
        }
    }

    pub fn save(&self, session: &Session) -> Result<()> {
        let stored = StoredSession {
            token: Some(session.token.clone()),
            user_id: Some(session.user_id.clone()),
            username: Some(session.username.clone()),
        };
        let body = toml::to_string(&stored).context("Failed to encode session")?;
        if let Some(parent) = self.path.parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create {:?}", parent))?;
        }
        std::fs::write(&self.path, body)
            .with_context(|| format!("Failed to write session file {:?}", self.path))?;
        info!(user_id = %session.user_id, username = %session.username, "session saved");
        Ok(())
    }

    /// Remove all three entries. Safe to call when already logged out.
    pub fn clear(&self) -> Result<()> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => {
                info!("session cleared");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => {
                Err(e).with_context(|| format!("Failed to remove session file {:?}", self.path))
            }
        }
    }
}
