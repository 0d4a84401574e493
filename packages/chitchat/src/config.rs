use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

// =============================================================================
// Unified config (figment-deserialized from defaults / config.toml / env vars)
// =============================================================================
//
// Three equivalent ways to configure:
//
//   config.toml:     [server]
//                    api_url = "http://chat.example:8000"
//
//   env var:         CHITCHAT_SERVER__API_URL=http://chat.example:8000
//                    (double underscore = nesting)
//
//   CLI flag:        --api-url http://chat.example:8000   (highest priority)

/// Top-level tunable configuration, deserialized by figment.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct FileConfig {
    #[serde(default)]
    pub server: ServerFileConfig,
}

/// Backend endpoints (lives under `[server]` in config.toml).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct ServerFileConfig {
    #[serde(default = "default_api_url")]
    pub api_url: String,
    #[serde(default = "default_ws_url")]
    pub ws_url: String,
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for ServerFileConfig {
    fn default() -> Self {
        Self {
            api_url: default_api_url(),
            ws_url: default_ws_url(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

fn default_api_url() -> String {
    "http://localhost:8000".to_string()
}
fn default_ws_url() -> String {
    "ws://localhost:8000".to_string()
}
fn default_request_timeout_secs() -> u64 {
    10
}

/// Endpoint overrides from the command line.
#[derive(Clone, Debug, Default)]
pub struct CliOverrides {
    pub api_url: Option<String>,
    pub ws_url: Option<String>,
}

/// Build a figment that layers: defaults → config.toml → CHITCHAT_* env vars.
///
/// Env vars use double-underscore for nesting into sections:
///   `CHITCHAT_SERVER__WS_URL=ws://host:8000`  →  `server.ws_url`
pub fn load_config(data_dir: &Path) -> figment::Figment {
    use figment::{
        Figment,
        providers::{Env, Format, Serialized, Toml},
    };

    Figment::from(Serialized::defaults(FileConfig::default()))
        .merge(Toml::file(data_dir.join("config.toml")))
        .merge(Env::prefixed("CHITCHAT_").split("__"))
}

/// Resolved endpoint configuration (runtime view).
#[derive(Clone, Debug)]
pub struct ServerConfig {
    /// Base URL of the HTTP API, without trailing slash
    pub api_url: String,
    /// Base URL of the push socket, without trailing slash
    pub ws_url: String,
    pub request_timeout: Duration,
}

impl ServerConfig {
    pub fn from_file(fc: &ServerFileConfig, overrides: &CliOverrides) -> Self {
        let api_url = overrides.api_url.as_deref().unwrap_or(&fc.api_url);
        let ws_url = overrides.ws_url.as_deref().unwrap_or(&fc.ws_url);
        Self {
            api_url: api_url.trim_end_matches('/').to_string(),
            ws_url: ws_url.trim_end_matches('/').to_string(),
            request_timeout: Duration::from_secs(fc.request_timeout_secs.max(1)),
        }
    }

    /// Push socket URL for a user.
    pub fn push_url(&self, user_id: &str) -> String {
        format!("{}/ws/{}", self.ws_url, user_id)
    }
}

// =============================================================================
// Directory layout, derived from --data-dir rather than figment
// =============================================================================

#[derive(Clone, Debug)]
pub struct ChitchatConfig {
    pub data_dir: PathBuf,
    pub logs_dir: PathBuf,
    pub server: ServerConfig,
}

impl ChitchatConfig {
    pub fn new(custom_dir: Option<PathBuf>, overrides: CliOverrides) -> Result<Self> {
        let data_dir = match custom_dir {
            Some(dir) => dir,
            None => dirs::home_dir()
                .context("Could not find home directory")?
                .join(".chitchat"),
        };

        std::fs::create_dir_all(&data_dir)
            .with_context(|| format!("Failed to create data directory: {:?}", data_dir))?;

        let logs_dir = data_dir.join("logs");
        std::fs::create_dir_all(&logs_dir)
            .with_context(|| format!("Failed to create logs directory: {:?}", logs_dir))?;

        let fc: FileConfig = load_config(&data_dir)
            .extract()
            .context("Failed to read configuration")?;

        Ok(Self {
            server: ServerConfig::from_file(&fc.server, &overrides),
            data_dir,
            logs_dir,
        })
    }

    pub fn session_path(&self) -> PathBuf {
        self.data_dir.join("session.toml")
    }

    pub fn log_path(&self) -> PathBuf {
        self.logs_dir.join("chitchat.log")
    }

    pub fn config_toml_path(&self) -> PathBuf {
        self.data_dir.join("config.toml")
    }
}
