//! HTTP client for the chat backend.

use reqwest::StatusCode;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, warn};

use chitchat_core::{Conversation, ErrorDetail, LoginResponse, Message, NewConversation, User};

use crate::config::ServerConfig;

/// Any failed API call. Every non-2xx status is treated the same way; there
/// is no retry and no transient/permanent split.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("chat server is unavailable")]
    Unavailable,

    #[error("request failed with {status}{}", detail_suffix(.detail))]
    Status {
        status: StatusCode,
        detail: Option<String>,
    },

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

fn detail_suffix(detail: &Option<String>) -> String {
    detail.as_deref().map(|d| format!(": {d}")).unwrap_or_default()
}

impl ApiError {
    pub fn from_reqwest(err: reqwest::Error) -> Self {
        if err.is_connect() {
            Self::Unavailable
        } else {
            Self::Other(err.into())
        }
    }

    pub fn is_unauthorized(&self) -> bool {
        matches!(self, Self::Status { status, .. } if *status == StatusCode::UNAUTHORIZED)
    }

    /// Text for the login form: the server's `detail` if it sent one.
    pub fn auth_message(&self) -> String {
        match self {
            Self::Status {
                detail: Some(d), ..
            } => d.clone(),
            _ => "Authentication failed".to_string(),
        }
    }
}

#[derive(Serialize)]
struct Credentials<'a> {
    username: &'a str,
    password: &'a str,
}

#[derive(serde::Deserialize)]
struct CreatedConversation {
    id: String,
}

/// Thin wrapper over the backend's REST endpoints.
#[derive(Clone)]
pub struct ApiClient {
    http: reqwest::Client,
    base_url: String,
    token: Option<String>,
}

impl ApiClient {
    pub fn new(config: &ServerConfig) -> Result<Self, ApiError> {
        let http = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()
            .map_err(ApiError::from_reqwest)?;
        Ok(Self {
            http,
            base_url: config.api_url.clone(),
            token: None,
        })
    }

    /// Attach a bearer token to subsequent requests.
    pub fn with_token(mut self, token: impl Into<String>) -> Self {
        self.token = Some(token.into());
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn request(&self, method: reqwest::Method, path: &str) -> reqwest::RequestBuilder {
        let rb = self.http.request(method, self.url(path));
        match &self.token {
            Some(token) => rb.bearer_auth(token),
            None => rb,
        }
    }

    async fn send(&self, rb: reqwest::RequestBuilder) -> Result<reqwest::Response, ApiError> {
        let resp = rb.send().await.map_err(ApiError::from_reqwest)?;
        let status = resp.status();
        if status.is_success() {
            return Ok(resp);
        }
        let body = resp.text().await.unwrap_or_default();
        let detail = ErrorDetail::from_body(&body).map(|d| d.message());
        warn!(%status, detail = ?detail, "chat API request failed");
        Err(ApiError::Status { status, detail })
    }

    async fn json<T: DeserializeOwned>(&self, rb: reqwest::RequestBuilder) -> Result<T, ApiError> {
        let resp = self.send(rb).await?;
        resp.json().await.map_err(ApiError::from_reqwest)
    }

    /// `POST /auth/register`. The created account body is not used.
    pub async fn register(&self, username: &str, password: &str) -> Result<(), ApiError> {
        debug!(username, "registering");
        let rb = self
            .request(reqwest::Method::POST, "/auth/register")
            .json(&Credentials { username, password });
        self.send(rb).await?;
        Ok(())
    }

    /// `POST /auth/login`.
    pub async fn login(&self, username: &str, password: &str) -> Result<LoginResponse, ApiError> {
        debug!(username, "logging in");
        let rb = self
            .request(reqwest::Method::POST, "/auth/login")
            .json(&Credentials { username, password });
        self.json(rb).await
    }

    /// `GET /users`.
    pub async fn users(&self) -> Result<Vec<User>, ApiError> {
        self.json(self.request(reqwest::Method::GET, "/users"))
            .await
    }

    /// `GET /chat/recent/{user_id}`, most recent first.
    pub async fn recent_conversations(&self, user_id: &str) -> Result<Vec<Conversation>, ApiError> {
        let path = format!("/chat/recent/{user_id}");
        self.json(self.request(reqwest::Method::GET, &path)).await
    }

    /// `GET /chat/{chat_id}/messages`, oldest first. Each message is stamped
    /// with `chat_id`.
    pub async fn messages(&self, chat_id: &str) -> Result<Vec<Message>, ApiError> {
        let path = format!("/chat/{chat_id}/messages");
        let messages: Vec<Message> = self.json(self.request(reqwest::Method::GET, &path)).await?;
        Ok(messages
            .into_iter()
            .map(|m| m.in_conversation(chat_id))
            .collect())
    }

    /// `POST /chat/start`. Returns the id of the (possibly pre-existing)
    /// conversation.
    pub async fn start_conversation(&self, request: &NewConversation) -> Result<String, ApiError> {
        let rb = self
            .request(reqwest::Method::POST, "/chat/start")
            .json(request);
        let created: CreatedConversation = self.json(rb).await?;
        Ok(created.id)
    }

    /// `DELETE /chat/{chat_id}`.
    pub async fn delete_conversation(&self, chat_id: &str) -> Result<(), ApiError> {
        let path = format!("/chat/{chat_id}");
        self.send(self.request(reqwest::Method::DELETE, &path))
            .await?;
        Ok(())
    }
}
