//! Validation errors and backend error-body decoding.

use serde::Deserialize;

/// Reasons a new conversation is rejected before any request is made.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    #[error("Select at least one user")]
    NoParticipants,

    #[error("Please enter a group name")]
    MissingGroupName,
}

/// The `detail` member of a backend error body.
///
/// The backend sends either a plain string (`HTTPException`) or a list of
/// field errors, each with a `msg`.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(untagged)]
pub enum ErrorDetail {
    Text(String),
    Fields(Vec<FieldError>),
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FieldError {
    #[serde(default)]
    pub msg: String,
}

#[derive(Deserialize)]
struct ErrorBody {
    detail: Option<ErrorDetail>,
}

impl ErrorDetail {
    /// Extract the detail from a raw response body, if there is one.
    pub fn from_body(body: &str) -> Option<Self> {
        serde_json::from_str::<ErrorBody>(body).ok()?.detail
    }

    pub fn message(&self) -> String {
        match self {
            Self::Text(s) => s.clone(),
            Self::Fields(fields) => fields
                .iter()
                .map(|f| f.msg.as_str())
                .collect::<Vec<_>>()
                .join(", "),
        }
    }
}
