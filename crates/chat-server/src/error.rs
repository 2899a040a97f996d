//! Error taxonomy for the chat core.
//!
//! Validation errors are rejected synchronously to the caller and never
//! retried. Generation failures stay inside the assistant orchestrator and
//! surface as transcript messages, never as errors across the service
//! boundary.

use axum::http::StatusCode;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("invalid identity: {0}")]
    InvalidIdentity(String),

    #[error("cannot block yourself")]
    SelfBlock,

    #[error("conversation not found: {0}")]
    ConversationNotFound(String),

    #[error("message body is empty")]
    EmptyBody,

    #[error("you have blocked this user")]
    BlockedByViewer,

    #[error("you have been blocked by this user")]
    BlockedByOther,

    #[error("storage error: {0}")]
    Storage(String),
}

impl ChatError {
    /// HTTP status used by the handlers layer.
    pub fn status_code(&self) -> StatusCode {
        match self {
            ChatError::InvalidIdentity(_) | ChatError::EmptyBody | ChatError::SelfBlock => {
                StatusCode::BAD_REQUEST
            }
            ChatError::ConversationNotFound(_) => StatusCode::NOT_FOUND,
            ChatError::BlockedByViewer | ChatError::BlockedByOther => StatusCode::FORBIDDEN,
            ChatError::Storage(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl From<sqlx::Error> for ChatError {
    fn from(e: sqlx::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

impl From<std::io::Error> for ChatError {
    fn from(e: std::io::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

impl From<serde_json::Error> for ChatError {
    fn from(e: serde_json::Error) -> Self {
        ChatError::Storage(e.to_string())
    }
}

/// Classified failure from the external generation service.
///
/// Never crosses the service boundary; each variant renders a distinct
/// transcript-visible message instead.
#[derive(Debug, Clone, Error)]
pub enum GenerationError {
    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("quota exceeded: {0}")]
    Quota(String),

    #[error("transport error: {0}")]
    Transport(String),

    #[error("generation failed: {0}")]
    Unknown(String),
}

impl GenerationError {
    /// Classify a provider error by its rendered text, in the same buckets
    /// the upstream service distinguishes (401/api key, 429/quota, network).
    pub fn classify(detail: impl Into<String>) -> Self {
        let detail = detail.into();
        let lower = detail.to_lowercase();
        if lower.contains("api key") || lower.contains("api_key") || lower.contains("401")
            || lower.contains("unauthorized") || lower.contains("authentication")
        {
            GenerationError::Auth(detail)
        } else if lower.contains("quota") || lower.contains("429") || lower.contains("rate limit") {
            GenerationError::Quota(detail)
        } else if lower.contains("network") || lower.contains("connect") || lower.contains("timeout")
            || lower.contains("fetch") || lower.contains("dns")
        {
            GenerationError::Transport(detail)
        } else {
            GenerationError::Unknown(detail)
        }
    }

    /// Short human-readable line appended to the transcript on failure.
    pub fn transcript_message(&self) -> String {
        match self {
            GenerationError::Auth(_) => {
                "AI service authentication failed. Please check the API key configuration."
                    .to_string()
            }
            GenerationError::Quota(_) => {
                "AI service is temporarily unavailable due to high demand. Please try again later."
                    .to_string()
            }
            GenerationError::Transport(_) => {
                "Network connection issue while reaching the AI service. Please try again."
                    .to_string()
            }
            GenerationError::Unknown(detail) => {
                format!("Sorry, I encountered an error: {}. Please try again.", detail)
            }
        }
    }
}
