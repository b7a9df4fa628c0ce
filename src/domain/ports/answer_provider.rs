//! Answer provider port - interface for anything that can answer a question.

use async_trait::async_trait;
use std::time::Duration;
use thiserror::Error;

use crate::domain::models::ProviderAnswer;

/// Errors raised by answer providers and completion clients.
#[derive(Debug, Clone, Error)]
pub enum ProviderError {
    #[error("Rate limit exceeded: {0}")]
    RateLimited(String),

    #[error("Provider overloaded ({status}): {message}")]
    Overloaded { status: u16, message: String },

    #[error("Request timed out after {0:?}")]
    Timeout(Duration),

    #[error("Network error: {0}")]
    Network(String),

    #[error("Server error ({status}): {message}")]
    Server { status: u16, message: String },

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Authentication failed: {0}")]
    Authentication(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Malformed response: {0}")]
    MalformedResponse(String),

    #[error("Session failed: {0}")]
    Session(String),

    #[error("Provider error ({status}): {message}")]
    Unknown { status: u16, message: String },
}

/// Retry class of a provider failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FailureKind {
    /// 429/503/529 or a provider-reported overload. Long backoff.
    RateLimited,
    /// Network trouble, timeouts, other server errors. Short backoff.
    Transient,
    /// Retrying will not help.
    Permanent,
}

impl ProviderError {
    /// Map an HTTP error status and body to an error.
    pub fn from_status(status: u16, body: String) -> Self {
        match status {
            400 => Self::InvalidRequest(body),
            401 | 403 => Self::Authentication(body),
            404 => Self::NotFound(body),
            429 => Self::RateLimited(body),
            503 | 529 => Self::Overloaded {
                status,
                message: body,
            },
            500..=599 => Self::Server {
                status,
                message: body,
            },
            _ => Self::Unknown {
                status,
                message: body,
            },
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            Self::RateLimited(_) | Self::Overloaded { .. } => FailureKind::RateLimited,
            Self::Server { message, .. } | Self::Session(message) => {
                if mentions_rate_limit(message) {
                    FailureKind::RateLimited
                } else {
                    FailureKind::Transient
                }
            }
            Self::Timeout(_) | Self::Network(_) => FailureKind::Transient,
            Self::Unknown { message, .. } => {
                if mentions_rate_limit(message) {
                    FailureKind::RateLimited
                } else {
                    FailureKind::Permanent
                }
            }
            Self::InvalidRequest(_)
            | Self::Authentication(_)
            | Self::NotFound(_)
            | Self::MalformedResponse(_) => FailureKind::Permanent,
        }
    }

    pub fn is_transient(&self) -> bool {
        !matches!(self.kind(), FailureKind::Permanent)
    }

    pub fn is_rate_limited(&self) -> bool {
        self.kind() == FailureKind::RateLimited
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_timeout() {
            Self::Timeout(Duration::ZERO)
        } else if err.is_decode() {
            Self::MalformedResponse(err.to_string())
        } else {
            Self::Network(err.to_string())
        }
    }
}

fn mentions_rate_limit(message: &str) -> bool {
    let lower = message.to_ascii_lowercase();
    lower.contains("overloaded") || lower.contains("rate limit") || lower.contains("rate_limit")
}

/// A black box that answers a question with free text.
///
/// Implementations are either direct network calls or scripted interactive
/// sessions. The harvester only sees this trait.
#[async_trait]
pub trait AnswerProvider: Send + Sync {
    /// Short identifier used in logs, e.g. `anthropic:claude-sonnet-4-6`.
    fn name(&self) -> String;

    /// Ask one question and wait for the complete answer.
    async fn fetch_answer(&self, question: &str) -> Result<ProviderAnswer, ProviderError>;
}
