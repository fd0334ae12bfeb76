//! API error taxonomy

use std::time::Duration;
use thiserror::Error;

/// Errors surfaced by the API client
#[derive(Debug, Error)]
pub enum ApiError {
    /// Network failure, timeout, rate limit or server error; worth retrying
    #[error("transient failure: {message}")]
    Transient {
        message: String,
        /// Server-requested delay before the next attempt
        retry_after: Option<Duration>,
    },

    #[error("gave up after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },

    /// The post was deleted or is otherwise unavailable
    #[error("not found: {0}")]
    NotFound(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("invalid post identifier: {0}")]
    InvalidIdentifier(String),

    /// Any other non-transient rejection (permission denied, bad request)
    #[error("request rejected with status {status}: {message}")]
    Rejected { status: u16, message: String },

    #[error("malformed response: {0}")]
    Decode(String),
}

impl ApiError {
    pub(crate) fn transient(message: impl Into<String>) -> Self {
        Self::Transient {
            message: message.into(),
            retry_after: None,
        }
    }

    /// Returns true if the request should be retried with backoff
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Transient { .. })
    }

    /// Returns true for authentication failures, which abort the process
    pub fn is_auth(&self) -> bool {
        matches!(self, Self::Auth(_))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::Transient { retry_after, .. } => *retry_after,
            _ => None,
        }
    }
}

impl From<reqwest::Error> for ApiError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            Self::Decode(err.to_string())
        } else {
            // Timeouts, refused connections and dropped bodies all retry
            Self::transient(err.to_string())
        }
    }
}

/// Result type for API operations
pub type ApiResult<T> = Result<T, ApiError>;
