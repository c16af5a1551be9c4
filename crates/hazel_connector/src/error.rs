//! Error types for request building and connector calls.

use core::time::Duration;

/// Errors raised while building or executing a request.
#[derive(Debug, thiserror::Error)]
pub enum RequestError {
    /// `execute()` was called on a builder with no executor bound.
    #[error("request builder is not bound to an executor")]
    Unbound,

    /// A required builder field was never set.
    #[error("request is missing its {0}")]
    Incomplete(&'static str),

    /// A request key could not be parsed back into method and path.
    #[error("invalid request key '{0}'")]
    InvalidKey(String),

    /// Connection options were rejected.
    #[error("invalid connection options: {0}")]
    InvalidOptions(String),

    /// The request itself is malformed (non-object args, missing path parameter ...).
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    /// Http error (e.g.: connection refused, reset, DNS failure).
    #[error("http error: {0}")]
    Http(String),

    /// The request exceeded its timeout.
    #[error("request timed out after {0:?}")]
    Timeout(Duration),

    /// The remote API answered with a failure.
    #[error("api error ({status}){}: {message}", .code.as_ref().map(|code| format!(" [{code}]")).unwrap_or_default())]
    Status {
        /// HTTP status code.
        status: u16,
        /// Application error code from the error envelope, if any.
        code: Option<String>,
        /// Error message.
        message: String,
    },

    /// The response body could not be interpreted.
    #[error("invalid response: {0}")]
    InvalidResponse(String),

    /// JSON serialization/deserialization error.
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),

    /// A transport-level executor failed to deliver the request.
    #[error("remote call failed: {0}")]
    Remote(String),
}

impl RequestError {
    /// Returns true for errors caused by misuse rather than by the remote side.
    #[must_use]
    pub fn is_configuration(&self) -> bool {
        matches!(
            self,
            Self::Unbound | Self::Incomplete(_) | Self::InvalidKey(_) | Self::InvalidOptions(_)
        )
    }

    /// Returns the HTTP status of an API failure.
    #[must_use]
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status, .. } => Some(*status),
            _ => None,
        }
    }
}
