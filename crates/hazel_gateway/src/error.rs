//! Error types for the gateway.

use hazel_connector::{Method, RequestError};
use hazel_system::transport::TransportError;

use crate::hooks::HookError;

/// One API that failed to register.
#[derive(Debug)]
pub struct ApiFailure {
    /// The API name.
    pub api: String,
    /// Why it failed.
    pub error: GatewayError,
}

impl core::fmt::Display for ApiFailure {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        write!(f, "{}: {}", self.api, self.error)
    }
}

/// Errors raised by discovery, registration and proxied calls.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The endpoint catalog could not be fetched.
    #[error("failed to fetch the endpoint catalog of '{api}' after {attempts} attempt(s): {source}")]
    Discovery {
        /// The API name.
        api: String,
        /// Attempts made by the failing fetch.
        attempts: u32,
        /// The last fetch error.
        #[source]
        source: RequestError,
    },

    /// An endpoint requiring auth was called without an identity.
    #[error("{method} {path} on '{api}' requires an authenticated user")]
    Authentication {
        /// The API name.
        api: String,
        /// The endpoint method.
        method: Method,
        /// The endpoint path.
        path: String,
    },

    /// The proxied call failed.
    #[error("{method} {path} on '{api}' failed: {source}")]
    Upstream {
        /// The API name.
        api: String,
        /// The endpoint method.
        method: Method,
        /// The endpoint path.
        path: String,
        /// The connector error.
        #[source]
        source: RequestError,
    },

    /// A hook failed.
    #[error("{hook} hook of '{api}' failed: {source}")]
    Hook {
        /// The API name.
        api: String,
        /// The failing hook.
        hook: &'static str,
        /// The hook's error.
        #[source]
        source: HookError,
    },

    /// The gateway was misconfigured or misused.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// The event payload could not be interpreted.
    #[error("invalid payload for '{key}': {message}")]
    InvalidPayload {
        /// The event key.
        key: String,
        /// What was wrong.
        message: String,
    },

    /// The transport rejected an operation.
    #[error("transport error: {0}")]
    Transport(#[from] TransportError),

    /// One or more APIs failed to register.
    #[error("{} api(s) failed to register: {}", .failures.len(), join_failures(.failures))]
    Registration {
        /// Per-API failures.
        failures: Vec<ApiFailure>,
    },
}

fn join_failures(failures: &[ApiFailure]) -> String {
    failures
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join("; ")
}

impl GatewayError {
    /// Creates a configuration error.
    pub fn configuration(message: impl Into<String>) -> Self {
        Self::Configuration(message.into())
    }

    /// Stable, machine-readable error code.
    #[must_use]
    pub fn code(&self) -> &'static str {
        match self {
            Self::Discovery { .. } => "discovery",
            Self::Authentication { .. } => "authentication",
            Self::Upstream { .. } => "upstream",
            Self::Hook { .. } => "hook",
            Self::Configuration(_) => "configuration",
            Self::InvalidPayload { .. } => "invalid_payload",
            Self::Transport(_) => "transport",
            Self::Registration { .. } => "registration",
        }
    }

    /// HTTP-style status describing the error to callers.
    #[must_use]
    pub fn status_code(&self) -> u16 {
        match self {
            Self::Authentication { .. } => 401,
            Self::InvalidPayload { .. } => 400,
            Self::Upstream { source, .. } => match source {
                RequestError::Timeout(_) => 504,
                other => other.status().unwrap_or(502),
            },
            Self::Discovery { .. } => 503,
            Self::Hook { .. }
            | Self::Configuration(_)
            | Self::Transport(_)
            | Self::Registration { .. } => 500,
        }
    }

    /// Returns the names of APIs that failed to register.
    #[must_use]
    pub fn failed_apis(&self) -> Vec<&str> {
        match self {
            Self::Registration { failures } => {
                failures.iter().map(|failure| failure.api.as_str()).collect()
            }
            _ => Vec::new(),
        }
    }
}
