//! Gateway configuration.
//!
//! ```
//! use hazel_gateway::config::GatewayConfig;
//!
//! let config = GatewayConfig::from_json(r#"{
//!     "apis": [{ "name": "users", "connection": { "url": "http://localhost:8081" } }],
//!     "logging": true,
//!     "retries": 3
//! }"#).unwrap();
//!
//! assert_eq!(config.apis[0].name, "users");
//! assert_eq!(config.retry_delay_ms, 5000);
//! assert_eq!(config.docs_path, "/docs");
//! ```

use core::time::Duration;
use std::path::{Path, PathBuf};

use hashbrown::HashSet;
use hazel_connector::ConnectionOptions;
use serde::{Deserialize, Serialize};

/// Default delay between catalog fetch retries.
pub const DEFAULT_RETRY_DELAY_MS: u64 = 5000;

/// Default catalog path.
pub const DEFAULT_DOCS_PATH: &str = "/docs";

fn default_retry_delay_ms() -> u64 {
    DEFAULT_RETRY_DELAY_MS
}

fn default_docs_path() -> String {
    DEFAULT_DOCS_PATH.to_string()
}

/// Errors raised while loading a configuration.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    /// The file could not be read.
    #[error("failed to read config file '{}': {source}", .path.display())]
    Io {
        /// The file path.
        path: PathBuf,
        /// The I/O error.
        #[source]
        source: std::io::Error,
    },

    /// The document is not valid JSON for this schema.
    #[error("failed to parse config: {0}")]
    Parse(#[from] serde_json::Error),

    /// The document parsed but is inconsistent.
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// One remote API to expose.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiConfig {
    /// Name used as the event key prefix. Must not contain `.` or whitespace.
    pub name: String,

    /// Options the API's connector is created with.
    #[serde(alias = "connectorOptions", alias = "connectionOptions")]
    pub connection: ConnectionOptions,
}

impl ApiConfig {
    /// Creates an API entry.
    #[must_use]
    pub fn new(name: impl Into<String>, connection: ConnectionOptions) -> Self {
        Self {
            name: name.into(),
            connection,
        }
    }
}

/// Gateway configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GatewayConfig {
    /// APIs to register, in order.
    #[serde(default)]
    pub apis: Vec<ApiConfig>,

    /// Emit one log line per proxied call.
    #[serde(default)]
    pub logging: bool,

    /// Maximum catalog fetch retries per API. `0` disables retrying.
    #[serde(default)]
    pub retries: u32,

    /// Delay between catalog fetch retries, in milliseconds.
    #[serde(default = "default_retry_delay_ms")]
    pub retry_delay_ms: u64,

    /// Catalog path on every API.
    #[serde(default = "default_docs_path")]
    pub docs_path: String,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            apis: Vec::new(),
            logging: false,
            retries: 0,
            retry_delay_ms: DEFAULT_RETRY_DELAY_MS,
            docs_path: default_docs_path(),
        }
    }
}

impl GatewayConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    /// Reads, parses and validates a JSON file.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Io`] when the file cannot be read, otherwise as
    /// [`from_json`](Self::from_json).
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let json = std::fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_json(&json)
    }

    /// Adds an API.
    #[must_use]
    pub fn with_api(mut self, name: impl Into<String>, connection: ConnectionOptions) -> Self {
        self.apis.push(ApiConfig::new(name, connection));
        self
    }

    /// Sets the retry bound.
    #[must_use]
    pub fn with_retries(mut self, retries: u32) -> Self {
        self.retries = retries;
        self
    }

    /// Sets the retry delay.
    #[must_use]
    pub fn with_retry_delay(mut self, delay: Duration) -> Self {
        self.retry_delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// Enables per-call logging.
    #[must_use]
    pub fn with_logging(mut self, logging: bool) -> Self {
        self.logging = logging;
        self
    }

    /// The retry delay as a [`Duration`].
    #[must_use]
    pub fn retry_delay(&self) -> Duration {
        Duration::from_millis(self.retry_delay_ms)
    }

    /// Checks names, URLs and the docs path.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Invalid`] describing the first problem found.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if !self.docs_path.starts_with('/') {
            return Err(ConfigError::Invalid(format!(
                "docs_path '{}' must start with '/'",
                self.docs_path
            )));
        }

        let mut seen = HashSet::new();
        for api in &self.apis {
            validate_api_name(&api.name).map_err(ConfigError::Invalid)?;
            if !seen.insert(api.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "api '{}' is declared twice",
                    api.name
                )));
            }
            api.connection
                .validate()
                .map_err(|err| ConfigError::Invalid(format!("api '{}': {err}", api.name)))?;
        }
        Ok(())
    }
}

/// Checks that `name` can prefix event keys.
///
/// # Errors
///
/// Returns a description of the problem.
pub fn validate_api_name(name: &str) -> Result<(), String> {
    if name.is_empty() {
        return Err("api name must not be empty".to_string());
    }
    if name.contains('.') || name.chars().any(char::is_whitespace) {
        return Err(format!(
            "api name '{name}' must not contain '.' or whitespace"
        ));
    }
    Ok(())
}
