//! Wiring for the `hazel-gateway` binary.
//!
//! The config file holds the gateway settings plus an optional `tracing`
//! section:
//!
//! ```json
//! {
//!   "apis": [{ "name": "users", "connection": { "url": "http://localhost:8081" } }],
//!   "retries": 3,
//!   "logging": true,
//!   "tracing": { "level": "debug", "format": "compact" }
//! }
//! ```

use std::path::{Path, PathBuf};

use hazel_core_plugins::{TracingConfig, TracingPlugin};
use hazel_gateway::{ConfigError, GatewayConfig, GatewayPlugin};
use hazel_system::server::{Server, ServerError};
use hazel_system::transport::{EmitError, MemoryTransport, Socket};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Environment variable naming the config file.
pub const CONFIG_ENV: &str = "HAZEL_CONFIG";

/// The binary's configuration file.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppConfig {
    /// Gateway settings.
    #[serde(flatten)]
    pub gateway: GatewayConfig,
    /// Logging settings.
    #[serde(default)]
    pub tracing: TracingConfig,
}

impl AppConfig {
    /// Parses and validates a JSON document.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::Parse`] or [`ConfigError::Invalid`].
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.gateway.validate()?;
        Ok(config)
    }

    /// Reads and validates a JSON file.
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
}

/// The config path: the explicit argument, else [`CONFIG_ENV`].
#[must_use]
pub fn config_path(arg: Option<&str>) -> Option<PathBuf> {
    arg.map(PathBuf::from)
        .or_else(|| std::env::var_os(CONFIG_ENV).map(PathBuf::from))
}

/// Starts a server running the gateway on `transport`.
///
/// The server is returned even when some APIs failed to register, together
/// with the error, so the APIs that did register stay usable.
pub async fn start(config: AppConfig, transport: &MemoryTransport) -> (Server, Result<(), ServerError>) {
    let mut server = Server::new(transport.clone());
    server
        .add_plugins(TracingPlugin::from_config(config.tracing).with_env())
        .add_plugins(GatewayPlugin::new(config.gateway));
    let result = server.start().await;
    (server, result)
}

/// Emits `key` as a fresh anonymous peer.
///
/// # Errors
///
/// Returns the transport's error, which wraps the gateway's.
pub async fn call(transport: &MemoryTransport, key: &str, payload: Value) -> Result<Value, EmitError> {
    let socket = transport.connect();
    let result = transport.emit(&socket, key, payload).await;
    transport.disconnect(socket.id());
    result
}
