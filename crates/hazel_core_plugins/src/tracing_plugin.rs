//! Logging setup.
//!
//! [`TracingPlugin`] installs a global `tracing` subscriber when the server
//! starts and exposes the [`TracingConfig`] it used as a resource.
//!
//! The subscriber is process-wide: if one is already installed (by another
//! server or by the host application) the plugin leaves it in place.

use async_trait::async_trait;
use hazel_system::plugin::{Plugin, PluginError};
use hazel_system::server::Server;
use serde::{Deserialize, Serialize};
use tracing::Level;
use tracing_subscriber::EnvFilter;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;

/// Environment variable holding a filter directive, e.g. `hazel_gateway=debug`.
pub const LOG_ENV: &str = "HAZEL_LOG";

// ─────────────────────────────────────────────────────────────────────────────
// TracingFormat
// ─────────────────────────────────────────────────────────────────────────────

/// Tracing output format.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TracingFormat {
    /// Human-readable multi-line output.
    #[default]
    Pretty,
    /// Compact single-line output.
    Compact,
    /// JSON lines for log aggregation.
    Json,
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingConfig
// ─────────────────────────────────────────────────────────────────────────────

/// How the subscriber is configured.
///
/// Deserializes from the `logging` section of a config file:
///
/// ```
/// use hazel_core_plugins::{TracingConfig, TracingFormat};
/// use tracing::Level;
///
/// let config: TracingConfig =
///     serde_json::from_str(r#"{ "level": "debug", "format": "json" }"#).unwrap();
/// assert_eq!(config.level, Level::DEBUG);
/// assert_eq!(config.format, TracingFormat::Json);
/// assert_eq!(config.filter, None);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TracingConfig {
    /// Maximum level when no filter is given.
    #[serde(with = "level_name")]
    pub level: Level,
    /// Output format.
    pub format: TracingFormat,
    /// Filter directives, overriding `level`.
    pub filter: Option<String>,
    /// Log span enter and exit.
    pub span_events: bool,
}

impl Default for TracingConfig {
    fn default() -> Self {
        Self {
            level: Level::INFO,
            format: TracingFormat::Pretty,
            filter: None,
            span_events: false,
        }
    }
}

impl TracingConfig {
    /// Builds the filter. An unparsable directive falls back to `level`.
    #[must_use]
    pub fn env_filter(&self) -> EnvFilter {
        match &self.filter {
            Some(filter) => {
                EnvFilter::try_new(filter).unwrap_or_else(|_| EnvFilter::new(self.level.as_str()))
            }
            None => EnvFilter::new(self.level.as_str()),
        }
    }
}

mod level_name {
    use serde::{Deserialize, Deserializer, Serializer};
    use tracing::Level;

    pub(super) fn serialize<S: Serializer>(level: &Level, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(&level.as_str().to_ascii_lowercase())
    }

    pub(super) fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Level, D::Error> {
        let name = String::deserialize(deserializer)?;
        name.parse().map_err(serde::de::Error::custom)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// TracingPlugin
// ─────────────────────────────────────────────────────────────────────────────

/// Installs the `tracing` subscriber.
///
/// # Resources Provided
///
/// | Resource | Description |
/// |----------|-------------|
/// | [`TracingConfig`] | The configuration in effect |
///
/// ```
/// use hazel_core_plugins::{TracingFormat, TracingPlugin};
/// use tracing::Level;
///
/// // Development
/// let dev = TracingPlugin::default()
///     .with_level(Level::DEBUG)
///     .with_span_events(true);
///
/// // Production
/// let prod = TracingPlugin::default()
///     .with_format(TracingFormat::Json)
///     .with_env_filter("hazel_gateway=info,reqwest=warn");
/// ```
#[derive(Debug, Clone, Default)]
pub struct TracingPlugin {
    config: TracingConfig,
}

impl TracingPlugin {
    /// Creates a plugin with default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a plugin from a configuration.
    #[must_use]
    pub fn from_config(config: TracingConfig) -> Self {
        Self { config }
    }

    /// Uses the filter in [`LOG_ENV`] when it is set.
    #[must_use]
    pub fn with_env(self) -> Self {
        match std::env::var(LOG_ENV) {
            Ok(filter) if !filter.trim().is_empty() => self.with_env_filter(filter),
            _ => self,
        }
    }

    /// Sets the maximum level.
    #[must_use]
    pub fn with_level(mut self, level: Level) -> Self {
        self.config.level = level;
        self
    }

    /// Sets the output format.
    #[must_use]
    pub fn with_format(mut self, format: TracingFormat) -> Self {
        self.config.format = format;
        self
    }

    /// Sets filter directives, `target=level,...`.
    #[must_use]
    pub fn with_env_filter(mut self, filter: impl Into<String>) -> Self {
        self.config.filter = Some(filter.into());
        self
    }

    /// Logs span enter and exit.
    #[must_use]
    pub fn with_span_events(mut self, enabled: bool) -> Self {
        self.config.span_events = enabled;
        self
    }

    /// The configuration the plugin will install.
    #[must_use]
    pub fn config(&self) -> &TracingConfig {
        &self.config
    }

    fn install(&self) -> bool {
        let span_events = if self.config.span_events {
            FmtSpan::ENTER | FmtSpan::EXIT
        } else {
            FmtSpan::NONE
        };
        let registry = tracing_subscriber::registry().with(self.config.env_filter());

        let installed = match self.config.format {
            TracingFormat::Pretty => registry
                .with(tracing_subscriber::fmt::layer().pretty().with_span_events(span_events))
                .try_init(),
            TracingFormat::Compact => registry
                .with(tracing_subscriber::fmt::layer().compact().with_span_events(span_events))
                .try_init(),
            TracingFormat::Json => registry
                .with(tracing_subscriber::fmt::layer().json().with_span_events(span_events))
                .try_init(),
        };
        installed.is_ok()
    }
}

#[async_trait]
impl Plugin for TracingPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_resource(self.config.clone());
    }

    async fn register(&self, _server: &mut Server) -> Result<(), PluginError> {
        let installed = self.install();
        tracing::info!(
            level = %self.config.level,
            format = ?self.config.format,
            filter = self.config.filter.as_deref().unwrap_or("-"),
            installed,
            "tracing ready"
        );
        Ok(())
    }

    fn cleanup(&self, _server: &mut Server) {
        tracing::debug!("tracing plugin shutting down");
    }

    fn name(&self) -> &str {
        "tracing"
    }
}
