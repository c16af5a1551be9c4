//! Core infrastructure plugins for hazel.
//!
//! - [`TracingPlugin`]: installs a `tracing` subscriber configured from
//!   [`TracingConfig`]
//!
//! # Example
//!
//! ```
//! use hazel_core_plugins::{TracingFormat, TracingPlugin};
//! use hazel_system::server::Server;
//! use hazel_system::transport::MemoryTransport;
//! use tracing::Level;
//!
//! let mut server = Server::new(MemoryTransport::new());
//! server.add_plugins(
//!     TracingPlugin::default()
//!         .with_level(Level::DEBUG)
//!         .with_format(TracingFormat::Compact),
//! );
//! ```

mod tracing_plugin;

pub use tracing_plugin::{LOG_ENV, TracingConfig, TracingFormat, TracingPlugin};
