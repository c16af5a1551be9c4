//! Plugin system for extensible server functionality.
//!
//! Plugins are the unit of composition in hazel. The gateway itself, logging
//! setup and any application-specific wiring are all delivered as plugins
//! added to a [`Server`].
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use hazel_system::plugin::{Plugin, PluginError, PluginId};
//! use hazel_system::server::Server;
//!
//! struct LoggingPlugin;
//!
//! #[async_trait]
//! impl Plugin for LoggingPlugin {
//!     async fn register(&self, _server: &mut Server) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! struct MyPlugin;
//!
//! #[async_trait]
//! impl Plugin for MyPlugin {
//!     async fn register(&self, _server: &mut Server) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//!
//!     fn dependencies(&self) -> Vec<PluginId> {
//!         vec![PluginId::of::<LoggingPlugin>()]
//!     }
//! }
//! ```

use core::any::TypeId;

use async_trait::async_trait;

use crate::server::Server;

/// Error returned by a plugin that failed to register.
///
/// Plugins surface their own error types; the server only needs to report
/// them, so they cross this boundary boxed.
pub type PluginError = Box<dyn core::error::Error + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// PluginId
// ─────────────────────────────────────────────────────────────────────────────

/// Unique identifier for a plugin type.
///
/// Used for dependency resolution and duplicate detection. Based on [`TypeId`],
/// so each plugin type has exactly one `PluginId`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct PluginId {
    type_id: TypeId,
    type_name: &'static str,
}

impl PluginId {
    /// Creates a `PluginId` for the given plugin type.
    #[must_use]
    pub fn of<P: Plugin>() -> Self {
        Self {
            type_id: TypeId::of::<P>(),
            type_name: core::any::type_name::<P>(),
        }
    }

    /// Returns the underlying `TypeId`.
    #[must_use]
    pub fn type_id(&self) -> TypeId {
        self.type_id
    }

    /// Returns the type name for debugging.
    #[must_use]
    pub fn type_name(&self) -> &'static str {
        self.type_name
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Plugin Trait
// ─────────────────────────────────────────────────────────────────────────────

/// A unit of functionality added to a [`Server`].
///
/// Plugins follow a strict lifecycle managed by the server:
///
/// 1. **Build Phase** - `build()` is called in dependency order. Insert
///    resources here; no I/O.
/// 2. **Register Phase** - `register()` is awaited in dependency order. This is
///    where plugins reach remote systems and register transport events.
/// 3. **Cleanup Phase** - `cleanup()` is called in reverse dependency order
///    when the server stops.
///
/// A failing `register()` aborts [`Server::start`]. Plugins registered before
/// the failure stay registered.
#[async_trait]
pub trait Plugin: Send + Sync + 'static {
    /// Inserts resources into the server. Called once, before any plugin registers.
    fn build(&self, _server: &mut Server) {}

    /// Performs asynchronous registration against the server and its transport.
    ///
    /// # Errors
    ///
    /// Returns an error when the plugin cannot become operational. The server
    /// propagates it from [`Server::start`].
    async fn register(&self, server: &mut Server) -> Result<(), PluginError>;

    /// Called when the server is shutting down.
    ///
    /// Called in **reverse** dependency order.
    fn cleanup(&self, _server: &mut Server) {}

    /// Returns the plugin's name for logging and error messages.
    ///
    /// Default implementation returns the type name.
    fn name(&self) -> &str {
        core::any::type_name::<Self>()
    }

    /// Declares plugins that must be registered before this one.
    ///
    /// [`Server::start`] fails if a dependency was never added.
    fn dependencies(&self) -> Vec<PluginId> {
        Vec::new()
    }

    /// Returns true if this plugin can only be added once.
    ///
    /// Default is `true`; adding the same plugin type twice panics.
    fn is_unique(&self) -> bool {
        true
    }
}
