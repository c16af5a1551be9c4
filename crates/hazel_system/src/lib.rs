//! Plugin host and transport interface for hazel.
//!
//! `hazel_system` provides the primitives the gateway is built on:
//!
//! - [`plugin`] - Plugin trait and identifiers
//! - [`resource`] - Type-keyed shared state owned by the server
//! - [`server`] - Plugin lifecycle orchestration
//! - [`transport`] - The event transport interface and an in-process implementation
//!
//! # Example
//!
//! ```
//! use async_trait::async_trait;
//! use hazel_system::plugin::{Plugin, PluginError};
//! use hazel_system::server::Server;
//! use hazel_system::transport::MemoryTransport;
//!
//! struct Greeting(&'static str);
//!
//! struct GreetingPlugin;
//!
//! #[async_trait]
//! impl Plugin for GreetingPlugin {
//!     fn build(&self, server: &mut Server) {
//!         server.insert_resource(Greeting("hello"));
//!     }
//!
//!     async fn register(&self, _server: &mut Server) -> Result<(), PluginError> {
//!         Ok(())
//!     }
//! }
//!
//! # futures::executor::block_on(async {
//! let mut server = Server::new(MemoryTransport::new());
//! server.add_plugins(GreetingPlugin);
//! server.start().await.unwrap();
//! assert_eq!(server.get_resource::<Greeting>().unwrap().0, "hello");
//! # });
//! ```

/// Plugin trait for extensible functionality.
pub mod plugin;

/// Type-keyed resource storage.
pub mod resource;

/// Server runtime for plugin orchestration.
pub mod server;

/// Event transport interface and the in-process transport.
pub mod transport;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use crate::plugin::*;
    pub use crate::resource::*;
    pub use crate::server::*;
    pub use crate::transport::*;
}
