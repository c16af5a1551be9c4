//! # hazel Internal Library
//!
//! Re-exports the core hazel crates for convenience.

/// Plugin host, resources and the event transport.
pub use hazel_system;

/// HTTP connectors and request builders.
pub use hazel_connector;

/// The API gateway plugin.
pub use hazel_gateway;

/// Infrastructure plugins.
pub use hazel_core_plugins;

/// Re-export all common types for easy access.
pub mod prelude {
    pub use hazel_connector::{
        ConnectionOptions, Connector, Method, RequestBuilder, RequestError,
    };
    pub use hazel_core_plugins::{TracingFormat, TracingPlugin};
    pub use hazel_gateway::{
        ApiDescriptor, AuthLevel, CallContext, GatewayConfig, GatewayError, GatewayPlugin,
        HookSet,
    };
    pub use hazel_system::prelude::*;
}
