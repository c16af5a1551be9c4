//! Exposes remote HTTP APIs over an event transport.
//!
//! Each configured API serves a catalog of its endpoints. At startup the
//! [`GatewayPlugin`] fetches every catalog (retrying within a bounded
//! budget) and registers one transport event per endpoint, keyed
//! `<api>.<catalog key>`. Emitting such an event proxies the call:
//!
//! - the caller's `params`, `args` and `headers` become the HTTP request
//! - the endpoint's [`AuthLevel`] decides whether the request is signed
//! - per-API [`HookSet`] hooks adjust, observe or broadcast the response
//!
//! # Modules
//!
//! - [`config`]: JSON configuration
//! - [`registry`]: one shared connector per API
//! - [`discovery`]: catalogs and the retrying [`DocsFetcher`]
//! - [`registrar`]: registering a catalog on a transport
//! - [`dispatcher`]: the per-endpoint proxy handler
//! - [`hooks`]: hook traits and [`HookSet`]

mod api;
pub mod config;
pub mod discovery;
pub mod dispatcher;
mod error;
pub mod hooks;
mod plugin;
pub mod registrar;
pub mod registry;

pub use api::ApiDescriptor;
pub use config::{ApiConfig, ConfigError, GatewayConfig};
pub use discovery::{AuthLevel, Catalog, DocsFetcher, EndpointDoc};
pub use dispatcher::{EndpointHandler, EventPayload};
pub use error::{ApiFailure, GatewayError};
pub use hooks::{CallContext, HookSet};
pub use plugin::GatewayPlugin;
pub use registry::ConnectorRegistry;
