use std::sync::Arc;

use async_trait::async_trait;
use hazel_connector::{Connector, ConnectorFactory};
use hazel_system::plugin::{Plugin, PluginError};
use hazel_system::server::Server;
use hazel_system::transport::Transport;
use parking_lot::Mutex;
use tracing::{error, info, warn};

use crate::api::ApiDescriptor;
use crate::config::GatewayConfig;
use crate::discovery::DocsFetcher;
use crate::error::{ApiFailure, GatewayError};
use crate::hooks::HookSet;
use crate::registrar::register_api;
use crate::registry::ConnectorRegistry;

/// Exposes remote HTTP APIs as transport events.
///
/// On registration the plugin fetches each API's endpoint catalog and
/// registers one event per endpoint. APIs are processed in order and
/// independently: one failing API does not stop the others, and the ones
/// that succeeded stay registered even though the plugin reports an error.
///
/// # Example
///
/// ```no_run
/// use hazel_gateway::{GatewayConfig, GatewayPlugin, HookSet};
/// use hazel_system::server::Server;
/// use hazel_system::transport::MemoryTransport;
///
/// # tokio_test::block_on(async {
/// let config = GatewayConfig::from_file("gateway.json").unwrap();
/// let mut server = Server::new(MemoryTransport::new());
/// server.add_plugins(
///     GatewayPlugin::new(config)
///         .with_hooks("users", HookSet::new().with_transformer(|value: serde_json::Value| value)),
/// );
/// server.start().await.unwrap();
/// # });
/// ```
pub struct GatewayPlugin {
    apis: Vec<ApiDescriptor>,
    logging: bool,
    fetcher: DocsFetcher,
    registry: ConnectorRegistry,
    registered: Mutex<Vec<String>>,
}

impl core::fmt::Debug for GatewayPlugin {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("GatewayPlugin")
            .field("apis", &self.apis)
            .field("logging", &self.logging)
            .field("fetcher", &self.fetcher)
            .finish_non_exhaustive()
    }
}

impl GatewayPlugin {
    /// Creates the plugin for the APIs in `config`, without hooks.
    #[must_use]
    pub fn new(config: GatewayConfig) -> Self {
        let fetcher = DocsFetcher::from_config(&config);
        Self {
            apis: config.apis.into_iter().map(ApiDescriptor::from).collect(),
            logging: config.logging,
            fetcher,
            registry: ConnectorRegistry::new(),
            registered: Mutex::new(Vec::new()),
        }
    }

    /// Adds an API after the configured ones.
    #[must_use]
    pub fn with_api(mut self, api: ApiDescriptor) -> Self {
        self.apis.push(api);
        self
    }

    /// Attaches hooks to the configured API called `name`.
    ///
    /// Unknown names are ignored with a warning.
    #[must_use]
    pub fn with_hooks(mut self, name: &str, hooks: HookSet) -> Self {
        match self.apis.iter_mut().find(|api| api.name == name) {
            Some(api) => api.hooks = hooks,
            None => warn!(api = name, "hooks given for an unknown api"),
        }
        self
    }

    /// Builds connectors with `factory` instead of over HTTP.
    #[must_use]
    pub fn with_connector_factory(mut self, factory: impl ConnectorFactory) -> Self {
        self.registry = ConnectorRegistry::with_factory(factory);
        self
    }

    /// The connector cache.
    #[must_use]
    pub fn registry(&self) -> &ConnectorRegistry {
        &self.registry
    }

    /// The connector of API `name`, once registration created it.
    #[must_use]
    pub fn connector(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.registry.get(name)
    }

    /// Event keys registered so far.
    #[must_use]
    pub fn registered_events(&self) -> Vec<String> {
        self.registered.lock().clone()
    }

    async fn register_one(
        &self,
        transport: &dyn Transport,
        api: &ApiDescriptor,
    ) -> Result<Vec<String>, GatewayError> {
        let (connector, catalog) = self.fetcher.fetch_catalog(api, &self.registry).await?;
        register_api(transport, api, &connector, &catalog, self.logging)
    }
}

#[async_trait]
impl Plugin for GatewayPlugin {
    fn build(&self, server: &mut Server) {
        server.insert_resource(self.registry.clone());
    }

    async fn register(&self, server: &mut Server) -> Result<(), PluginError> {
        if self.apis.is_empty() {
            warn!("no apis configured");
            return Ok(());
        }

        let transport = Arc::clone(server.transport());
        let mut failures = Vec::new();
        for api in &self.apis {
            match self.register_one(transport.as_ref(), api).await {
                Ok(keys) => {
                    info!(api = %api.name, endpoints = keys.len(), "api registered");
                    self.registered.lock().extend(keys);
                }
                Err(err) => {
                    error!(api = %api.name, code = err.code(), error = %err, "api registration failed");
                    failures.push(ApiFailure {
                        api: api.name.clone(),
                        error: err,
                    });
                }
            }
        }

        if failures.is_empty() {
            Ok(())
        } else {
            Err(Box::new(GatewayError::Registration { failures }))
        }
    }

    fn cleanup(&self, server: &mut Server) {
        let keys = core::mem::take(&mut *self.registered.lock());
        for key in &keys {
            server.transport().unregister_event(key);
        }
        self.registry.clear();
    }

    fn name(&self) -> &str {
        "gateway"
    }
}
