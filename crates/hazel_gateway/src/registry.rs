//! Named, shared connectors.
//!
//! The registry creates at most one connector per API name. The first
//! registration wins: later calls with different options get the existing
//! connector back.

use std::sync::Arc;

use hashbrown::HashMap;
use hazel_connector::{
    ConnectionOptions, Connector, ConnectorFactory, HttpConnectorFactory, RequestError,
};
use parking_lot::RwLock;
use tracing::debug;

/// A process-wide map from API name to connector.
///
/// Cloning is cheap; clones share the same map.
///
/// ```
/// use hazel_connector::ConnectionOptions;
/// use hazel_gateway::ConnectorRegistry;
///
/// let registry = ConnectorRegistry::new();
/// let first = registry
///     .get_or_create("users", &ConnectionOptions::new("http://localhost:8081"))
///     .unwrap();
/// let second = registry
///     .get_or_create("users", &ConnectionOptions::new("http://localhost:9999"))
///     .unwrap();
///
/// assert_eq!(second.options().url, "http://localhost:8081");
/// assert_eq!(registry.len(), 1);
/// # drop(first);
/// ```
#[derive(Clone)]
pub struct ConnectorRegistry {
    connectors: Arc<RwLock<HashMap<String, Arc<dyn Connector>>>>,
    factory: Arc<dyn ConnectorFactory>,
}

impl core::fmt::Debug for ConnectorRegistry {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectorRegistry")
            .field("names", &self.names())
            .finish_non_exhaustive()
    }
}

impl Default for ConnectorRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl ConnectorRegistry {
    /// Creates a registry building [`HttpConnector`](hazel_connector::HttpConnector)s.
    #[must_use]
    pub fn new() -> Self {
        Self::with_factory(HttpConnectorFactory)
    }

    /// Creates a registry building connectors with `factory`.
    #[must_use]
    pub fn with_factory(factory: impl ConnectorFactory) -> Self {
        Self {
            connectors: Arc::new(RwLock::new(HashMap::new())),
            factory: Arc::new(factory),
        }
    }

    /// Returns the connector for `name`, creating it from `options` if absent.
    ///
    /// # Errors
    ///
    /// Returns the factory's error when creation fails. Nothing is stored in
    /// that case.
    pub fn get_or_create(
        &self,
        name: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connector>, RequestError> {
        if let Some(existing) = self.connectors.read().get(name) {
            return Ok(Arc::clone(existing));
        }

        let mut connectors = self.connectors.write();
        // Another caller may have won the race between the two locks.
        if let Some(existing) = connectors.get(name) {
            return Ok(Arc::clone(existing));
        }

        let connector = self.factory.create(name, options)?;
        debug!(api = name, url = %options.url, "connector created");
        connectors.insert(name.to_string(), Arc::clone(&connector));
        Ok(connector)
    }

    /// Returns the connector for `name`, if one was created.
    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Connector>> {
        self.connectors.read().get(name).cloned()
    }

    /// Registered API names, sorted.
    #[must_use]
    pub fn names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.connectors.read().keys().cloned().collect();
        names.sort();
        names
    }

    /// Number of connectors.
    #[must_use]
    pub fn len(&self) -> usize {
        self.connectors.read().len()
    }

    /// Returns true if no connector was created.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.connectors.read().is_empty()
    }

    /// Drops every connector.
    pub fn clear(&self) {
        self.connectors.write().clear();
    }
}
