//! Endpoint catalogs and the fetcher that retrieves them.
//!
//! Every API serves a JSON catalog of its endpoints at a well-known path.
//! Keys are `"<METHOD> <path>"` or a bare path, which means `GET`:
//!
//! ```
//! use hazel_connector::Method;
//! use hazel_gateway::discovery::{AuthLevel, Catalog};
//! use serde_json::json;
//!
//! let catalog: Catalog = serde_json::from_value(json!({
//!     "/ping": { "auth": "DISABLED" },
//!     "POST /0/user": { "required_auth": true, "deprecated": true }
//! }))
//! .unwrap();
//!
//! let endpoints = catalog.endpoints().unwrap();
//! assert_eq!(endpoints[0].method, Method::Get);
//! assert_eq!(endpoints[0].path, "/ping");
//! assert_eq!(endpoints[1].auth, AuthLevel::Required);
//! assert!(endpoints[1].deprecated);
//! ```

use core::time::Duration;
use std::sync::Arc;

use hashbrown::HashMap;
use hazel_connector::{Connector, Method};
use indexmap::IndexMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, warn};

use crate::api::ApiDescriptor;
use crate::config::{DEFAULT_DOCS_PATH, DEFAULT_RETRY_DELAY_MS, GatewayConfig};
use crate::error::GatewayError;
use crate::registry::ConnectorRegistry;

// ─────────────────────────────────────────────────────────────────────────────
// Catalog
// ─────────────────────────────────────────────────────────────────────────────

/// Who may call an endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum AuthLevel {
    /// Only authenticated callers; requests are always signed.
    #[serde(alias = "required")]
    Required,
    /// Anyone; requests are signed when the caller is authenticated.
    #[serde(alias = "optional")]
    Optional,
    /// Anyone; requests are never signed.
    #[serde(alias = "disabled")]
    Disabled,
}

impl AuthLevel {
    /// Returns true if calls may be signed.
    #[must_use]
    pub fn accepts_auth(self) -> bool {
        !matches!(self, Self::Disabled)
    }
}

/// Documentation of one endpoint. Every field is optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EndpointDoc {
    /// Human readable summary.
    pub description: Option<String>,
    /// Schema of the body or query arguments.
    pub args: Value,
    /// Schema of the path parameters.
    pub params: Value,
    /// Names of mandatory parameters.
    #[serde(alias = "requiredParams")]
    pub required_params: Vec<String>,
    /// Legacy auth flag, used when `auth` is absent.
    #[serde(alias = "requiredAuth")]
    pub required_auth: bool,
    /// Auth level.
    pub auth: Option<AuthLevel>,
    /// Response schema.
    pub response: Value,
    /// Response type name.
    #[serde(alias = "responseType")]
    pub response_type: Option<String>,
    /// Documented errors.
    pub errors: Value,
    /// Marked for removal.
    pub deprecated: bool,
}

impl EndpointDoc {
    /// The effective auth level.
    #[must_use]
    pub fn auth_level(&self) -> AuthLevel {
        match self.auth {
            Some(level) => level,
            None if self.required_auth => AuthLevel::Required,
            None => AuthLevel::Disabled,
        }
    }
}

/// An API's endpoint catalog, in document order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Catalog {
    entries: IndexMap<String, EndpointDoc>,
}

/// One routable catalog entry.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Endpoint {
    /// The catalog key as written.
    pub catalog_key: String,
    /// HTTP method.
    pub method: Method,
    /// Path template, rooted.
    pub path: String,
    /// Auth level.
    pub auth: AuthLevel,
    /// Marked for removal.
    pub deprecated: bool,
}

impl Endpoint {
    /// The transport event key for `api`.
    #[must_use]
    pub fn event_key(&self, api: &str) -> String {
        format!("{api}.{}", self.catalog_key)
    }
}

impl Catalog {
    /// An empty catalog.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds or replaces an entry.
    #[must_use]
    pub fn with_entry(mut self, key: impl Into<String>, doc: EndpointDoc) -> Self {
        self.entries.insert(key.into(), doc);
        self
    }

    /// Looks up an entry by catalog key.
    #[must_use]
    pub fn get(&self, key: &str) -> Option<&EndpointDoc> {
        self.entries.get(key)
    }

    /// Entries in document order.
    pub fn iter(&self) -> impl Iterator<Item = (&str, &EndpointDoc)> {
        self.entries.iter().map(|(key, doc)| (key.as_str(), doc))
    }

    /// Number of entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if the catalog has no entries.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Resolves every entry into a route.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] for the first malformed key.
    pub fn endpoints(&self) -> Result<Vec<Endpoint>, GatewayError> {
        self.iter()
            .map(|(key, doc)| {
                let (method, path) = parse_catalog_key(key)?;
                Ok::<_, GatewayError>(Endpoint {
                    catalog_key: key.to_string(),
                    method,
                    path,
                    auth: doc.auth_level(),
                    deprecated: doc.deprecated,
                })
            })
            .collect()
    }
}

/// Splits a catalog key into its method and rooted path.
///
/// # Errors
///
/// Returns [`GatewayError::Configuration`] for an empty path or an
/// unsupported method.
pub fn parse_catalog_key(key: &str) -> Result<(Method, String), GatewayError> {
    let key = key.trim();
    let (method, path) = match key.split_once(char::is_whitespace) {
        Some((method, path)) => {
            let method = method.parse::<Method>().map_err(|_| {
                GatewayError::configuration(format!("unsupported method in catalog key '{key}'"))
            })?;
            (method, path.trim())
        }
        None => (Method::Get, key),
    };

    if path.is_empty() {
        return Err(GatewayError::configuration(format!(
            "catalog key '{key}' has no path"
        )));
    }

    let path = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("/{path}")
    };
    Ok((method, path))
}

// ─────────────────────────────────────────────────────────────────────────────
// DocsFetcher
// ─────────────────────────────────────────────────────────────────────────────

/// Fetches catalogs with a bounded, per-API retry budget.
///
/// The budget is spent across the fetcher's lifetime: a retry used by one
/// fetch is not available to a later fetch of the same API.
#[derive(Debug)]
pub struct DocsFetcher {
    docs_path: String,
    max_retries: u32,
    delay: Duration,
    retries: Mutex<HashMap<String, u32>>,
}

impl Default for DocsFetcher {
    fn default() -> Self {
        Self::new(
            DEFAULT_DOCS_PATH,
            0,
            Duration::from_millis(DEFAULT_RETRY_DELAY_MS),
        )
    }
}

impl DocsFetcher {
    /// Creates a fetcher.
    #[must_use]
    pub fn new(docs_path: impl Into<String>, max_retries: u32, delay: Duration) -> Self {
        Self {
            docs_path: docs_path.into(),
            max_retries,
            delay,
            retries: Mutex::new(HashMap::new()),
        }
    }

    /// Creates a fetcher from the gateway configuration.
    #[must_use]
    pub fn from_config(config: &GatewayConfig) -> Self {
        Self::new(config.docs_path.clone(), config.retries, config.retry_delay())
    }

    /// Retries spent so far on `api`.
    #[must_use]
    pub fn retries_used(&self, api: &str) -> u32 {
        self.retries.lock().get(api).copied().unwrap_or(0)
    }

    /// Fetches the catalog of `api`, returning it with the API's connector.
    ///
    /// Each attempt obtains the connector from `registry` and issues one
    /// `GET` to the docs path.
    ///
    /// # Errors
    ///
    /// Returns [`GatewayError::Configuration`] if the connector cannot be
    /// created, and [`GatewayError::Discovery`] once the retry budget is
    /// spent.
    pub async fn fetch_catalog(
        &self,
        api: &ApiDescriptor,
        registry: &ConnectorRegistry,
    ) -> Result<(Arc<dyn Connector>, Catalog), GatewayError> {
        let mut attempts = 0;
        loop {
            attempts += 1;
            let connector = registry
                .get_or_create(&api.name, &api.connection)
                .map_err(|err| GatewayError::configuration(format!("api '{}': {err}", api.name)))?;

            let err = match connector.get::<Catalog>(&self.docs_path).await {
                Ok(catalog) => {
                    debug!(api = %api.name, endpoints = catalog.len(), attempts, "catalog fetched");
                    return Ok((connector, catalog));
                }
                Err(err) => err,
            };

            let Some(retry) = self.take_retry(&api.name) else {
                return Err(GatewayError::Discovery {
                    api: api.name.clone(),
                    attempts,
                    source: err,
                });
            };

            warn!(
                api = %api.name,
                retry,
                max_retries = self.max_retries,
                delay_ms = u64::try_from(self.delay.as_millis()).unwrap_or(u64::MAX),
                error = %err,
                "catalog fetch failed, retrying"
            );
            tokio::time::sleep(self.delay).await;
        }
    }

    fn take_retry(&self, api: &str) -> Option<u32> {
        let mut retries = self.retries.lock();
        let used = retries.entry(api.to_string()).or_insert(0);
        if *used < self.max_retries {
            *used += 1;
            Some(*used)
        } else {
            None
        }
    }
}
