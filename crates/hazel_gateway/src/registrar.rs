//! Registers one handler per catalog endpoint.

use std::sync::Arc;

use hashbrown::HashSet;
use hazel_connector::Connector;
use hazel_system::transport::Transport;
use tracing::{debug, warn};

use crate::api::ApiDescriptor;
use crate::config::validate_api_name;
use crate::discovery::Catalog;
use crate::dispatcher::EndpointHandler;
use crate::error::GatewayError;

/// Registers every endpoint of `catalog` for `api` on `transport`.
///
/// Registration is all or nothing for the API: keys are checked for
/// collisions first, and handlers registered before a failure are removed.
/// Returns the registered event keys in catalog order.
///
/// # Errors
///
/// Returns [`GatewayError::Configuration`] for an unusable API name, a
/// malformed catalog or a key that is already taken, and
/// [`GatewayError::Transport`] if the transport refuses a handler.
pub fn register_api(
    transport: &dyn Transport,
    api: &ApiDescriptor,
    connector: &Arc<dyn Connector>,
    catalog: &Catalog,
    logging: bool,
) -> Result<Vec<String>, GatewayError> {
    validate_api_name(&api.name).map_err(GatewayError::Configuration)?;

    let endpoints = catalog.endpoints()?;
    let mut seen = HashSet::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        let key = endpoint.event_key(&api.name);
        if transport.has_event(&key) || !seen.insert(key.clone()) {
            return Err(GatewayError::configuration(format!(
                "event '{key}' is already registered"
            )));
        }
    }

    let mut registered: Vec<String> = Vec::with_capacity(endpoints.len());
    for endpoint in &endpoints {
        if endpoint.deprecated {
            warn!(api = %api.name, endpoint = %endpoint.catalog_key, "registering deprecated endpoint");
        }
        if endpoint.auth.accepts_auth() && !api.hooks.has_signer() {
            warn!(
                api = %api.name,
                endpoint = %endpoint.catalog_key,
                auth = ?endpoint.auth,
                "endpoint accepts auth but the api has no signer; calls go out unsigned"
            );
        }

        let handler = EndpointHandler::new(api, endpoint, Arc::clone(connector), logging);
        let key = handler.key().to_string();
        if let Err(err) = transport.register_event(&key, handler.into_event_handler()) {
            for key in &registered {
                transport.unregister_event(key);
            }
            return Err(err.into());
        }
        debug!(key = %key, auth = ?endpoint.auth, "endpoint registered");
        registered.push(key);
    }

    Ok(registered)
}
