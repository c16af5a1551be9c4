//! Shared fixtures for gateway integration tests.

#![allow(dead_code, reason = "each test binary uses a subset of the fixtures")]

use core::sync::atomic::{AtomicUsize, Ordering};
use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use hazel_connector::mock::MockConnector;
use hazel_connector::{ConnectionOptions, Connector, Method, RequestBuilder, RequestError};
use hazel_gateway::hooks::{HookError, Signer};
use hazel_gateway::{CallContext, GatewayConfig, GatewayPlugin, HookSet};
use hazel_system::server::{Server, ServerError};
use hazel_system::transport::MemoryTransport;
use serde_json::Value;

/// A factory handing out the same mock for every API.
pub fn shared_mock(
    mock: &Arc<MockConnector>,
) -> impl Fn(&str, &ConnectionOptions) -> Result<Arc<dyn Connector>, RequestError> + Send + Sync + 'static
{
    let mock = Arc::clone(mock);
    move |_name: &str, _options: &ConnectionOptions| Ok(Arc::clone(&mock) as Arc<dyn Connector>)
}

/// A mock serving `catalog` at `/docs`.
pub fn mock_with_catalog(catalog: Value) -> Arc<MockConnector> {
    let mock = Arc::new(MockConnector::new());
    mock.respond(Method::Get, "/docs", catalog);
    mock
}

/// A single-API config for `svc`.
pub fn svc_config() -> GatewayConfig {
    GatewayConfig::default().with_api("svc", ConnectionOptions::new("http://svc.local"))
}

/// Starts a server running a gateway over `mock` with `hooks` on `svc`.
pub async fn start(
    mock: &Arc<MockConnector>,
    config: GatewayConfig,
    hooks: HookSet,
) -> (Server, MemoryTransport, Result<(), ServerError>) {
    let transport = MemoryTransport::new();
    let mut server = Server::new(transport.clone());
    server.add_plugins(
        GatewayPlugin::new(config)
            .with_hooks("svc", hooks)
            .with_connector_factory(shared_mock(mock)),
    );
    let result = server.start().await;
    (server, transport, result)
}

/// Calls to `path`, ignoring catalog fetches.
pub fn calls_to(mock: &MockConnector, path: &str) -> usize {
    mock.calls().iter().filter(|call| call.path == path).count()
}

/// A signer that counts invocations and adds an `authorization` header
/// from the caller's `token` claim.
#[derive(Debug, Default, Clone)]
pub struct CountingSigner {
    pub count: Arc<AtomicUsize>,
}

impl CountingSigner {
    pub fn calls(&self) -> usize {
        self.count.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Signer for CountingSigner {
    async fn sign(
        &self,
        context: &CallContext<'_>,
        builder: &mut RequestBuilder,
    ) -> Result<(), HookError> {
        self.count.fetch_add(1, Ordering::SeqCst);
        let identity = context.socket.identity().ok_or("no identity")?;
        if let Some(token) = identity.claim("token").and_then(Value::as_str) {
            builder.header("authorization", format!("Bearer {token}"));
        }
        Ok(())
    }
}

/// Paused-clock friendly delay used by retry tests.
pub const RETRY_DELAY: Duration = Duration::from_secs(5);
