//! End-to-end behavior of the gateway over an in-memory transport.

mod common;

use core::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::{CountingSigner, RETRY_DELAY, calls_to, mock_with_catalog, start, svc_config};
use hazel_connector::mock::MockConnector;
use hazel_connector::{ConnectionOptions, Connector, Method, RequestError};
use hazel_gateway::hooks::{BroadcastFilterProvider, HookError, ResponseHandler};
use hazel_gateway::{
    ApiDescriptor, CallContext, ConnectorRegistry, DocsFetcher, GatewayConfig, GatewayError,
    GatewayPlugin, HookSet,
};
use hazel_system::server::Server;
use hazel_system::transport::{BroadcastFilter, Identity, MemoryTransport, Socket, Transport};
use parking_lot::Mutex;
use serde_json::{Value, json};

// ─────────────────────────────────────────────────────────────────────────────
// Registration
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test]
async fn ping_endpoint_proxies_the_raw_response() {
    let mock = mock_with_catalog(json!({ "/ping": { "auth": "DISABLED" } }));
    mock.respond(Method::Get, "/ping", json!({ "pong": true, "data": "untouched" }));

    let (_server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    assert_eq!(transport.event_keys(), vec!["svc./ping"]);

    let socket = transport.connect();
    let response = transport.emit(&socket, "svc./ping", json!({})).await.unwrap();

    assert_eq!(response, json!({ "pong": true, "data": "untouched" }));
    let ping = mock
        .calls()
        .into_iter()
        .find(|call| call.path == "/ping")
        .unwrap();
    assert_eq!(ping.method, Method::Get);
    assert!(ping.args.is_empty());
    assert!(ping.params.is_empty());
}

#[tokio::test]
async fn every_catalog_entry_gets_one_event() {
    let mock = mock_with_catalog(json!({
        "GET /0/user/:id": { "auth": "REQUIRED" },
        "POST /0/user": { "required_auth": true },
        "/health": {}
    }));

    let (server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    assert_eq!(
        transport.event_keys(),
        vec!["svc./health", "svc.GET /0/user/:id", "svc.POST /0/user"]
    );
    assert!(server.contains_resource::<ConnectorRegistry>());
    assert!(server.get_resource::<ConnectorRegistry>().unwrap().get("svc").is_some());
}

#[tokio::test]
async fn failed_apis_do_not_block_the_others() {
    let good = mock_with_catalog(json!({ "/ping": {} }));
    let bad = Arc::new(MockConnector::new());

    let transport = MemoryTransport::new();
    let mut server = Server::new(transport.clone());
    let (good_conn, bad_conn) = (Arc::clone(&good), Arc::clone(&bad));
    server.add_plugins(
        GatewayPlugin::new(
            GatewayConfig::default()
                .with_api("bad", ConnectionOptions::new("http://bad.local"))
                .with_api("good", ConnectionOptions::new("http://good.local")),
        )
        .with_connector_factory(
            move |name: &str, _options: &ConnectionOptions| -> Result<Arc<dyn Connector>, RequestError> {
                let mock = if name == "good" { &good_conn } else { &bad_conn };
                Ok(Arc::clone(mock) as Arc<dyn Connector>)
            },
        ),
    );

    let err = server.start().await.unwrap_err();
    let gateway_err = err.plugin_error::<GatewayError>().unwrap();

    assert_eq!(gateway_err.failed_apis(), vec!["bad"]);
    assert_eq!(transport.event_keys(), vec!["good./ping"]);
}

#[tokio::test]
async fn stopping_the_server_unregisters_events() {
    let mock = mock_with_catalog(json!({ "/a": {}, "/b": {} }));

    let (mut server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();
    assert_eq!(transport.event_keys().len(), 2);

    server.stop();

    assert!(transport.event_keys().is_empty());
    assert!(!server.contains_resource::<ConnectorRegistry>());
}

#[tokio::test]
async fn apis_added_in_code_register_after_configured_ones() {
    let mock = mock_with_catalog(json!({ "/ping": {} }));
    let transport = MemoryTransport::new();
    let mut server = Server::new(transport.clone());
    server.add_plugins(
        GatewayPlugin::new(svc_config())
            .with_api(ApiDescriptor::new("extra", ConnectionOptions::new("http://extra.local")))
            .with_connector_factory(common::shared_mock(&mock)),
    );

    server.start().await.unwrap();

    assert_eq!(transport.event_keys(), vec!["extra./ping", "svc./ping"]);
}

// ─────────────────────────────────────────────────────────────────────────────
// Catalog retries
// ─────────────────────────────────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn exhausted_retries_fail_after_n_plus_one_attempts() {
    let mock = Arc::new(MockConnector::new());
    let config = svc_config().with_retries(2).with_retry_delay(RETRY_DELAY);

    let started = tokio::time::Instant::now();
    let (_server, transport, result) = start(&mock, config, HookSet::new()).await;

    assert_eq!(calls_to(&mock, "/docs"), 3);
    assert!(started.elapsed() >= RETRY_DELAY * 2);
    assert!(started.elapsed() < RETRY_DELAY * 3);

    let err = result.unwrap_err();
    match err.plugin_error::<GatewayError>() {
        Some(GatewayError::Registration { failures }) => {
            assert!(matches!(
                failures[0].error,
                GatewayError::Discovery { attempts: 3, .. }
            ));
        }
        other => panic!("expected a registration failure, got {other:?}"),
    }
    assert!(transport.event_keys().is_empty());
}

#[tokio::test(start_paused = true)]
async fn retries_recover_from_transient_failures() {
    let mock = Arc::new(MockConnector::new());
    let attempts = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&attempts);
    mock.route(Method::Get, "/docs", move |_| {
        if counter.fetch_add(1, Ordering::SeqCst) < 2 {
            Err(RequestError::Http("connection refused".into()))
        } else {
            Ok(json!({ "/ping": {} }))
        }
    });
    let config = svc_config().with_retries(5).with_retry_delay(RETRY_DELAY);

    let started = tokio::time::Instant::now();
    let (_server, transport, result) = start(&mock, config, HookSet::new()).await;
    result.unwrap();

    assert_eq!(attempts.load(Ordering::SeqCst), 3);
    assert!(started.elapsed() >= RETRY_DELAY * 2);
    assert_eq!(transport.event_keys(), vec!["svc./ping"]);
}

#[tokio::test(start_paused = true)]
async fn retry_budget_is_never_reset() {
    let mock = Arc::new(MockConnector::new());
    let registry = ConnectorRegistry::with_factory(common::shared_mock(&mock));
    let fetcher = DocsFetcher::new("/docs", 2, RETRY_DELAY);
    let api = ApiDescriptor::new("svc", ConnectionOptions::new("http://svc.local"));

    let first = fetcher.fetch_catalog(&api, &registry).await.unwrap_err();
    let second = fetcher.fetch_catalog(&api, &registry).await.unwrap_err();

    assert!(matches!(first, GatewayError::Discovery { attempts: 3, .. }));
    assert!(matches!(second, GatewayError::Discovery { attempts: 1, .. }));
    assert_eq!(fetcher.retries_used("svc"), 2);
    assert_eq!(mock.call_count(), 4);
}

#[tokio::test]
async fn zero_retries_fail_immediately() {
    let mock = Arc::new(MockConnector::new());

    let (_server, _transport, result) = start(&mock, svc_config(), HookSet::new()).await;

    assert!(result.is_err());
    assert_eq!(mock.call_count(), 1);
}

// ─────────────────────────────────────────────────────────────────────────────
// Auth levels
// ─────────────────────────────────────────────────────────────────────────────

fn auth_catalog() -> Arc<MockConnector> {
    let mock = mock_with_catalog(json!({
        "/open": { "auth": "DISABLED" },
        "/maybe": { "auth": "OPTIONAL" },
        "/me": { "auth": "REQUIRED" }
    }));
    mock.respond(Method::Get, "/open", json!("open"));
    mock.respond(Method::Get, "/maybe", json!("maybe"));
    mock.respond(Method::Get, "/me", json!("me"));
    mock
}

fn logged_in(transport: &MemoryTransport) -> Arc<hazel_system::transport::MemorySocket> {
    let socket = transport.connect();
    socket.login(Identity::new("u1").with_claim("token", "t0k"));
    socket
}

#[tokio::test]
async fn disabled_endpoints_never_sign() {
    let mock = auth_catalog();
    let signer = CountingSigner::default();
    let (_server, transport, result) =
        start(&mock, svc_config(), HookSet::new().with_signer(signer.clone())).await;
    result.unwrap();

    let socket = logged_in(&transport);
    transport.emit(&socket, "svc./open", json!({})).await.unwrap();

    assert_eq!(signer.calls(), 0);
    let open = mock.calls().into_iter().find(|call| call.path == "/open").unwrap();
    assert!(!open.headers.contains_key("authorization"));
}

#[tokio::test]
async fn required_endpoints_reject_anonymous_callers_without_a_network_call() {
    let mock = auth_catalog();
    let signer = CountingSigner::default();
    let (_server, transport, result) =
        start(&mock, svc_config(), HookSet::new().with_signer(signer.clone())).await;
    result.unwrap();

    let socket = transport.connect();
    let err = transport.emit(&socket, "svc./me", json!({})).await.unwrap_err();

    let gateway_err = err.handler_error::<GatewayError>().unwrap();
    assert!(matches!(gateway_err, GatewayError::Authentication { .. }));
    assert_eq!(gateway_err.status_code(), 401);
    assert_eq!(calls_to(&mock, "/me"), 0);
    assert_eq!(signer.calls(), 0);
}

#[tokio::test]
async fn required_endpoints_sign_authenticated_callers() {
    let mock = auth_catalog();
    let signer = CountingSigner::default();
    let (_server, transport, result) =
        start(&mock, svc_config(), HookSet::new().with_signer(signer.clone())).await;
    result.unwrap();

    let socket = logged_in(&transport);
    let response = transport.emit(&socket, "svc./me", json!({})).await.unwrap();

    assert_eq!(response, json!("me"));
    assert_eq!(signer.calls(), 1);
    let me = mock.calls().into_iter().find(|call| call.path == "/me").unwrap();
    assert_eq!(me.headers["authorization"], "Bearer t0k");
}

#[tokio::test]
async fn optional_endpoints_sign_only_with_an_identity() {
    let mock = auth_catalog();
    let signer = CountingSigner::default();
    let (_server, transport, result) =
        start(&mock, svc_config(), HookSet::new().with_signer(signer.clone())).await;
    result.unwrap();

    let anonymous = transport.connect();
    transport.emit(&anonymous, "svc./maybe", json!({})).await.unwrap();
    assert_eq!(signer.calls(), 0);

    let user = logged_in(&transport);
    transport.emit(&user, "svc./maybe", json!({})).await.unwrap();
    assert_eq!(signer.calls(), 1);
    assert_eq!(calls_to(&mock, "/maybe"), 2);
}

#[tokio::test]
async fn missing_signer_proceeds_unsigned() {
    let mock = auth_catalog();
    let (_server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    let socket = logged_in(&transport);
    let response = transport.emit(&socket, "svc./me", json!({})).await.unwrap();

    assert_eq!(response, json!("me"));
}

#[tokio::test]
async fn failing_signer_aborts_the_call() {
    struct Refuse;

    #[async_trait]
    impl hazel_gateway::hooks::Signer for Refuse {
        async fn sign(
            &self,
            _context: &CallContext<'_>,
            _builder: &mut hazel_connector::RequestBuilder,
        ) -> Result<(), HookError> {
            Err("token expired".into())
        }
    }

    let mock = auth_catalog();
    let (_server, transport, result) =
        start(&mock, svc_config(), HookSet::new().with_signer(Refuse)).await;
    result.unwrap();

    let socket = logged_in(&transport);
    let err = transport.emit(&socket, "svc./me", json!({})).await.unwrap_err();

    assert!(matches!(
        err.handler_error::<GatewayError>(),
        Some(GatewayError::Hook { hook: "sign", .. })
    ));
    assert_eq!(calls_to(&mock, "/me"), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Response hooks
// ─────────────────────────────────────────────────────────────────────────────

struct Record(Arc<Mutex<Vec<Value>>>);

#[async_trait]
impl ResponseHandler for Record {
    async fn handle(&self, _context: &CallContext<'_>, response: &Value) -> Result<(), HookError> {
        self.0.lock().push(response.clone());
        Ok(())
    }
}

#[tokio::test]
async fn handler_observes_the_transformed_response() {
    let mock = mock_with_catalog(json!({ "/count": {} }));
    mock.respond(Method::Get, "/count", json!({ "n": 21 }));
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = HookSet::new()
        .with_transformer(|response: Value| json!({ "n": response["n"].as_i64().unwrap_or(0) * 2 }))
        .with_handler(Record(Arc::clone(&seen)));

    let (_server, transport, result) = start(&mock, svc_config(), hooks).await;
    result.unwrap();

    let socket = transport.connect();
    let response = transport.emit(&socket, "svc./count", json!({})).await.unwrap();

    assert_eq!(response, json!({ "n": 42 }));
    assert_eq!(*seen.lock(), vec![json!({ "n": 42 })]);
}

#[tokio::test]
async fn failures_reach_the_error_hook_once_and_the_caller() {
    let mock = mock_with_catalog(json!({ "/boom": {} }));
    mock.fail(Method::Get, "/boom", 500, "kaput");
    let observed = Arc::new(AtomicUsize::new(0));
    let counter = Arc::clone(&observed);
    let seen = Arc::new(Mutex::new(Vec::new()));
    let hooks = HookSet::new()
        .with_error_observer(move |context: &CallContext<'_>, error: &RequestError| {
            assert_eq!(context.endpoint, "/boom");
            assert_eq!(error.status(), Some(500));
            counter.fetch_add(1, Ordering::SeqCst);
        })
        .with_handler(Record(Arc::clone(&seen)));

    let (_server, transport, result) = start(&mock, svc_config(), hooks).await;
    result.unwrap();

    let socket = transport.connect();
    let err = transport.emit(&socket, "svc./boom", json!({})).await.unwrap_err();

    assert_eq!(observed.load(Ordering::SeqCst), 1);
    let gateway_err = err.handler_error::<GatewayError>().unwrap();
    assert!(matches!(gateway_err, GatewayError::Upstream { .. }));
    assert_eq!(gateway_err.status_code(), 500);
    assert!(seen.lock().is_empty());
}

#[tokio::test]
async fn invalid_payloads_are_rejected() {
    let mock = mock_with_catalog(json!({ "/ping": {} }));
    let (_server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    let socket = transport.connect();
    let err = transport.emit(&socket, "svc./ping", json!([1, 2])).await.unwrap_err();

    assert!(matches!(
        err.handler_error::<GatewayError>(),
        Some(GatewayError::InvalidPayload { .. })
    ));
    assert_eq!(calls_to(&mock, "/ping"), 0);
}

// ─────────────────────────────────────────────────────────────────────────────
// Broadcast
// ─────────────────────────────────────────────────────────────────────────────

fn news_catalog() -> Arc<MockConnector> {
    let mock = mock_with_catalog(json!({ "POST /news": {} }));
    mock.respond(Method::Post, "/news", json!({ "id": 1 }));
    mock
}

#[tokio::test]
async fn broadcast_reaches_other_peers_only() {
    let mock = news_catalog();
    let (_server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    let caller = transport.connect();
    let peer_a = transport.connect();
    let peer_b = transport.connect();

    let response = transport
        .emit(&caller, "svc.POST /news", json!({ "args": { "title": "hi" }, "broadcast": true }))
        .await
        .unwrap();

    assert_eq!(response, json!({ "id": 1 }));
    assert!(caller.take_messages().is_empty());
    for peer in [&peer_a, &peer_b] {
        let messages = peer.take_messages();
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0].key, "svc.POST /news");
        assert_eq!(messages[0].payload, json!({ "data": { "id": 1 } }));
        assert_eq!(messages[0].from, caller.id());
    }
}

#[tokio::test]
async fn no_broadcast_unless_asked() {
    let mock = news_catalog();
    let (_server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    let caller = transport.connect();
    let peer = transport.connect();
    transport.emit(&caller, "svc.POST /news", json!({})).await.unwrap();

    assert!(peer.take_messages().is_empty());
}

struct AuthenticatedOnly;

#[async_trait]
impl BroadcastFilterProvider for AuthenticatedOnly {
    async fn filter(&self, _socket: &dyn Socket) -> Option<BroadcastFilter> {
        Some(Arc::new(|peer: &dyn Socket| peer.is_authenticated()))
    }
}

struct Everyone;

#[async_trait]
impl BroadcastFilterProvider for Everyone {
    async fn filter(&self, _socket: &dyn Socket) -> Option<BroadcastFilter> {
        None
    }
}

#[tokio::test]
async fn broadcast_filter_selects_peers() {
    let mock = news_catalog();
    let (_server, transport, result) = start(
        &mock,
        svc_config(),
        HookSet::new().with_broadcast_filter(AuthenticatedOnly),
    )
    .await;
    result.unwrap();

    let caller = logged_in(&transport);
    let member = logged_in(&transport);
    let guest = transport.connect();

    transport
        .emit(&caller, "svc.POST /news", json!({ "broadcast": true }))
        .await
        .unwrap();

    assert_eq!(member.take_messages().len(), 1);
    assert!(guest.take_messages().is_empty());
    assert!(caller.take_messages().is_empty());
}

#[tokio::test]
async fn absent_filter_broadcasts_to_all_other_peers() {
    let mock = news_catalog();
    let (_server, transport, result) =
        start(&mock, svc_config(), HookSet::new().with_broadcast_filter(Everyone)).await;
    result.unwrap();

    let caller = transport.connect();
    let peers: Vec<_> = (0..3).map(|_| transport.connect()).collect();

    transport
        .emit(&caller, "svc.POST /news", json!({ "broadcast": true }))
        .await
        .unwrap();

    assert!(peers.iter().all(|peer| peer.take_messages().len() == 1));
    assert!(caller.take_messages().is_empty());
}

#[tokio::test]
async fn concurrent_calls_are_isolated() {
    let mock = mock_with_catalog(json!({ "/echo/:n": {} }));
    mock.route(Method::Get, "/echo/:n", |request| {
        if request.params["n"] == 3 {
            Err(RequestError::Http("reset".into()))
        } else {
            Ok(request.params["n"].clone())
        }
    });
    let (_server, transport, result) = start(&mock, svc_config(), HookSet::new()).await;
    result.unwrap();

    let socket = transport.connect();
    let calls = (0..6).map(|n| {
        let transport = transport.clone();
        let socket = Arc::clone(&socket);
        async move {
            transport
                .emit(&socket, "svc./echo/:n", json!({ "params": { "n": n } }))
                .await
        }
    });
    let results = futures::future::join_all(calls).await;

    for (n, result) in results.into_iter().enumerate() {
        if n == 3 {
            assert!(result.is_err());
        } else {
            assert_eq!(result.unwrap(), json!(n));
        }
    }
}
