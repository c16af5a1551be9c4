//! Per-endpoint proxy handlers.
//!
//! An [`EndpointHandler`] turns one transport event into one HTTP call:
//!
//! 1. decode the payload
//! 2. prepare a request from its `params`, `args` and `headers`
//! 3. enforce the endpoint's auth level and sign
//! 4. let the builder modifier adjust the request
//! 5. execute, reporting failures to the error observer
//! 6. transform the response
//! 7. hand it to the response handler
//! 8. broadcast `{ "data": response }` to the other peers when asked
//! 9. return the response

use std::sync::Arc;

use hazel_connector::{Connector, Method, RequestBuilder};
use hazel_system::transport::{BoxError, EventHandler, Socket, event_handler};
use serde::{Deserialize, Deserializer, Serialize};
use serde_json::{Map, Value, json};
use tracing::{debug, info, warn};

use crate::api::ApiDescriptor;
use crate::discovery::{AuthLevel, Endpoint};
use crate::error::GatewayError;
use crate::hooks::{CallContext, HookSet};

// ─────────────────────────────────────────────────────────────────────────────
// EventPayload
// ─────────────────────────────────────────────────────────────────────────────

/// The payload a client sends with an endpoint event.
///
/// ```
/// use hazel_gateway::EventPayload;
/// use serde_json::json;
///
/// let payload = EventPayload::from_value(json!({
///     "params": { "id": 7 },
///     "broadcast": true,
///     "trace": "abc"
/// }))
/// .unwrap();
///
/// assert!(payload.args.is_empty());
/// assert_eq!(payload.params["id"], 7);
/// assert!(payload.broadcast);
/// assert_eq!(payload.extra["trace"], "abc");
/// ```
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct EventPayload {
    /// Body or query arguments.
    #[serde(default, deserialize_with = "nullable")]
    pub args: Map<String, Value>,
    /// Path parameters.
    #[serde(default, deserialize_with = "nullable")]
    pub params: Map<String, Value>,
    /// Extra request headers.
    #[serde(default, deserialize_with = "nullable")]
    pub headers: Map<String, Value>,
    /// Broadcast the response to the other peers.
    #[serde(default, deserialize_with = "nullable")]
    pub broadcast: bool,
    /// Auth scheme requested by the client.
    #[serde(default, rename = "authType", skip_serializing_if = "Option::is_none")]
    pub auth_type: Option<String>,
    /// Any other fields, passed through to hooks.
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de> + Default,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}

impl EventPayload {
    /// Decodes a raw payload. `null` is the empty payload.
    ///
    /// # Errors
    ///
    /// Fails for non-object payloads and mistyped reserved fields.
    pub fn from_value(value: Value) -> Result<Self, serde_json::Error> {
        if value.is_null() {
            return Ok(Self::default());
        }
        serde_json::from_value(value)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EndpointHandler
// ─────────────────────────────────────────────────────────────────────────────

/// Proxies one catalog endpoint of one API.
pub struct EndpointHandler {
    key: String,
    api: String,
    method: Method,
    path: String,
    auth: AuthLevel,
    connector: Arc<dyn Connector>,
    hooks: HookSet,
    logging: bool,
}

impl core::fmt::Debug for EndpointHandler {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EndpointHandler")
            .field("key", &self.key)
            .field("auth", &self.auth)
            .field("hooks", &self.hooks)
            .finish_non_exhaustive()
    }
}

impl EndpointHandler {
    /// Creates the handler for `endpoint` of `api`.
    #[must_use]
    pub fn new(
        api: &ApiDescriptor,
        endpoint: &Endpoint,
        connector: Arc<dyn Connector>,
        logging: bool,
    ) -> Self {
        Self {
            key: endpoint.event_key(&api.name),
            api: api.name.clone(),
            method: endpoint.method,
            path: endpoint.path.clone(),
            auth: endpoint.auth,
            connector,
            hooks: api.hooks.clone(),
            logging,
        }
    }

    /// The event key this handler serves.
    #[must_use]
    pub fn key(&self) -> &str {
        &self.key
    }

    /// The endpoint's auth level.
    #[must_use]
    pub fn auth_level(&self) -> AuthLevel {
        self.auth
    }

    /// Wraps the handler for [`Transport::register_event`](hazel_system::transport::Transport::register_event).
    ///
    /// Errors cross the transport boxed and can be downcast back to
    /// [`GatewayError`].
    #[must_use]
    pub fn into_event_handler(self) -> EventHandler {
        let handler = Arc::new(self);
        event_handler(move |socket, payload| {
            let handler = Arc::clone(&handler);
            async move {
                handler.dispatch(socket, payload).await.map_err(|err| {
                    warn!(
                        key = %handler.key,
                        code = err.code(),
                        error = %err,
                        "call failed"
                    );
                    Box::new(err) as BoxError
                })
            }
        })
    }

    /// Runs one call on behalf of `socket`.
    ///
    /// # Errors
    ///
    /// - [`GatewayError::InvalidPayload`] if `payload` cannot be decoded
    /// - [`GatewayError::Authentication`] for an anonymous caller of an
    ///   endpoint requiring auth; nothing is sent
    /// - [`GatewayError::Hook`] if the signer or response handler fails
    /// - [`GatewayError::Upstream`] if the call fails or times out
    ///
    /// A failed broadcast is logged; the caller still gets the response.
    pub async fn dispatch(
        &self,
        socket: Arc<dyn Socket>,
        payload: Value,
    ) -> Result<Value, GatewayError> {
        let payload =
            EventPayload::from_value(payload).map_err(|err| GatewayError::InvalidPayload {
                key: self.key.clone(),
                message: err.to_string(),
            })?;

        if self.logging {
            let params_size = serde_json::to_string(&payload.params).map_or(0, |json| json.len());
            let args = Value::Object(payload.args.clone());
            info!(
                api = %self.api,
                method = %self.method,
                endpoint = %self.path,
                args = %args,
                params_size,
                "proxying call"
            );
        }

        let mut builder = RequestBuilder::for_connector(self.api.clone(), Arc::clone(&self.connector));
        builder
            .method(self.method)
            .endpoint(&self.path)
            .params(Value::Object(payload.params.clone()))
            .args(Value::Object(payload.args.clone()))
            .headers(payload.headers.clone());

        let context = CallContext {
            socket: socket.as_ref(),
            api: &self.api,
            method: self.method,
            endpoint: &self.path,
            payload: &payload,
        };

        let sign = match self.auth {
            AuthLevel::Required if !socket.is_authenticated() => {
                return Err(GatewayError::Authentication {
                    api: self.api.clone(),
                    method: self.method,
                    path: self.path.clone(),
                });
            }
            AuthLevel::Required => true,
            AuthLevel::Optional => socket.is_authenticated(),
            AuthLevel::Disabled => false,
        };
        if sign && let Some(signer) = &self.hooks.signer {
            signer
                .sign(&context, &mut builder)
                .await
                .map_err(|source| self.hook_error("sign", source))?;
        }

        if let Some(modifier) = &self.hooks.modifier {
            modifier.modify(&context, &mut builder);
        }

        let response = match builder.execute().await {
            Ok(response) => response,
            Err(source) => {
                if let Some(observer) = &self.hooks.error_observer {
                    observer.on_error(&context, &source);
                }
                return Err(GatewayError::Upstream {
                    api: self.api.clone(),
                    method: self.method,
                    path: self.path.clone(),
                    source,
                });
            }
        };

        let response = match &self.hooks.transformer {
            Some(transformer) => transformer.transform(response),
            None => response,
        };

        if let Some(handler) = &self.hooks.handler {
            handler
                .handle(&context, &response)
                .await
                .map_err(|source| self.hook_error("handle_response", source))?;
        }

        if payload.broadcast {
            let filter = match &self.hooks.broadcast_filter {
                Some(provider) => provider.filter(socket.as_ref()).await,
                None => None,
            };
            match socket.broadcast(
                &self.key,
                json!({ "data": response.clone() }),
                false,
                filter.as_ref(),
            ) {
                Ok(delivered) => {
                    debug!(key = %self.key, delivered, filtered = filter.is_some(), "response broadcast");
                }
                Err(err) => warn!(key = %self.key, error = %err, "broadcast failed"),
            }
        }

        Ok(response)
    }

    fn hook_error(&self, hook: &'static str, source: crate::hooks::HookError) -> GatewayError {
        GatewayError::Hook {
            api: self.api.clone(),
            hook,
            source,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hazel_connector::ConnectionOptions;
    use hazel_connector::mock::MockConnector;
    use hazel_system::transport::MemoryTransport;

    fn endpoint(method: Method, path: &str, auth: AuthLevel) -> Endpoint {
        Endpoint {
            catalog_key: format!("{method} {path}"),
            method,
            path: path.to_string(),
            auth,
            deprecated: false,
        }
    }

    fn handler(mock: &Arc<MockConnector>, endpoint: &Endpoint, hooks: HookSet) -> EndpointHandler {
        let api = ApiDescriptor::new("svc", ConnectionOptions::new("http://svc.local")).with_hooks(hooks);
        EndpointHandler::new(&api, endpoint, Arc::clone(mock) as Arc<dyn Connector>, false)
    }

    #[test]
    fn payload_defaults_and_rejections() {
        let payload = EventPayload::from_value(Value::Null).unwrap();
        assert_eq!(payload, EventPayload::default());

        let payload = EventPayload::from_value(json!({ "args": null, "broadcast": null })).unwrap();
        assert!(payload.args.is_empty());
        assert!(!payload.broadcast);

        assert!(EventPayload::from_value(json!([1, 2])).is_err());
        assert!(EventPayload::from_value(json!("text")).is_err());
        assert!(EventPayload::from_value(json!({ "args": [1] })).is_err());
    }

    #[test]
    fn payload_keeps_auth_type_and_extra_fields() {
        let payload =
            EventPayload::from_value(json!({ "authType": "bearer", "locale": "en" })).unwrap();
        assert_eq!(payload.auth_type.as_deref(), Some("bearer"));
        assert_eq!(payload.extra["locale"], "en");
        assert!(!payload.extra.contains_key("authType"));
    }

    #[tokio::test]
    async fn params_args_and_headers_reach_the_connector() {
        let mock = Arc::new(MockConnector::new());
        mock.respond(Method::Post, "/0/user/:id", json!({ "ok": true }));
        let handler = handler(&mock, &endpoint(Method::Post, "/0/user/:id", AuthLevel::Disabled), HookSet::new());

        let transport = MemoryTransport::new();
        let socket = transport.connect();
        let response = handler
            .dispatch(
                socket,
                json!({ "params": { "id": 1 }, "args": { "name": "x" }, "headers": { "x-h": "v" } }),
            )
            .await
            .unwrap();

        assert_eq!(response, json!({ "ok": true }));
        let call = &mock.calls()[0];
        assert_eq!(call.params["id"], 1);
        assert_eq!(call.args["name"], "x");
        assert_eq!(call.headers["x-h"], "v");
    }

    #[tokio::test]
    async fn invalid_payload_sends_nothing() {
        let mock = Arc::new(MockConnector::new());
        let handler = handler(&mock, &endpoint(Method::Get, "/x", AuthLevel::Disabled), HookSet::new());

        let socket = MemoryTransport::new().connect();
        let err = handler.dispatch(socket, json!(42)).await.unwrap_err();

        assert!(matches!(err, GatewayError::InvalidPayload { .. }));
        assert_eq!(mock.call_count(), 0);
    }

    #[derive(Debug)]
    struct SlowConnector(ConnectionOptions);

    #[async_trait::async_trait]
    impl Connector for SlowConnector {
        fn options(&self) -> &ConnectionOptions {
            &self.0
        }

        async fn send(
            &self,
            _request: hazel_connector::ApiRequest,
        ) -> Result<Value, hazel_connector::RequestError> {
            tokio::time::sleep(core::time::Duration::from_secs(60)).await;
            Ok(json!("late"))
        }
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_reaches_the_error_observer_once() {
        use core::sync::atomic::{AtomicUsize, Ordering};
        use core::time::Duration;
        use hazel_connector::RequestError;

        let observed = Arc::new(AtomicUsize::new(0));
        let seen = Arc::clone(&observed);
        let hooks = HookSet::new()
            .with_modifier(|_: &CallContext<'_>, builder: &mut RequestBuilder| {
                builder.timeout(Duration::from_millis(50));
            })
            .with_error_observer(move |_: &CallContext<'_>, error: &RequestError| {
                assert!(matches!(error, RequestError::Timeout(_)));
                seen.fetch_add(1, Ordering::SeqCst);
            });
        let api = ApiDescriptor::new("svc", ConnectionOptions::new("http://svc.local")).with_hooks(hooks);
        let connector: Arc<dyn Connector> =
            Arc::new(SlowConnector(ConnectionOptions::new("http://svc.local")));
        let handler = EndpointHandler::new(
            &api,
            &endpoint(Method::Get, "/slow", AuthLevel::Disabled),
            connector,
            false,
        );

        let started = tokio::time::Instant::now();
        let err = handler
            .dispatch(MemoryTransport::new().connect(), json!({}))
            .await
            .unwrap_err();

        assert!(started.elapsed() < Duration::from_secs(1));
        assert!(matches!(
            err,
            GatewayError::Upstream { source: RequestError::Timeout(_), .. }
        ));
        assert_eq!(err.status_code(), 504);
        assert_eq!(observed.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn failed_broadcast_still_returns_the_response() {
        let mock = Arc::new(MockConnector::new());
        mock.respond(Method::Get, "/x", json!({ "n": 1 }));
        let handler = handler(&mock, &endpoint(Method::Get, "/x", AuthLevel::Disabled), HookSet::new());

        let socket = {
            let transport = MemoryTransport::new();
            transport.connect()
        };
        let response = handler
            .dispatch(socket, json!({ "broadcast": true }))
            .await
            .unwrap();

        assert_eq!(response, json!({ "n": 1 }));
        assert_eq!(mock.call_count(), 1);
    }

    #[tokio::test]
    async fn modifier_runs_before_execution() {
        let mock = Arc::new(MockConnector::new());
        mock.respond(Method::Get, "/x", json!(1));
        let hooks = HookSet::new().with_modifier(|_: &CallContext<'_>, builder: &mut RequestBuilder| {
            builder.header("x-modified", "yes");
        });
        let handler = handler(&mock, &endpoint(Method::Get, "/x", AuthLevel::Disabled), hooks);

        handler
            .dispatch(MemoryTransport::new().connect(), json!({}))
            .await
            .unwrap();

        assert_eq!(mock.calls()[0].headers["x-modified"], "yes");
    }
}
