//! Fluent request descriptors.
//!
//! A [`RequestBuilder`] accumulates one call against a named API and turns it
//! into a [`BuiltRequest`]: an event-style key plus a JSON payload. Executing
//! the builder hands that pair to the bound [`RequestExecutor`].
//!
//! # Key format
//!
//! `<api>.<METHOD> [/<version>]<endpoint>`, for example `svc.POST /2/foo`.
//!
//! # Example
//!
//! ```
//! use hazel_connector::RequestBuilder;
//! use serde_json::json;
//!
//! let mut builder = RequestBuilder::new("svc");
//! builder.post("foo").v(2).params(json!({ "a": 1 })).args(json!({ "b": 2 }));
//!
//! let built = builder.build().unwrap();
//! assert_eq!(built.key, "svc.POST /2/foo");
//! assert_eq!(
//!     serde_json::Value::Object(built.payload),
//!     json!({ "params": { "a": 1 }, "args": { "b": 2 } })
//! );
//! ```
//!
//! Executing consumes the builder, so it cannot be reused:
//!
//! ```compile_fail
//! use hazel_connector::RequestBuilder;
//!
//! async fn twice(mut builder: RequestBuilder) {
//!     builder.get("/ping");
//!     let _ = builder.execute().await;
//!     let _ = builder.execute().await;
//! }
//! ```

use core::fmt;
use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::{Map, Value};
use tracing::debug;

use crate::connector::{Connector, Method, ProgressCallback};
use crate::error::RequestError;
use crate::executor::{ConnectorExecutor, EventExecutor};
use hazel_system::transport::EventEmitter;

/// Payload field names the builder owns.
pub mod fields {
    /// Request arguments.
    pub const ARGS: &str = "args";
    /// Path and query parameters.
    pub const PARAMS: &str = "params";
    /// Extra headers.
    pub const HEADERS: &str = "headers";
    /// Broadcast flag.
    pub const BROADCAST: &str = "broadcast";
    /// Requested auth type.
    pub const AUTH_TYPE: &str = "authType";
}

// ─────────────────────────────────────────────────────────────────────────────
// BuiltRequest / RequestExecutor
// ─────────────────────────────────────────────────────────────────────────────

/// The executable form of a request.
#[derive(Clone)]
pub struct BuiltRequest {
    /// `<api>.<METHOD> [/<version>]<endpoint>`
    pub key: String,
    /// Reserved fields plus pass-through data.
    pub payload: Map<String, Value>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Progress callback.
    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for BuiltRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("BuiltRequest")
            .field("key", &self.key)
            .field("payload", &self.payload)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl BuiltRequest {
    /// Splits the key into api name, method and path.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidKey`] when the key is malformed.
    pub fn parse_key(&self) -> Result<(&str, Method, &str), RequestError> {
        parse_key(&self.key)
    }

    /// Returns a reserved object field, or an empty map if absent.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidRequest`] if the field is not an object.
    pub fn object_field(&self, field: &str) -> Result<Map<String, Value>, RequestError> {
        match self.payload.get(field) {
            None | Some(Value::Null) => Ok(Map::new()),
            Some(Value::Object(map)) => Ok(map.clone()),
            Some(other) => Err(RequestError::InvalidRequest(format!(
                "'{field}' must be an object, got {other}"
            ))),
        }
    }
}

/// Parses `<api>.<METHOD> <path>`.
///
/// The api name ends at the first `.`; api names therefore never contain one.
///
/// # Errors
///
/// Returns [`RequestError::InvalidKey`] when the key is malformed.
pub fn parse_key(key: &str) -> Result<(&str, Method, &str), RequestError> {
    let invalid = || RequestError::InvalidKey(key.to_string());

    let (api, rest) = key.split_once('.').ok_or_else(invalid)?;
    let (method, path) = rest.split_once(' ').ok_or_else(invalid)?;
    if api.is_empty() || !path.starts_with('/') {
        return Err(invalid());
    }
    let method = method.parse::<Method>().map_err(|_| invalid())?;
    Ok((api, method, path))
}

/// Carries a [`BuiltRequest`] to wherever it is served.
#[async_trait]
pub trait RequestExecutor: Send + Sync + 'static {
    /// Executes the request and returns its response.
    ///
    /// # Errors
    ///
    /// Returns the [`RequestError`] raised while executing.
    async fn execute(&self, request: BuiltRequest) -> Result<Value, RequestError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// RequestBuilder
// ─────────────────────────────────────────────────────────────────────────────

/// Fluent accumulator for one request against a named API.
///
/// Setters mutate the builder and return it for chaining. See the
/// [module docs](self) for the key format.
#[derive(Clone)]
pub struct RequestBuilder {
    api_name: String,
    executor: Option<Arc<dyn RequestExecutor>>,
    method: Option<Method>,
    version: Option<String>,
    endpoint: Option<String>,
    args: Option<Value>,
    params: Option<Value>,
    headers: Option<Map<String, Value>>,
    data: Map<String, Value>,
    auth_type: Option<String>,
    timeout: Option<Duration>,
    on_progress: Option<ProgressCallback>,
    broadcast: Option<bool>,
}

impl fmt::Debug for RequestBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("RequestBuilder")
            .field("api_name", &self.api_name)
            .field("bound", &self.executor.is_some())
            .field("method", &self.method)
            .field("version", &self.version)
            .field("endpoint", &self.endpoint)
            .field("args", &self.args)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("data", &self.data)
            .field("auth_type", &self.auth_type)
            .field("timeout", &self.timeout)
            .field("broadcast", &self.broadcast)
            .finish_non_exhaustive()
    }
}

impl RequestBuilder {
    /// Creates an unbound builder for `api_name`.
    ///
    /// An unbound builder can be built but not executed.
    #[must_use]
    pub fn new(api_name: impl Into<String>) -> Self {
        Self {
            api_name: api_name.into(),
            executor: None,
            method: None,
            version: None,
            endpoint: None,
            args: None,
            params: None,
            headers: None,
            data: Map::new(),
            auth_type: None,
            timeout: None,
            on_progress: None,
            broadcast: None,
        }
    }

    /// Creates a builder bound to `executor`.
    #[must_use]
    pub fn bound(api_name: impl Into<String>, executor: Arc<dyn RequestExecutor>) -> Self {
        let mut builder = Self::new(api_name);
        builder.executor = Some(executor);
        builder
    }

    /// Creates a builder executing through `connector` over HTTP.
    #[must_use]
    pub fn for_connector(api_name: impl Into<String>, connector: Arc<dyn Connector>) -> Self {
        Self::bound(api_name, Arc::new(ConnectorExecutor::new(connector)))
    }

    /// Creates a builder emitting its request as an event through `emitter`.
    #[must_use]
    pub fn for_emitter(api_name: impl Into<String>, emitter: Arc<dyn EventEmitter>) -> Self {
        Self::bound(api_name, Arc::new(EventExecutor::new(emitter)))
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Setters
    // ─────────────────────────────────────────────────────────────────────────

    /// Sets the HTTP method.
    pub fn method(&mut self, method: Method) -> &mut Self {
        self.method = Some(method);
        self
    }

    /// Sets the API version, rendered as a `/<version>` path prefix.
    pub fn version(&mut self, version: impl fmt::Display) -> &mut Self {
        self.version = Some(version.to_string());
        self
    }

    /// Alias for [`version`](Self::version).
    pub fn v(&mut self, version: impl fmt::Display) -> &mut Self {
        self.version(version)
    }

    /// Sets the endpoint path. A missing leading `/` is added.
    pub fn endpoint(&mut self, endpoint: impl AsRef<str>) -> &mut Self {
        self.endpoint = Some(normalize_endpoint(endpoint.as_ref()));
        self
    }

    /// Sets the request arguments (a JSON object).
    pub fn args(&mut self, args: Value) -> &mut Self {
        self.args = Some(args);
        self
    }

    /// Sets the path/query parameters (a JSON object).
    pub fn params(&mut self, params: Value) -> &mut Self {
        self.params = Some(params);
        self
    }

    /// Replaces all headers.
    pub fn headers(&mut self, headers: Map<String, Value>) -> &mut Self {
        self.headers = Some(headers);
        self
    }

    /// Inserts one header, keeping the others.
    pub fn header(&mut self, name: impl Into<String>, value: impl Into<Value>) -> &mut Self {
        self.headers
            .get_or_insert_with(Map::new)
            .insert(name.into(), value.into());
        self
    }

    /// Merges pass-through fields into the payload.
    ///
    /// Pass-through fields override reserved fields of the same name.
    pub fn data(&mut self, data: Map<String, Value>) -> &mut Self {
        self.data.extend(data);
        self
    }

    /// Sets the requested auth type.
    pub fn auth_type(&mut self, auth_type: impl Into<String>) -> &mut Self {
        self.auth_type = Some(auth_type.into());
        self
    }

    /// Sets the request timeout.
    pub fn timeout(&mut self, timeout: Duration) -> &mut Self {
        self.timeout = Some(timeout);
        self
    }

    /// Sets the progress callback.
    pub fn on_progress(&mut self, callback: impl Fn(f64) + Send + Sync + 'static) -> &mut Self {
        self.on_progress = Some(Arc::new(callback));
        self
    }

    /// Sets the broadcast flag.
    pub fn broadcast(&mut self, broadcast: bool) -> &mut Self {
        self.broadcast = Some(broadcast);
        self
    }

    /// `GET path`.
    pub fn get(&mut self, path: impl AsRef<str>) -> &mut Self {
        self.method(Method::Get).endpoint(path)
    }

    /// `POST path`.
    pub fn post(&mut self, path: impl AsRef<str>) -> &mut Self {
        self.method(Method::Post).endpoint(path)
    }

    /// `PUT path`.
    pub fn put(&mut self, path: impl AsRef<str>) -> &mut Self {
        self.method(Method::Put).endpoint(path)
    }

    /// `DELETE path`.
    pub fn delete(&mut self, path: impl AsRef<str>) -> &mut Self {
        self.method(Method::Delete).endpoint(path)
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Accessors
    // ─────────────────────────────────────────────────────────────────────────

    /// The API this builder targets.
    #[must_use]
    pub fn api_name(&self) -> &str {
        &self.api_name
    }

    /// The method, if set.
    #[must_use]
    pub fn get_method(&self) -> Option<Method> {
        self.method
    }

    /// The normalized endpoint, if set.
    #[must_use]
    pub fn get_endpoint(&self) -> Option<&str> {
        self.endpoint.as_deref()
    }

    /// The headers set so far.
    #[must_use]
    pub fn get_headers(&self) -> Option<&Map<String, Value>> {
        self.headers.as_ref()
    }

    /// Returns true if an executor is bound.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.executor.is_some()
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Build / Execute
    // ─────────────────────────────────────────────────────────────────────────

    /// Produces the request key and payload.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Incomplete`] without a method or endpoint and
    /// [`RequestError::InvalidRequest`] when args or params are not objects.
    pub fn build(&self) -> Result<BuiltRequest, RequestError> {
        let method = self.method.ok_or(RequestError::Incomplete("method"))?;
        let endpoint = self
            .endpoint
            .as_deref()
            .ok_or(RequestError::Incomplete("endpoint"))?;

        let key = match &self.version {
            Some(version) => format!("{}.{method} /{version}{endpoint}", self.api_name),
            None => format!("{}.{method} {endpoint}", self.api_name),
        };

        let mut payload = Map::new();
        if let Some(args) = &self.args {
            payload.insert(fields::ARGS.into(), expect_object(fields::ARGS, args)?);
        }
        if let Some(params) = &self.params {
            payload.insert(fields::PARAMS.into(), expect_object(fields::PARAMS, params)?);
        }
        if let Some(headers) = &self.headers {
            payload.insert(fields::HEADERS.into(), Value::Object(headers.clone()));
        }
        if let Some(broadcast) = self.broadcast {
            payload.insert(fields::BROADCAST.into(), Value::Bool(broadcast));
        }
        if let Some(auth_type) = &self.auth_type {
            payload.insert(fields::AUTH_TYPE.into(), Value::String(auth_type.clone()));
        }
        payload.extend(self.data.clone());

        Ok(BuiltRequest {
            key,
            payload,
            timeout: self.timeout,
            on_progress: self.on_progress.clone(),
        })
    }

    /// Builds the request and hands it to the bound executor.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::Unbound`] without an executor, any
    /// [`build`](Self::build) error, or the executor's error.
    pub async fn execute(self) -> Result<Value, RequestError> {
        let executor = self.executor.clone().ok_or(RequestError::Unbound)?;
        let request = self.build()?;
        debug!(key = %request.key, "executing request");
        executor.execute(request).await
    }

    /// Executes and deserializes the response into `T`.
    ///
    /// # Errors
    ///
    /// Fails as [`execute`](Self::execute) does, or with [`RequestError::Json`].
    pub async fn execute_as<T: DeserializeOwned>(self) -> Result<T, RequestError> {
        let value = self.execute().await?;
        Ok(serde_json::from_value(value)?)
    }
}

fn normalize_endpoint(endpoint: &str) -> String {
    if endpoint.starts_with('/') {
        endpoint.to_string()
    } else {
        format!("/{endpoint}")
    }
}

fn expect_object(field: &str, value: &Value) -> Result<Value, RequestError> {
    match value {
        Value::Object(_) => Ok(value.clone()),
        other => Err(RequestError::InvalidRequest(format!(
            "'{field}' must be an object, got {other}"
        ))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use parking_lot::Mutex;
    use serde_json::json;

    /// Records what it was asked to execute and echoes the payload.
    #[derive(Default)]
    struct Recording {
        seen: Mutex<Vec<BuiltRequest>>,
    }

    #[async_trait]
    impl RequestExecutor for Recording {
        async fn execute(&self, request: BuiltRequest) -> Result<Value, RequestError> {
            let payload = Value::Object(request.payload.clone());
            self.seen.lock().push(request);
            Ok(payload)
        }
    }

    #[test]
    fn build_omits_unset_reserved_fields() {
        let mut builder = RequestBuilder::new("svc");
        builder.post("foo").v(2).params(json!({"a": 1})).args(json!({"b": 2}));

        let built = builder.build().unwrap();
        assert_eq!(built.key, "svc.POST /2/foo");
        assert_eq!(built.payload.len(), 2);
        assert!(!built.payload.contains_key("headers"));
        assert!(!built.payload.contains_key("broadcast"));
        assert!(!built.payload.contains_key("authType"));
    }

    #[test]
    fn build_without_version_has_no_prefix() {
        let mut builder = RequestBuilder::new("svc");
        builder.get("/ping");
        assert_eq!(builder.build().unwrap().key, "svc.GET /ping");
    }

    #[test]
    fn pass_through_data_wins_over_reserved_fields() {
        let mut builder = RequestBuilder::new("svc");
        builder
            .get("/x")
            .broadcast(false)
            .auth_type("token")
            .data(json!({"broadcast": true, "trace": "abc"}).as_object().cloned().unwrap());

        let payload = builder.build().unwrap().payload;
        assert_eq!(payload["broadcast"], json!(true));
        assert_eq!(payload["authType"], json!("token"));
        assert_eq!(payload["trace"], json!("abc"));
    }

    #[test]
    fn header_accumulates() {
        let mut builder = RequestBuilder::new("svc");
        builder
            .get("/x")
            .header("authorization", "Bearer t")
            .header("x-trace", 7);

        let payload = builder.build().unwrap().payload;
        assert_eq!(
            payload["headers"],
            json!({"authorization": "Bearer t", "x-trace": 7})
        );
    }

    #[test]
    fn missing_method_or_endpoint_is_incomplete() {
        let mut builder = RequestBuilder::new("svc");
        assert!(matches!(
            builder.build(),
            Err(RequestError::Incomplete("method"))
        ));

        builder.method(Method::Get);
        assert!(matches!(
            builder.build(),
            Err(RequestError::Incomplete("endpoint"))
        ));
    }

    #[test]
    fn non_object_args_are_rejected() {
        let mut builder = RequestBuilder::new("svc");
        builder.get("/x").args(json!([1, 2]));
        assert!(matches!(
            builder.build(),
            Err(RequestError::InvalidRequest(_))
        ));
    }

    #[tokio::test]
    async fn unbound_execute_fails_fast() {
        let mut builder = RequestBuilder::new("svc");
        builder.get("/x");
        assert!(matches!(
            builder.execute().await,
            Err(RequestError::Unbound)
        ));
    }

    #[tokio::test]
    async fn execute_hands_the_built_request_to_the_executor() {
        let executor = Arc::new(Recording::default());
        let mut builder = RequestBuilder::bound("svc", executor.clone());
        builder
            .put("/items/:id")
            .params(json!({"id": 3}))
            .timeout(Duration::from_secs(2));

        let response = builder.execute().await.unwrap();
        assert_eq!(response, json!({"params": {"id": 3}}));

        let seen = executor.seen.lock();
        assert_eq!(seen.len(), 1);
        assert_eq!(seen[0].key, "svc.PUT /items/:id");
        assert_eq!(seen[0].timeout, Some(Duration::from_secs(2)));
    }

    #[tokio::test]
    async fn execute_as_deserializes() {
        #[derive(serde::Deserialize)]
        struct Echo {
            params: Map<String, Value>,
        }

        let mut builder = RequestBuilder::bound("svc", Arc::new(Recording::default()));
        builder.get("/x").params(json!({"q": "rust"}));

        let echo: Echo = builder.execute_as().await.unwrap();
        assert_eq!(echo.params["q"], json!("rust"));
    }

    #[test]
    fn parse_key_round_trips_built_keys() {
        let mut builder = RequestBuilder::new("svc");
        builder.delete("users/:id").version("v1");
        let built = builder.build().unwrap();

        let (api, method, path) = built.parse_key().unwrap();
        assert_eq!(api, "svc");
        assert_eq!(method, Method::Delete);
        assert_eq!(path, "/v1/users/:id");
    }

    #[test]
    fn parse_key_rejects_malformed_keys() {
        for key in ["svc", "svc.GET", ".GET /x", "svc.FETCH /x", "svc.GET x"] {
            assert!(
                matches!(parse_key(key), Err(RequestError::InvalidKey(_))),
                "{key} should be rejected"
            );
        }
    }
}
