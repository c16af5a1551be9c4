//! The [`Connector`] trait and the values it exchanges.

use core::fmt;
use core::str::FromStr;
use core::time::Duration;
use std::sync::Arc;

use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

use crate::error::RequestError;

/// Callback receiving download progress in `0.0..=1.0`.
pub type ProgressCallback = Arc<dyn Fn(f64) + Send + Sync>;

// ─────────────────────────────────────────────────────────────────────────────
// Method
// ─────────────────────────────────────────────────────────────────────────────

/// HTTP method of a proxied call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum Method {
    /// `GET`
    Get,
    /// `POST`
    Post,
    /// `PUT`
    Put,
    /// `DELETE`
    Delete,
}

impl Method {
    /// Returns the upper-case method name.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Get => "GET",
            Self::Post => "POST",
            Self::Put => "PUT",
            Self::Delete => "DELETE",
        }
    }

    /// Returns true if args travel in the request body rather than the query.
    #[must_use]
    pub fn has_body(self) -> bool {
        matches!(self, Self::Post | Self::Put)
    }
}

impl fmt::Display for Method {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Method {
    type Err = RequestError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_uppercase().as_str() {
            "GET" => Ok(Self::Get),
            "POST" => Ok(Self::Post),
            "PUT" => Ok(Self::Put),
            "DELETE" => Ok(Self::Delete),
            _ => Err(RequestError::InvalidRequest(format!(
                "unsupported method '{s}'"
            ))),
        }
    }
}

impl From<Method> for reqwest::Method {
    fn from(method: Method) -> Self {
        match method {
            Method::Get => Self::GET,
            Method::Post => Self::POST,
            Method::Put => Self::PUT,
            Method::Delete => Self::DELETE,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectionOptions
// ─────────────────────────────────────────────────────────────────────────────

fn default_keep_alive() -> bool {
    true
}

/// Options a connector is created with. Never mutated afterwards.
///
/// Field names are snake case; the camel-case spellings (`dataKey`,
/// `apiKey` ...) are accepted as aliases.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ConnectionOptions {
    /// Base URL of the API.
    pub url: String,

    /// Envelope field holding the payload. Defaults to `data`.
    #[serde(default, alias = "dataKey", skip_serializing_if = "Option::is_none")]
    pub data_key: Option<String>,

    /// Envelope field holding a failure. Defaults to `error`.
    #[serde(default, alias = "errorKey", skip_serializing_if = "Option::is_none")]
    pub error_key: Option<String>,

    /// Return the whole envelope instead of the payload.
    #[serde(default, alias = "includeMeta")]
    pub include_meta: bool,

    /// Sent as the `x-api-key` header.
    #[serde(default, alias = "apiKey", skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Keep idle connections pooled.
    #[serde(default = "default_keep_alive", alias = "keepAlive")]
    pub keep_alive: bool,

    /// Log `_meta.warnings` entries of responses.
    #[serde(default, alias = "logWarnings")]
    pub log_warnings: bool,
}

impl fmt::Debug for ConnectionOptions {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConnectionOptions")
            .field("url", &self.url)
            .field("data_key", &self.data_key)
            .field("error_key", &self.error_key)
            .field("include_meta", &self.include_meta)
            .field("api_key", &self.api_key.as_ref().map(|_| "[REDACTED]"))
            .field("keep_alive", &self.keep_alive)
            .field("log_warnings", &self.log_warnings)
            .finish()
    }
}

impl ConnectionOptions {
    /// Default envelope payload field.
    pub const DEFAULT_DATA_KEY: &'static str = "data";
    /// Default envelope error field.
    pub const DEFAULT_ERROR_KEY: &'static str = "error";

    /// Creates options for `url` with every other field defaulted.
    #[must_use]
    pub fn new(url: impl Into<String>) -> Self {
        Self {
            url: url.into(),
            data_key: None,
            error_key: None,
            include_meta: false,
            api_key: None,
            keep_alive: true,
            log_warnings: false,
        }
    }

    /// Sets the API key.
    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = Some(api_key.into());
        self
    }

    /// Sets the payload field name.
    #[must_use]
    pub fn with_data_key(mut self, data_key: impl Into<String>) -> Self {
        self.data_key = Some(data_key.into());
        self
    }

    /// Sets the error field name.
    #[must_use]
    pub fn with_error_key(mut self, error_key: impl Into<String>) -> Self {
        self.error_key = Some(error_key.into());
        self
    }

    /// Returns whole envelopes instead of payloads.
    #[must_use]
    pub fn with_meta(mut self, include_meta: bool) -> Self {
        self.include_meta = include_meta;
        self
    }

    /// Enables or disables connection pooling.
    #[must_use]
    pub fn with_keep_alive(mut self, keep_alive: bool) -> Self {
        self.keep_alive = keep_alive;
        self
    }

    /// Enables logging of upstream warnings.
    #[must_use]
    pub fn with_log_warnings(mut self, log_warnings: bool) -> Self {
        self.log_warnings = log_warnings;
        self
    }

    /// The effective payload field.
    #[must_use]
    pub fn data_key(&self) -> &str {
        self.data_key.as_deref().unwrap_or(Self::DEFAULT_DATA_KEY)
    }

    /// The effective error field.
    #[must_use]
    pub fn error_key(&self) -> &str {
        self.error_key.as_deref().unwrap_or(Self::DEFAULT_ERROR_KEY)
    }

    /// Checks that the base URL is an absolute http(s) URL.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidOptions`] describing the problem.
    pub fn validate(&self) -> Result<reqwest::Url, RequestError> {
        let url = reqwest::Url::parse(&self.url).map_err(|err| {
            RequestError::InvalidOptions(format!("invalid url '{}': {err}", self.url))
        })?;
        if !matches!(url.scheme(), "http" | "https") {
            return Err(RequestError::InvalidOptions(format!(
                "unsupported scheme '{}' in '{}'",
                url.scheme(),
                self.url
            )));
        }
        if url.cannot_be_a_base() {
            return Err(RequestError::InvalidOptions(format!(
                "'{}' cannot be used as a base url",
                self.url
            )));
        }
        Ok(url)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ApiRequest
// ─────────────────────────────────────────────────────────────────────────────

/// One outbound call handed to a [`Connector`].
#[derive(Clone)]
pub struct ApiRequest {
    /// HTTP method.
    pub method: Method,
    /// Path relative to the connector's base URL, with `:name` placeholders.
    pub path: String,
    /// Body for `POST`/`PUT`, query arguments otherwise.
    pub args: Map<String, Value>,
    /// Path placeholder values; leftovers become query arguments.
    pub params: Map<String, Value>,
    /// Extra HTTP headers.
    pub headers: Map<String, Value>,
    /// Per-request timeout.
    pub timeout: Option<Duration>,
    /// Download progress callback.
    pub on_progress: Option<ProgressCallback>,
}

impl fmt::Debug for ApiRequest {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ApiRequest")
            .field("method", &self.method)
            .field("path", &self.path)
            .field("args", &self.args)
            .field("params", &self.params)
            .field("headers", &self.headers)
            .field("timeout", &self.timeout)
            .field("on_progress", &self.on_progress.is_some())
            .finish()
    }
}

impl ApiRequest {
    /// Creates a request without arguments.
    #[must_use]
    pub fn new(method: Method, path: impl Into<String>) -> Self {
        Self {
            method,
            path: path.into(),
            args: Map::new(),
            params: Map::new(),
            headers: Map::new(),
            timeout: None,
            on_progress: None,
        }
    }

    /// Sets the args.
    #[must_use]
    pub fn with_args(mut self, args: Map<String, Value>) -> Self {
        self.args = args;
        self
    }

    /// Sets the params.
    #[must_use]
    pub fn with_params(mut self, params: Map<String, Value>) -> Self {
        self.params = params;
        self
    }

    /// Sets the headers.
    #[must_use]
    pub fn with_headers(mut self, headers: Map<String, Value>) -> Self {
        self.headers = headers;
        self
    }

    /// Sets the timeout.
    #[must_use]
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

/// Renders a JSON scalar the way it appears in a URL or header.
pub(crate) fn scalar_to_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        Value::Null => String::new(),
        other => other.to_string(),
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Connector
// ─────────────────────────────────────────────────────────────────────────────

/// A client bound to one remote API.
///
/// Implementations resolve paths against their base URL, attach credentials
/// and unwrap the API's response envelope.
#[async_trait]
pub trait Connector: fmt::Debug + Send + Sync + 'static {
    /// The options the connector was created with.
    fn options(&self) -> &ConnectionOptions;

    /// Performs one call and returns the unwrapped response.
    ///
    /// # Errors
    ///
    /// Returns a [`RequestError`] for network failures, timeouts and API
    /// failures.
    async fn send(&self, request: ApiRequest) -> Result<Value, RequestError>;
}

impl dyn Connector {
    /// Sends `request` and deserializes the response.
    ///
    /// # Errors
    ///
    /// Fails as [`Connector::send`] does, or with [`RequestError::Json`] when
    /// the response does not match `T`.
    pub async fn call<T: DeserializeOwned>(&self, request: ApiRequest) -> Result<T, RequestError> {
        let value = self.send(request).await?;
        Ok(serde_json::from_value(value)?)
    }

    /// `GET path`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn get<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.call(ApiRequest::new(Method::Get, path)).await
    }

    /// `POST path` with `args` as the JSON body.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn post<T: DeserializeOwned>(
        &self,
        path: &str,
        args: Map<String, Value>,
    ) -> Result<T, RequestError> {
        self.call(ApiRequest::new(Method::Post, path).with_args(args))
            .await
    }

    /// `PUT path` with `args` as the JSON body.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn put<T: DeserializeOwned>(
        &self,
        path: &str,
        args: Map<String, Value>,
    ) -> Result<T, RequestError> {
        self.call(ApiRequest::new(Method::Put, path).with_args(args))
            .await
    }

    /// `DELETE path`.
    ///
    /// # Errors
    ///
    /// See [`call`](Self::call).
    pub async fn delete<T: DeserializeOwned>(&self, path: &str) -> Result<T, RequestError> {
        self.call(ApiRequest::new(Method::Delete, path)).await
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// ConnectorFactory
// ─────────────────────────────────────────────────────────────────────────────

/// Creates connectors from options.
///
/// Closures with the matching signature are factories:
///
/// ```
/// use std::sync::Arc;
/// use hazel_connector::{ConnectionOptions, Connector, ConnectorFactory, HttpConnector, RequestError};
///
/// let factory = |_name: &str, options: &ConnectionOptions| -> Result<Arc<dyn Connector>, RequestError> {
///     Ok(Arc::new(HttpConnector::new(options.clone())?))
/// };
/// let connector = factory.create("svc", &ConnectionOptions::new("http://localhost:8080")).unwrap();
/// assert_eq!(connector.options().url, "http://localhost:8080");
/// ```
pub trait ConnectorFactory: Send + Sync + 'static {
    /// Creates the connector for API `name`.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidOptions`] when `options` are unusable.
    fn create(
        &self,
        name: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connector>, RequestError>;
}

impl<F> ConnectorFactory for F
where
    F: Fn(&str, &ConnectionOptions) -> Result<Arc<dyn Connector>, RequestError>
        + Send
        + Sync
        + 'static,
{
    fn create(
        &self,
        name: &str,
        options: &ConnectionOptions,
    ) -> Result<Arc<dyn Connector>, RequestError> {
        self(name, options)
    }
}
