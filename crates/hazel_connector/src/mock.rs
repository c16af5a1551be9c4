//! A scripted [`Connector`] for tests.
//!
//! Routes are keyed by method and path. Every call is recorded, including
//! calls that hit no route (those fail with a 404 status error).

use std::sync::Arc;

use async_trait::async_trait;
use hashbrown::HashMap;
use parking_lot::Mutex;
use serde_json::Value;

use crate::connector::{ApiRequest, ConnectionOptions, Connector, Method};
use crate::error::RequestError;

type Responder = Arc<dyn Fn(&ApiRequest) -> Result<Value, RequestError> + Send + Sync>;

/// A connector answering from scripted routes.
///
/// ```
/// # #[cfg(feature = "test-utils")]
/// # {
/// use hazel_connector::mock::MockConnector;
/// use hazel_connector::{ApiRequest, Connector, Method};
/// use serde_json::json;
///
/// # tokio_test::block_on(async {
/// let connector = MockConnector::new();
/// connector.respond(Method::Get, "/ping", json!("pong"));
///
/// let response = connector.send(ApiRequest::new(Method::Get, "/ping")).await.unwrap();
/// assert_eq!(response, json!("pong"));
/// assert_eq!(connector.call_count(), 1);
/// # });
/// # }
/// ```
pub struct MockConnector {
    options: ConnectionOptions,
    routes: Mutex<HashMap<(Method, String), Responder>>,
    calls: Mutex<Vec<ApiRequest>>,
}

impl core::fmt::Debug for MockConnector {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MockConnector")
            .field("options", &self.options)
            .field("calls", &self.calls.lock().len())
            .finish_non_exhaustive()
    }
}

impl Default for MockConnector {
    fn default() -> Self {
        Self::new()
    }
}

impl MockConnector {
    /// Creates a connector for `http://mock.invalid` with no routes.
    #[must_use]
    pub fn new() -> Self {
        Self::with_options(ConnectionOptions::new("http://mock.invalid"))
    }

    /// Creates a connector reporting `options`.
    #[must_use]
    pub fn with_options(options: ConnectionOptions) -> Self {
        Self {
            options,
            routes: Mutex::new(HashMap::new()),
            calls: Mutex::new(Vec::new()),
        }
    }

    /// Answers `method path` with a closure of the request.
    pub fn route(
        &self,
        method: Method,
        path: impl Into<String>,
        responder: impl Fn(&ApiRequest) -> Result<Value, RequestError> + Send + Sync + 'static,
    ) -> &Self {
        self.routes
            .lock()
            .insert((method, path.into()), Arc::new(responder));
        self
    }

    /// Answers `method path` with a fixed value.
    pub fn respond(&self, method: Method, path: impl Into<String>, value: Value) -> &Self {
        self.route(method, path, move |_| Ok(value.clone()))
    }

    /// Fails `method path` with a status error.
    pub fn fail(
        &self,
        method: Method,
        path: impl Into<String>,
        status: u16,
        message: impl Into<String>,
    ) -> &Self {
        let message = message.into();
        self.route(method, path, move |_| {
            Err(RequestError::Status {
                status,
                code: None,
                message: message.clone(),
            })
        })
    }

    /// Returns every request received so far.
    #[must_use]
    pub fn calls(&self) -> Vec<ApiRequest> {
        self.calls.lock().clone()
    }

    /// Returns the number of requests received so far.
    #[must_use]
    pub fn call_count(&self) -> usize {
        self.calls.lock().len()
    }
}

#[async_trait]
impl Connector for MockConnector {
    fn options(&self) -> &ConnectionOptions {
        &self.options
    }

    async fn send(&self, request: ApiRequest) -> Result<Value, RequestError> {
        self.calls.lock().push(request.clone());

        let responder = self
            .routes
            .lock()
            .get(&(request.method, request.path.clone()))
            .cloned();

        match responder {
            Some(responder) => responder(&request),
            None => Err(RequestError::Status {
                status: 404,
                code: None,
                message: format!("no mock route for {} {}", request.method, request.path),
            }),
        }
    }
}
