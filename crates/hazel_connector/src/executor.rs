//! Executors carrying built requests to a connector or over a transport.

use std::sync::Arc;

use async_trait::async_trait;
use hazel_system::transport::EventEmitter;
use serde_json::Value;
use tracing::debug;

use crate::connector::{ApiRequest, Connector};
use crate::error::RequestError;
use crate::request::{BuiltRequest, RequestExecutor, fields};

// ─────────────────────────────────────────────────────────────────────────────
// ConnectorExecutor
// ─────────────────────────────────────────────────────────────────────────────

/// Executes built requests as HTTP calls through a [`Connector`].
///
/// The key is parsed back into method and path. `args`, `params` and
/// `headers` are forwarded; `broadcast`, `authType` and pass-through data
/// stay on the caller's side. The timeout is enforced here whatever the
/// connector does with it.
#[derive(Clone)]
pub struct ConnectorExecutor {
    connector: Arc<dyn Connector>,
}

impl core::fmt::Debug for ConnectorExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("ConnectorExecutor")
            .field("url", &self.connector.options().url)
            .finish()
    }
}

impl ConnectorExecutor {
    /// Wraps `connector`.
    #[must_use]
    pub fn new(connector: Arc<dyn Connector>) -> Self {
        Self { connector }
    }

    /// Converts a built request into the connector's request type.
    ///
    /// # Errors
    ///
    /// Returns [`RequestError::InvalidKey`] for malformed keys and
    /// [`RequestError::InvalidRequest`] for non-object reserved fields.
    pub fn to_api_request(request: &BuiltRequest) -> Result<ApiRequest, RequestError> {
        let (_, method, path) = request.parse_key()?;
        Ok(ApiRequest {
            method,
            path: path.to_string(),
            args: request.object_field(fields::ARGS)?,
            params: request.object_field(fields::PARAMS)?,
            headers: request.object_field(fields::HEADERS)?,
            timeout: request.timeout,
            on_progress: request.on_progress.clone(),
        })
    }
}

#[async_trait]
impl RequestExecutor for ConnectorExecutor {
    async fn execute(&self, request: BuiltRequest) -> Result<Value, RequestError> {
        let api_request = Self::to_api_request(&request)?;
        let send = self.connector.send(api_request);
        match request.timeout {
            Some(limit) => tokio::time::timeout(limit, send)
                .await
                .map_err(|_| RequestError::Timeout(limit))?,
            None => send.await,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// EventExecutor
// ─────────────────────────────────────────────────────────────────────────────

/// Executes built requests by emitting them as transport events.
///
/// This is the client side of the gateway: the key is the event name and the
/// payload travels as is. The timeout covers the whole round trip and
/// completion is reported to the progress callback.
#[derive(Clone)]
pub struct EventExecutor {
    emitter: Arc<dyn EventEmitter>,
}

impl core::fmt::Debug for EventExecutor {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("EventExecutor").finish_non_exhaustive()
    }
}

impl EventExecutor {
    /// Wraps `emitter`.
    #[must_use]
    pub fn new(emitter: Arc<dyn EventEmitter>) -> Self {
        Self { emitter }
    }
}

#[async_trait]
impl RequestExecutor for EventExecutor {
    async fn execute(&self, request: BuiltRequest) -> Result<Value, RequestError> {
        let BuiltRequest {
            key,
            payload,
            timeout,
            on_progress,
        } = request;

        debug!(key = %key, "emitting request");
        let emit = self.emitter.emit(&key, Value::Object(payload));
        let result = match timeout {
            Some(limit) => tokio::time::timeout(limit, emit)
                .await
                .map_err(|_| RequestError::Timeout(limit))?,
            None => emit.await,
        };

        let response = result.map_err(|err| RequestError::Remote(err.to_string()))?;
        if let Some(progress) = on_progress {
            progress(1.0);
        }
        Ok(response)
    }
}
