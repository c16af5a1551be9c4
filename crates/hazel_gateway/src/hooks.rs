//! Per-API hooks run around every proxied call.
//!
//! Each hook is optional. Synchronous hooks have blanket impls for plain
//! closures; asynchronous ones are traits implemented with
//! [`async_trait`](async_trait::async_trait).

use std::sync::Arc;

use async_trait::async_trait;
use hazel_connector::{Method, RequestBuilder, RequestError};
use hazel_system::transport::{BroadcastFilter, Socket};
use serde_json::Value;

use crate::dispatcher::EventPayload;

/// Error type returned by fallible hooks.
pub type HookError = Box<dyn core::error::Error + Send + Sync>;

/// What a hook knows about the call in flight.
#[derive(Clone, Copy)]
pub struct CallContext<'a> {
    /// The calling socket.
    pub socket: &'a dyn Socket,
    /// The API name.
    pub api: &'a str,
    /// The endpoint method.
    pub method: Method,
    /// The endpoint path template.
    pub endpoint: &'a str,
    /// The event payload as received.
    pub payload: &'a EventPayload,
}

impl core::fmt::Debug for CallContext<'_> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("CallContext")
            .field("socket", &self.socket.id())
            .field("api", &self.api)
            .field("method", &self.method)
            .field("endpoint", &self.endpoint)
            .finish_non_exhaustive()
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Hook traits
// ─────────────────────────────────────────────────────────────────────────────

/// Attaches credentials to an outgoing request.
///
/// Runs only when the endpoint requires auth, or allows it and the socket
/// is authenticated.
#[async_trait]
pub trait Signer: Send + Sync + 'static {
    /// Signs `builder` on behalf of the caller.
    ///
    /// # Errors
    ///
    /// A failure aborts the call.
    async fn sign(
        &self,
        context: &CallContext<'_>,
        builder: &mut RequestBuilder,
    ) -> Result<(), HookError>;
}

/// Adjusts the request right before it is executed.
pub trait BuilderModifier: Send + Sync + 'static {
    /// Modifies `builder`.
    fn modify(&self, context: &CallContext<'_>, builder: &mut RequestBuilder);
}

impl<F> BuilderModifier for F
where
    F: Fn(&CallContext<'_>, &mut RequestBuilder) + Send + Sync + 'static,
{
    fn modify(&self, context: &CallContext<'_>, builder: &mut RequestBuilder) {
        self(context, builder);
    }
}

/// Rewrites a successful response.
pub trait ResponseTransformer: Send + Sync + 'static {
    /// Returns the value sent back to the caller.
    fn transform(&self, response: Value) -> Value;
}

impl<F> ResponseTransformer for F
where
    F: Fn(Value) -> Value + Send + Sync + 'static,
{
    fn transform(&self, response: Value) -> Value {
        self(response)
    }
}

/// Observes a transformed response before it is returned.
#[async_trait]
pub trait ResponseHandler: Send + Sync + 'static {
    /// Handles `response`.
    ///
    /// # Errors
    ///
    /// A failure aborts the call; the response is not returned.
    async fn handle(&self, context: &CallContext<'_>, response: &Value) -> Result<(), HookError>;
}

/// Chooses which peers receive a broadcast.
#[async_trait]
pub trait BroadcastFilterProvider: Send + Sync + 'static {
    /// Returns a filter for broadcasts from `socket`, or `None` for all peers.
    async fn filter(&self, socket: &dyn Socket) -> Option<BroadcastFilter>;
}

/// Observes failed calls.
pub trait ErrorObserver: Send + Sync + 'static {
    /// Called with the connector error before it is returned.
    fn on_error(&self, context: &CallContext<'_>, error: &RequestError);
}

impl<F> ErrorObserver for F
where
    F: Fn(&CallContext<'_>, &RequestError) + Send + Sync + 'static,
{
    fn on_error(&self, context: &CallContext<'_>, error: &RequestError) {
        self(context, error);
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// HookSet
// ─────────────────────────────────────────────────────────────────────────────

/// The hooks attached to one API.
#[derive(Clone, Default)]
pub struct HookSet {
    pub(crate) signer: Option<Arc<dyn Signer>>,
    pub(crate) modifier: Option<Arc<dyn BuilderModifier>>,
    pub(crate) transformer: Option<Arc<dyn ResponseTransformer>>,
    pub(crate) handler: Option<Arc<dyn ResponseHandler>>,
    pub(crate) broadcast_filter: Option<Arc<dyn BroadcastFilterProvider>>,
    pub(crate) error_observer: Option<Arc<dyn ErrorObserver>>,
}

impl core::fmt::Debug for HookSet {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("HookSet")
            .field("signer", &self.signer.is_some())
            .field("modifier", &self.modifier.is_some())
            .field("transformer", &self.transformer.is_some())
            .field("handler", &self.handler.is_some())
            .field("broadcast_filter", &self.broadcast_filter.is_some())
            .field("error_observer", &self.error_observer.is_some())
            .finish()
    }
}

impl HookSet {
    /// An empty hook set.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the signer.
    #[must_use]
    pub fn with_signer(mut self, signer: impl Signer) -> Self {
        self.signer = Some(Arc::new(signer));
        self
    }

    /// Sets the builder modifier.
    #[must_use]
    pub fn with_modifier(mut self, modifier: impl BuilderModifier) -> Self {
        self.modifier = Some(Arc::new(modifier));
        self
    }

    /// Sets the response transformer.
    #[must_use]
    pub fn with_transformer(mut self, transformer: impl ResponseTransformer) -> Self {
        self.transformer = Some(Arc::new(transformer));
        self
    }

    /// Sets the response handler.
    #[must_use]
    pub fn with_handler(mut self, handler: impl ResponseHandler) -> Self {
        self.handler = Some(Arc::new(handler));
        self
    }

    /// Sets the broadcast filter provider.
    #[must_use]
    pub fn with_broadcast_filter(mut self, provider: impl BroadcastFilterProvider) -> Self {
        self.broadcast_filter = Some(Arc::new(provider));
        self
    }

    /// Sets the error observer.
    #[must_use]
    pub fn with_error_observer(mut self, observer: impl ErrorObserver) -> Self {
        self.error_observer = Some(Arc::new(observer));
        self
    }

    /// Returns true if a signer is set.
    #[must_use]
    pub fn has_signer(&self) -> bool {
        self.signer.is_some()
    }
}
