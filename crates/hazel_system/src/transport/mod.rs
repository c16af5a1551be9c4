//! The event transport interface.
//!
//! A transport is a persistent, bidirectional channel over which peers
//! exchange named events. The server side registers one [`EventHandler`] per
//! event key; each incoming event invokes the handler with the calling
//! [`Socket`] and the JSON payload, and the handler's result is returned to the
//! caller.
//!
//! The gateway only depends on the traits in this module. [`MemoryTransport`]
//! is an in-process implementation used for embedding and testing.

mod memory;

pub use memory::{InboundMessage, MemoryClient, MemorySocket, MemoryTransport};

use core::future::Future;
use std::sync::Arc;

use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Boxed error crossing the transport boundary.
pub type BoxError = Box<dyn core::error::Error + Send + Sync>;

/// Future returned by an [`EventHandler`].
pub type EventFuture = BoxFuture<'static, Result<Value, BoxError>>;

/// Server-side handler for one event key.
pub type EventHandler = Arc<dyn Fn(Arc<dyn Socket>, Value) -> EventFuture + Send + Sync>;

/// Predicate deciding which peers receive a broadcast.
pub type BroadcastFilter = Arc<dyn Fn(&dyn Socket) -> bool + Send + Sync>;

/// Wraps an async function into an [`EventHandler`].
///
/// ```
/// use hazel_system::transport::event_handler;
/// use serde_json::json;
///
/// let handler = event_handler(|_socket, payload| async move {
///     Ok(json!({ "echo": payload }))
/// });
/// ```
pub fn event_handler<F, Fut>(handler: F) -> EventHandler
where
    F: Fn(Arc<dyn Socket>, Value) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<Value, BoxError>> + Send + 'static,
{
    Arc::new(move |socket, payload| Box::pin(handler(socket, payload)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Identity
// ─────────────────────────────────────────────────────────────────────────────

/// The authenticated identity attached to a session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Identity {
    /// Stable identifier of the authenticated user.
    pub id: String,
    /// Arbitrary claims (tokens, roles, tenant ...).
    #[serde(default)]
    pub claims: Map<String, Value>,
}

impl Identity {
    /// Creates an identity without claims.
    #[must_use]
    pub fn new(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            claims: Map::new(),
        }
    }

    /// Adds a claim.
    #[must_use]
    pub fn with_claim(mut self, name: impl Into<String>, value: impl Into<Value>) -> Self {
        self.claims.insert(name.into(), value.into());
        self
    }

    /// Returns a claim by name.
    #[must_use]
    pub fn claim(&self, name: &str) -> Option<&Value> {
        self.claims.get(name)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Traits
// ─────────────────────────────────────────────────────────────────────────────

/// A connected peer, as seen by a server-side handler.
pub trait Socket: Send + Sync + 'static {
    /// Unique connection identifier.
    fn id(&self) -> &str;

    /// The authenticated identity of the session, if any.
    fn identity(&self) -> Option<Identity>;

    /// Returns true if the session carries an identity.
    fn is_authenticated(&self) -> bool {
        self.identity().is_some()
    }

    /// Publishes `payload` under `key` to connected peers.
    ///
    /// The caller itself is skipped unless `include_self` is set. When a
    /// filter is given, only peers it accepts receive the message.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::Closed`] if the transport is gone.
    fn broadcast(
        &self,
        key: &str,
        payload: Value,
        include_self: bool,
        filter: Option<&BroadcastFilter>,
    ) -> Result<usize, TransportError>;
}

/// Server-side event registration.
pub trait Transport: Send + Sync + 'static {
    /// Registers the handler for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DuplicateEvent`] if `key` is taken. An
    /// existing handler is never replaced.
    fn register_event(&self, key: &str, handler: EventHandler) -> Result<(), TransportError>;

    /// Removes the handler for `key`. Returns false if none was registered.
    fn unregister_event(&self, key: &str) -> bool;

    /// Returns true if a handler is registered for `key`.
    fn has_event(&self, key: &str) -> bool;

    /// Lists registered event keys, sorted.
    fn event_keys(&self) -> Vec<String>;
}

/// Client-side event emission: send one event and await its response.
#[async_trait]
pub trait EventEmitter: Send + Sync + 'static {
    /// Emits `key` with `payload` and resolves to the handler's response.
    ///
    /// # Errors
    ///
    /// See [`EmitError`].
    async fn emit(&self, key: &str, payload: Value) -> Result<Value, EmitError>;
}

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised by transport registration and broadcast.
#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    /// An event with this key already has a handler.
    #[error("event '{0}' is already registered")]
    DuplicateEvent(String),

    /// The transport was dropped.
    #[error("transport is closed")]
    Closed,
}

/// Errors raised while emitting an event.
#[derive(Debug, thiserror::Error)]
pub enum EmitError {
    /// No handler is registered for the key.
    #[error("no handler registered for event '{0}'")]
    UnknownEvent(String),

    /// The emitting socket is no longer connected.
    #[error("socket '{0}' is not connected")]
    Disconnected(String),

    /// The handler ran and failed.
    #[error("handler for '{key}' failed: {source}")]
    Handler {
        /// The event key.
        key: String,
        /// The handler's error.
        #[source]
        source: BoxError,
    },
}

impl EmitError {
    /// Returns the handler's error downcast to `E`, if it is one.
    #[must_use]
    pub fn handler_error<E: core::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Handler { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}
