//! In-process [`Transport`] implementation.
//!
//! Peers are plain values connected to a shared hub. Emitting an event runs
//! the registered handler on the caller's task; broadcasts are appended to
//! each receiving peer's inbox.

use std::sync::{Arc, Weak};

use async_trait::async_trait;
use hashbrown::HashMap;
use hashbrown::hash_map::Entry;
use parking_lot::{Mutex, RwLock};
use serde_json::Value;
use tracing::debug;

use super::{
    BroadcastFilter, EmitError, EventEmitter, EventHandler, Identity, Socket, Transport,
    TransportError,
};

#[derive(Default)]
struct Hub {
    handlers: RwLock<HashMap<String, EventHandler>>,
    peers: RwLock<HashMap<String, Arc<MemorySocket>>>,
}

/// An in-process event transport.
///
/// Cloning is cheap; clones share the same hub.
///
/// # Example
///
/// ```
/// use hazel_system::transport::{event_handler, MemoryTransport, Transport};
/// use serde_json::json;
///
/// # futures::executor::block_on(async {
/// let transport = MemoryTransport::new();
/// transport
///     .register_event("echo", event_handler(|_socket, payload| async move { Ok(payload) }))
///     .unwrap();
///
/// let socket = transport.connect();
/// let response = transport.emit(&socket, "echo", json!({ "a": 1 })).await.unwrap();
/// assert_eq!(response, json!({ "a": 1 }));
/// # });
/// ```
#[derive(Clone, Default)]
pub struct MemoryTransport {
    hub: Arc<Hub>,
}

impl core::fmt::Debug for MemoryTransport {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemoryTransport")
            .field("events", &self.event_keys())
            .field("peers", &self.peer_count())
            .finish()
    }
}

impl MemoryTransport {
    /// Creates a transport with no handlers and no peers.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Connects a new anonymous peer.
    #[must_use]
    pub fn connect(&self) -> Arc<MemorySocket> {
        let socket = Arc::new(MemorySocket {
            id: nanoid::nanoid!(),
            identity: RwLock::new(None),
            inbox: Mutex::new(Vec::new()),
            hub: Arc::downgrade(&self.hub),
        });
        self.hub
            .peers
            .write()
            .insert(socket.id.clone(), Arc::clone(&socket));
        debug!(socket_id = %socket.id, "peer connected");
        socket
    }

    /// Connects a new peer and wraps it in an [`EventEmitter`].
    #[must_use]
    pub fn client(&self) -> MemoryClient {
        MemoryClient {
            transport: self.clone(),
            socket: self.connect(),
        }
    }

    /// Disconnects a peer. Returns false if it was not connected.
    pub fn disconnect(&self, socket_id: &str) -> bool {
        let removed = self.hub.peers.write().remove(socket_id).is_some();
        if removed {
            debug!(socket_id, "peer disconnected");
        }
        removed
    }

    /// Returns the number of connected peers.
    #[must_use]
    pub fn peer_count(&self) -> usize {
        self.hub.peers.read().len()
    }

    /// Emits `key` from `socket` and awaits the handler's response.
    ///
    /// # Errors
    ///
    /// Fails if the socket is disconnected, the key has no handler, or the
    /// handler returns an error.
    pub async fn emit(
        &self,
        socket: &Arc<MemorySocket>,
        key: &str,
        payload: Value,
    ) -> Result<Value, EmitError> {
        if !self.hub.peers.read().contains_key(socket.id()) {
            return Err(EmitError::Disconnected(socket.id().to_string()));
        }

        let handler = self
            .hub
            .handlers
            .read()
            .get(key)
            .cloned()
            .ok_or_else(|| EmitError::UnknownEvent(key.to_string()))?;

        let caller: Arc<dyn Socket> = Arc::clone(socket) as Arc<dyn Socket>;
        handler(caller, payload)
            .await
            .map_err(|source| EmitError::Handler {
                key: key.to_string(),
                source,
            })
    }
}

impl Transport for MemoryTransport {
    fn register_event(&self, key: &str, handler: EventHandler) -> Result<(), TransportError> {
        match self.hub.handlers.write().entry(key.to_string()) {
            Entry::Occupied(_) => Err(TransportError::DuplicateEvent(key.to_string())),
            Entry::Vacant(slot) => {
                slot.insert(handler);
                Ok(())
            }
        }
    }

    fn unregister_event(&self, key: &str) -> bool {
        self.hub.handlers.write().remove(key).is_some()
    }

    fn has_event(&self, key: &str) -> bool {
        self.hub.handlers.read().contains_key(key)
    }

    fn event_keys(&self) -> Vec<String> {
        let mut keys: Vec<String> = self.hub.handlers.read().keys().cloned().collect();
        keys.sort();
        keys
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemorySocket
// ─────────────────────────────────────────────────────────────────────────────

/// A message delivered to a peer by a broadcast.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    /// Event key the message was published under.
    pub key: String,
    /// Message payload.
    pub payload: Value,
    /// Id of the publishing socket.
    pub from: String,
}

/// A peer connected to a [`MemoryTransport`].
pub struct MemorySocket {
    id: String,
    identity: RwLock<Option<Identity>>,
    inbox: Mutex<Vec<InboundMessage>>,
    hub: Weak<Hub>,
}

impl core::fmt::Debug for MemorySocket {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("MemorySocket")
            .field("id", &self.id)
            .field("identity", &*self.identity.read())
            .finish_non_exhaustive()
    }
}

impl MemorySocket {
    /// Attaches an authenticated identity to the session.
    pub fn login(&self, identity: Identity) {
        *self.identity.write() = Some(identity);
    }

    /// Clears the session identity.
    pub fn logout(&self) {
        *self.identity.write() = None;
    }

    /// Drains and returns the messages received so far.
    #[must_use]
    pub fn take_messages(&self) -> Vec<InboundMessage> {
        core::mem::take(&mut *self.inbox.lock())
    }

    fn deliver(&self, message: InboundMessage) {
        self.inbox.lock().push(message);
    }
}

impl Socket for MemorySocket {
    fn id(&self) -> &str {
        &self.id
    }

    fn identity(&self) -> Option<Identity> {
        self.identity.read().clone()
    }

    fn broadcast(
        &self,
        key: &str,
        payload: Value,
        include_self: bool,
        filter: Option<&BroadcastFilter>,
    ) -> Result<usize, TransportError> {
        let hub = self.hub.upgrade().ok_or(TransportError::Closed)?;
        let peers: Vec<Arc<MemorySocket>> = hub.peers.read().values().cloned().collect();

        let mut delivered = 0;
        for peer in peers {
            if !include_self && peer.id == self.id {
                continue;
            }
            let candidate: &dyn Socket = peer.as_ref();
            if filter.is_some_and(|accept| !accept(candidate)) {
                continue;
            }
            peer.deliver(InboundMessage {
                key: key.to_string(),
                payload: payload.clone(),
                from: self.id.clone(),
            });
            delivered += 1;
        }

        debug!(key, from = %self.id, delivered, "broadcast delivered");
        Ok(delivered)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// MemoryClient
// ─────────────────────────────────────────────────────────────────────────────

/// A connected peer bundled with its transport, usable as an [`EventEmitter`].
#[derive(Debug, Clone)]
pub struct MemoryClient {
    transport: MemoryTransport,
    socket: Arc<MemorySocket>,
}

impl MemoryClient {
    /// The client's socket.
    #[must_use]
    pub fn socket(&self) -> &Arc<MemorySocket> {
        &self.socket
    }
}

#[async_trait]
impl EventEmitter for MemoryClient {
    async fn emit(&self, key: &str, payload: Value) -> Result<Value, EmitError> {
        self.transport.emit(&self.socket, key, payload).await
    }
}
