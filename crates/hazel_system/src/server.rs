//! Server runtime for plugin orchestration.
//!
//! The [`Server`] owns the event transport, the shared resources and the
//! plugins. It does nothing on its own: the gateway, logging and any
//! application wiring arrive as plugins.
//!
//! # Lifecycle
//!
//! 1. **Dependency Resolution** - Validate and topologically sort plugins
//! 2. **Build Phase** - Call `plugin.build()` in dependency order
//! 3. **Register Phase** - Await `plugin.register()` in dependency order
//! 4. **Cleanup Phase** - Call `plugin.cleanup()` in reverse order on [`Server::stop`]

use std::sync::Arc;

use hashbrown::{HashMap, HashSet};
use tracing::{debug, info};

use crate::plugin::{Plugin, PluginError, PluginId};
use crate::resource::{Resource, ResourceRef, ResourceRefMut, Resources};
use crate::transport::{EventHandler, Transport, TransportError};

// ─────────────────────────────────────────────────────────────────────────────
// Errors
// ─────────────────────────────────────────────────────────────────────────────

/// Errors raised while starting a server.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// [`Server::start`] was called more than once.
    #[error("server was already started")]
    AlreadyStarted,

    /// A plugin depends on a plugin that was never added.
    #[error("plugin '{plugin}' requires '{dependency}' which was not added")]
    MissingDependency {
        /// The dependent plugin.
        plugin: String,
        /// The missing dependency.
        dependency: &'static str,
    },

    /// Plugins depend on each other in a cycle.
    #[error("circular dependency detected among plugins: {0:?}")]
    CircularDependency(Vec<String>),

    /// A plugin failed to register.
    #[error("plugin '{plugin}' failed to register: {source}")]
    Plugin {
        /// Name of the failing plugin.
        plugin: String,
        /// The plugin's error.
        #[source]
        source: PluginError,
    },
}

impl ServerError {
    /// Returns the failing plugin's error downcast to `E`, if it is one.
    #[must_use]
    pub fn plugin_error<E: core::error::Error + 'static>(&self) -> Option<&E> {
        match self {
            Self::Plugin { source, .. } => source.downcast_ref::<E>(),
            _ => None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Server
// ─────────────────────────────────────────────────────────────────────────────

/// Lifecycle state of the server.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
enum State {
    #[default]
    Idle,
    Building,
    Registering,
    Running,
    Failed,
    Stopped,
}

/// Internal entry for an added plugin.
struct PluginEntry {
    id: PluginId,
    plugin: Box<dyn Plugin>,
    name: String,
}

/// The runtime that orchestrates plugins over an event transport.
///
/// # Example
///
/// ```
/// use hazel_system::server::Server;
/// use hazel_system::transport::{MemoryTransport, Transport};
///
/// # futures::executor::block_on(async {
/// let mut server = Server::new(MemoryTransport::new());
/// server.start().await.unwrap();
/// assert!(server.is_running());
/// assert!(server.transport().event_keys().is_empty());
/// # });
/// ```
pub struct Server {
    transport: Arc<dyn Transport>,
    resources: Resources,
    /// Plugins added but not yet built.
    pending_plugins: Vec<PluginEntry>,
    /// Plugins that have been built, in dependency order.
    built_plugins: Vec<PluginEntry>,
    plugin_ids: HashSet<PluginId>,
    state: State,
}

impl core::fmt::Debug for Server {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        let plugins: Vec<&str> = self
            .built_plugins
            .iter()
            .chain(&self.pending_plugins)
            .map(|entry| entry.name.as_str())
            .collect();
        f.debug_struct("Server")
            .field("state", &self.state)
            .field("plugins", &plugins)
            .field("resources", &self.resources.len())
            .finish_non_exhaustive()
    }
}

impl Server {
    /// Creates a server bound to `transport`.
    #[must_use]
    pub fn new(transport: impl Transport) -> Self {
        Self::with_shared_transport(Arc::new(transport))
    }

    /// Creates a server bound to an already shared transport.
    #[must_use]
    pub fn with_shared_transport(transport: Arc<dyn Transport>) -> Self {
        Self {
            transport,
            resources: Resources::new(),
            pending_plugins: Vec::new(),
            built_plugins: Vec::new(),
            plugin_ids: HashSet::new(),
            state: State::Idle,
        }
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Transport
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns the event transport.
    #[must_use]
    pub fn transport(&self) -> &Arc<dyn Transport> {
        &self.transport
    }

    /// Registers an event handler on the transport.
    ///
    /// # Errors
    ///
    /// Returns [`TransportError::DuplicateEvent`] if the key is taken.
    pub fn register_event(&self, key: &str, handler: EventHandler) -> Result<(), TransportError> {
        self.transport.register_event(key, handler)?;
        debug!(key, "event registered");
        Ok(())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Plugin Management
    // ─────────────────────────────────────────────────────────────────────────

    /// Adds a plugin to the server.
    ///
    /// Plugins added while the server is building are built immediately.
    ///
    /// # Panics
    ///
    /// Panics if a unique plugin is added twice.
    pub fn add_plugins<P: Plugin>(&mut self, plugin: P) -> &mut Self {
        let id = PluginId::of::<P>();
        let name = plugin.name().to_string();

        if plugin.is_unique() && self.plugin_ids.contains(&id) {
            panic!(
                "Plugin '{name}' is unique and was already added.\n\
                 If you intended to add this plugin multiple times, \
                 set `is_unique()` to return `false`."
            );
        }
        self.plugin_ids.insert(id);

        let entry = PluginEntry {
            id,
            plugin: Box::new(plugin),
            name,
        };

        if self.state == State::Building {
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        } else {
            self.pending_plugins.push(entry);
        }
        self
    }

    /// Returns true if a plugin of the given type has been added.
    #[must_use]
    pub fn has_plugin<P: Plugin>(&self) -> bool {
        self.plugin_ids.contains(&PluginId::of::<P>())
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Resource Access
    // ─────────────────────────────────────────────────────────────────────────

    /// Inserts a resource, returning the previous value of the same type.
    pub fn insert_resource<R: Resource>(&mut self, resource: R) -> Option<R> {
        self.resources.insert(resource)
    }

    /// Returns true if a resource of type `R` exists.
    #[must_use]
    pub fn contains_resource<R: Resource>(&self) -> bool {
        self.resources.contains::<R>()
    }

    /// Gets an immutable reference to a resource.
    ///
    /// Returns `None` if the resource doesn't exist or is mutably borrowed.
    #[must_use]
    pub fn get_resource<R: Resource>(&self) -> Option<ResourceRef<'_, R>> {
        self.resources.get::<R>().ok()
    }

    /// Gets a mutable reference to a resource.
    ///
    /// Returns `None` if the resource doesn't exist or is already borrowed.
    #[must_use]
    pub fn get_resource_mut<R: Resource>(&self) -> Option<ResourceRefMut<'_, R>> {
        self.resources.get_mut::<R>().ok()
    }

    /// Removes a resource and returns it.
    pub fn remove_resource<R: Resource>(&mut self) -> Option<R> {
        self.resources.remove::<R>()
    }

    /// Returns the underlying resources container.
    #[must_use]
    pub fn resources(&self) -> &Resources {
        &self.resources
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Lifecycle
    // ─────────────────────────────────────────────────────────────────────────

    /// Returns true once every plugin has registered successfully.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.state == State::Running
    }

    /// Builds and registers every plugin.
    ///
    /// All plugins are built before any registers. Registration is awaited
    /// one plugin at a time in dependency order and stops at the first
    /// failure; the server is then unusable and must be stopped.
    ///
    /// # Errors
    ///
    /// Fails on unsatisfied or circular dependencies, on a second call, and
    /// with [`ServerError::Plugin`] when a plugin's `register()` fails.
    pub async fn start(&mut self) -> Result<(), ServerError> {
        if self.state != State::Idle {
            return Err(ServerError::AlreadyStarted);
        }

        let sorted = self.sort_plugins_by_dependencies()?;

        self.state = State::Building;
        for entry in sorted {
            debug!(plugin = %entry.name, "building plugin");
            entry.plugin.build(self);
            self.built_plugins.push(entry);
        }

        self.state = State::Registering;
        let plugins = core::mem::take(&mut self.built_plugins);
        let mut failure = None;
        for entry in &plugins {
            debug!(plugin = %entry.name, "registering plugin");
            if let Err(source) = entry.plugin.register(self).await {
                failure = Some(ServerError::Plugin {
                    plugin: entry.name.clone(),
                    source,
                });
                break;
            }
        }
        self.built_plugins = plugins;

        if let Some(err) = failure {
            self.state = State::Failed;
            return Err(err);
        }

        self.state = State::Running;
        info!(
            plugins = self.built_plugins.len(),
            events = self.transport.event_keys().len(),
            "server started"
        );
        Ok(())
    }

    /// Cleans up plugins in reverse dependency order and drops all resources.
    pub fn stop(&mut self) {
        if matches!(self.state, State::Idle | State::Stopped) {
            return;
        }

        let plugins = core::mem::take(&mut self.built_plugins);
        for entry in plugins.iter().rev() {
            debug!(plugin = %entry.name, "cleaning up plugin");
            entry.plugin.cleanup(self);
        }
        self.built_plugins = plugins;

        self.resources.clear();
        self.state = State::Stopped;
        info!("server stopped");
    }

    // ─────────────────────────────────────────────────────────────────────────
    // Internal: Dependency Resolution
    // ─────────────────────────────────────────────────────────────────────────

    /// Drains pending plugins in topological order (Kahn's algorithm).
    fn sort_plugins_by_dependencies(&mut self) -> Result<Vec<PluginEntry>, ServerError> {
        let n = self.pending_plugins.len();

        let index_of: HashMap<PluginId, usize> = self
            .pending_plugins
            .iter()
            .enumerate()
            .map(|(i, entry)| (entry.id, i))
            .collect();

        let mut in_degree = vec![0usize; n];
        let mut dependents: Vec<Vec<usize>> = vec![Vec::new(); n];

        for (i, entry) in self.pending_plugins.iter().enumerate() {
            for dependency in entry.plugin.dependencies() {
                let Some(&dep_idx) = index_of.get(&dependency) else {
                    return Err(ServerError::MissingDependency {
                        plugin: entry.name.clone(),
                        dependency: dependency.type_name(),
                    });
                };
                dependents[dep_idx].push(i);
                in_degree[i] += 1;
            }
        }

        // Seed in reverse so that independent plugins keep insertion order.
        let mut queue: Vec<usize> = (0..n).rev().filter(|&i| in_degree[i] == 0).collect();
        let mut order = Vec::with_capacity(n);
        while let Some(idx) = queue.pop() {
            order.push(idx);
            for &dependent in dependents[idx].iter().rev() {
                in_degree[dependent] -= 1;
                if in_degree[dependent] == 0 {
                    queue.push(dependent);
                }
            }
        }

        if order.len() != n {
            let in_cycle = in_degree
                .iter()
                .enumerate()
                .filter(|(_, degree)| **degree > 0)
                .map(|(i, _)| self.pending_plugins[i].name.clone())
                .collect();
            return Err(ServerError::CircularDependency(in_cycle));
        }

        let mut slots: Vec<Option<PluginEntry>> =
            core::mem::take(&mut self.pending_plugins).into_iter().map(Some).collect();
        Ok(order
            .into_iter()
            .filter_map(|idx| slots[idx].take())
            .collect())
    }
}
