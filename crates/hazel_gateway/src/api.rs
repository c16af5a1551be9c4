use hazel_connector::ConnectionOptions;

use crate::config::ApiConfig;
use crate::hooks::HookSet;

/// A remote API the gateway exposes.
#[derive(Debug, Clone)]
pub struct ApiDescriptor {
    /// Event key prefix.
    pub name: String,
    /// Options its connector is created with.
    pub connection: ConnectionOptions,
    /// Hooks run around each call.
    pub hooks: HookSet,
}

impl ApiDescriptor {
    /// Creates a descriptor without hooks.
    #[must_use]
    pub fn new(name: impl Into<String>, connection: ConnectionOptions) -> Self {
        Self {
            name: name.into(),
            connection,
            hooks: HookSet::default(),
        }
    }

    /// Replaces the hooks.
    #[must_use]
    pub fn with_hooks(mut self, hooks: HookSet) -> Self {
        self.hooks = hooks;
        self
    }
}

impl From<ApiConfig> for ApiDescriptor {
    fn from(config: ApiConfig) -> Self {
        Self::new(config.name, config.connection)
    }
}
