//! Provider registry for dynamic provider resolution.

use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;

use dropmedia_common::{Error, Result};

use crate::memory::MemoryStore;
use crate::provider::MediaProvider;
use crate::remote::{RemoteStoreClient, StaticClientFactory};
use crate::remote_provider::RemoteMediaProvider;

/// Factory function type for creating providers.
pub type ProviderFactory = Box<dyn Fn(Value) -> Result<Arc<dyn MediaProvider>> + Send + Sync>;

/// Registry for media provider factories.
///
/// Allows dynamic registration and resolution of media providers
/// by name and configuration.
pub struct ProviderRegistry {
    factories: HashMap<String, ProviderFactory>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            factories: HashMap::new(),
        }
    }

    /// Register a provider factory.
    ///
    /// # Errors
    /// - Returns error if name is already registered
    pub fn register(&mut self, name: impl Into<String>, factory: ProviderFactory) -> Result<()> {
        let name = name.into();
        if self.factories.contains_key(&name) {
            return Err(Error::InvalidInput(format!(
                "Provider '{}' is already registered",
                name
            )));
        }
        self.factories.insert(name, factory);
        Ok(())
    }

    /// Resolve a provider by name and configuration.
    ///
    /// # Errors
    /// - `NotFound` if no provider is registered under `name`
    /// - `Configuration` if the configuration is invalid for the provider
    pub fn resolve(&self, name: &str, config: Value) -> Result<Arc<dyn MediaProvider>> {
        let factory = self
            .factories
            .get(name)
            .ok_or_else(|| Error::NotFound(format!("Provider '{}' is not registered", name)))?;
        factory(config)
    }

    /// Check if a provider is registered.
    pub fn has_provider(&self, name: &str) -> bool {
        self.factories.contains_key(name)
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// Create a registry with the built-in providers.
pub fn create_default_registry() -> ProviderRegistry {
    let mut registry = ProviderRegistry::new();

    // In-memory store (for testing)
    registry.factories.insert(
        "memory".to_string(),
        Box::new(|_config| {
            let store: Arc<dyn RemoteStoreClient> = Arc::new(MemoryStore::new());
            let provider: Arc<dyn MediaProvider> = Arc::new(RemoteMediaProvider::new(
                "memory",
                Arc::new(StaticClientFactory::new(store)),
            ));
            Ok(provider)
        }),
    );

    registry.factories.insert(
        "dropbox".to_string(),
        Box::new(crate::dropbox::create_dropbox_provider),
    );

    registry
}
