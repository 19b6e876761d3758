//! Name-to-adapter registry with an explicit default fallback.

use std::collections::HashMap;
use std::sync::{Arc, RwLock, RwLockReadGuard, RwLockWriteGuard};

use tracing::{info, warn};

use super::{ImageProvider, OpenAiProvider, ReplicateProvider};
use crate::config::{AppConfig, DEFAULT_PROVIDER};
use crate::error::{DecalError, ProviderError};

/// Resolves provider names to adapters.
///
/// Unknown names fall back to the default provider with a warning. The
/// active provider can be switched at runtime; the choice is held here, not
/// in any adapter.
pub struct ProviderSelector {
    providers: RwLock<HashMap<String, Arc<dyn ImageProvider>>>,
    default: String,
    active: RwLock<String>,
}

fn read<T>(lock: &RwLock<T>) -> RwLockReadGuard<'_, T> {
    lock.read().unwrap_or_else(|poisoned| {
        warn!("Provider selector lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

fn write<T>(lock: &RwLock<T>) -> RwLockWriteGuard<'_, T> {
    lock.write().unwrap_or_else(|poisoned| {
        warn!("Provider selector lock was poisoned, recovering");
        poisoned.into_inner()
    })
}

impl ProviderSelector {
    /// An empty selector. `default` becomes the initial active provider.
    pub fn new(default: impl Into<String>) -> Self {
        let default = default.into();
        Self {
            providers: RwLock::new(HashMap::new()),
            active: RwLock::new(default.clone()),
            default,
        }
    }

    /// Registers the built-in `openai` and `replicate` adapters and makes the
    /// configured provider the default. An unknown configured name leaves
    /// `openai` as the default.
    pub fn from_config(config: &AppConfig) -> Result<Self, DecalError> {
        let mut selector = Self::new(DEFAULT_PROVIDER);
        selector.register(Arc::new(OpenAiProvider::from_config(&config.openai)?));
        selector.register(Arc::new(ReplicateProvider::from_config(&config.replicate)?));

        if read(&selector.providers).contains_key(&config.provider) {
            selector.default = config.provider.clone();
        } else {
            warn!(
                configured = %config.provider,
                fallback = DEFAULT_PROVIDER,
                "Configured AI provider is unknown, using default"
            );
        }
        *write(&selector.active) = selector.default.clone();
        Ok(selector)
    }

    /// Adds or replaces the adapter under its own name.
    pub fn register(&self, provider: Arc<dyn ImageProvider>) {
        let name = provider.name().to_string();
        write(&self.providers).insert(name, provider);
    }

    pub fn default_name(&self) -> &str {
        &self.default
    }

    /// Registered names, sorted.
    pub fn available(&self) -> Vec<String> {
        let mut names: Vec<String> = read(&self.providers).keys().cloned().collect();
        names.sort();
        names
    }

    /// Whether `name` is registered and has the credentials it needs.
    pub fn is_configured(&self, name: &str) -> bool {
        read(&self.providers)
            .get(name)
            .is_some_and(|provider| provider.is_configured())
    }

    fn resolve_name(&self, name: &str) -> String {
        if read(&self.providers).contains_key(name) {
            name.to_string()
        } else {
            warn!(
                requested = %name,
                fallback = %self.default,
                "Unknown AI provider, falling back to default"
            );
            self.default.clone()
        }
    }

    /// Returns the adapter registered as `name`, or the default one.
    pub fn select(&self, name: &str) -> Result<Arc<dyn ImageProvider>, ProviderError> {
        let providers = read(&self.providers);
        if let Some(provider) = providers.get(name) {
            return Ok(Arc::clone(provider));
        }

        warn!(
            requested = %name,
            fallback = %self.default,
            "Unknown AI provider, falling back to default"
        );
        providers
            .get(&self.default)
            .cloned()
            .ok_or_else(|| ProviderError::NotRegistered {
                requested: name.to_string(),
                default: self.default.clone(),
            })
    }

    pub fn active_name(&self) -> String {
        read(&self.active).clone()
    }

    pub fn active(&self) -> Result<Arc<dyn ImageProvider>, ProviderError> {
        let name = self.active_name();
        self.select(&name)
    }

    /// Switches the active provider. Returns the name that is now active,
    /// which is the default when `name` is not registered.
    pub fn set_active(&self, name: &str) -> String {
        let resolved = self.resolve_name(name);
        info!(provider = %resolved, "Active AI provider changed");
        if !self.is_configured(&resolved) {
            warn!(
                provider = %resolved,
                "Active AI provider has no credentials, generation will fail"
            );
        }
        *write(&self.active) = resolved.clone();
        resolved
    }
}
