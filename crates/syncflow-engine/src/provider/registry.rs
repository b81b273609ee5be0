//! Provider registry and lookup.

use std::collections::HashMap;
use std::sync::Arc;

use crate::error::{EngineError, EngineResult};

use super::{
    AirtableProvider, NotionProvider, ProviderAdapter, ProviderClient, SlackProvider,
    StripeProvider,
};

/// Registry of provider adapters keyed by provider id.
///
/// Populated once at startup, then shared read-only behind an `Arc`.
pub struct ProviderRegistry {
    providers: HashMap<String, Arc<dyn ProviderAdapter>>,
}

impl ProviderRegistry {
    /// Create a new empty registry.
    pub fn new() -> Self {
        Self {
            providers: HashMap::new(),
        }
    }

    /// Create a registry with the Airtable, Slack, Notion and Stripe adapters.
    pub fn with_builtin_providers(client: ProviderClient) -> Self {
        let mut registry = Self::new();
        registry.register(AirtableProvider::new(client.clone()));
        registry.register(SlackProvider::new(client.clone()));
        registry.register(NotionProvider::new(client.clone()));
        registry.register(StripeProvider::new(client));
        registry
    }

    /// Register an adapter. A later registration for the same id replaces the earlier one.
    pub fn register<P: ProviderAdapter + 'static>(&mut self, provider: P) {
        self.register_arc(Arc::new(provider));
    }

    /// Register a shared adapter.
    pub fn register_arc(&mut self, provider: Arc<dyn ProviderAdapter>) {
        let id = provider.id().to_string();
        if self.providers.insert(id.clone(), provider).is_some() {
            tracing::debug!(provider = %id, "Replaced provider adapter");
        }
    }

    /// Look up an adapter by provider id.
    pub fn resolve(&self, id: &str) -> EngineResult<Arc<dyn ProviderAdapter>> {
        self.providers
            .get(id)
            .cloned()
            .ok_or_else(|| EngineError::ProviderNotSupported(id.to_string()))
    }

    /// Check if a provider is registered.
    pub fn has(&self, id: &str) -> bool {
        self.providers.contains_key(id)
    }

    /// List registered provider ids, sorted.
    pub fn list(&self) -> Vec<&str> {
        let mut ids: Vec<&str> = self.providers.keys().map(|s| s.as_str()).collect();
        ids.sort_unstable();
        ids
    }
}

impl Default for ProviderRegistry {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.list())
            .finish()
    }
}
