//! Ordered provider table

use std::collections::HashMap;
use std::sync::Arc;
use stratum_cloud::{ResourceKind, ResourceProvider};

/// Providers registered per resource kind, in priority order.
///
/// Selection binds to the first provider supporting the strategy; afterwards
/// the engine looks providers up by the name stored in the request status.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    providers: HashMap<ResourceKind, Vec<Arc<dyn ResourceProvider>>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a provider for `kind`
    pub fn register(&mut self, kind: ResourceKind, provider: Arc<dyn ResourceProvider>) -> &mut Self {
        tracing::debug!(kind = %kind, provider = provider.name(), "Registered provider");
        self.providers.entry(kind).or_default().push(provider);
        self
    }

    pub fn with(mut self, kind: ResourceKind, provider: Arc<dyn ResourceProvider>) -> Self {
        self.register(kind, provider);
        self
    }

    /// First provider for `kind` that supports `strategy`
    pub fn select(&self, kind: ResourceKind, strategy: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.providers
            .get(&kind)?
            .iter()
            .find(|p| p.supports_strategy(strategy))
            .cloned()
    }

    /// Provider for `kind` registered under `name`
    pub fn get(&self, kind: ResourceKind, name: &str) -> Option<Arc<dyn ResourceProvider>> {
        self.providers
            .get(&kind)?
            .iter()
            .find(|p| p.name() == name)
            .cloned()
    }

    pub fn providers(&self, kind: ResourceKind) -> &[Arc<dyn ResourceProvider>] {
        self.providers.get(&kind).map(Vec::as_slice).unwrap_or(&[])
    }

    pub fn is_empty(&self) -> bool {
        self.providers.values().all(Vec::is_empty)
    }
}
