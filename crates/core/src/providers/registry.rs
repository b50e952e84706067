//! Adapter lookup by provider

use std::collections::HashMap;
use std::sync::Arc;

use hearthsync_domain::{CalendarProvider, HearthSyncError, Result};

use super::ports::CalendarProviderAdapter;

/// Registered adapters, one per provider.
#[derive(Default, Clone)]
pub struct ProviderRegistry {
    adapters: HashMap<CalendarProvider, Arc<dyn CalendarProviderAdapter>>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register an adapter, replacing any previous one for the same provider.
    pub fn register(&mut self, adapter: Arc<dyn CalendarProviderAdapter>) {
        self.adapters.insert(adapter.provider(), adapter);
    }

    pub fn with(mut self, adapter: Arc<dyn CalendarProviderAdapter>) -> Self {
        self.register(adapter);
        self
    }

    pub fn get(&self, provider: CalendarProvider) -> Result<Arc<dyn CalendarProviderAdapter>> {
        self.adapters.get(&provider).cloned().ok_or_else(|| {
            HearthSyncError::Validation(format!("no adapter registered for provider {provider}"))
        })
    }

    pub fn providers(&self) -> impl Iterator<Item = CalendarProvider> + '_ {
        self.adapters.keys().copied()
    }
}

impl std::fmt::Debug for ProviderRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProviderRegistry")
            .field("providers", &self.adapters.keys().collect::<Vec<_>>())
            .finish()
    }
}
