use std::sync::Arc;

use stratus_common::auth::AuthConfig;
use stratus_meta::MetaStore;

use crate::metrics::Metrics;
use crate::poll::SummaryCache;

/// Shared handler state. The store is injected as a trait object so the
/// console never reaches for an ambient client; tests hand it a
/// MemoryMetaStore, deployments hand it etcd.
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn MetaStore>,
    pub metrics: Arc<Metrics>,
    pub summary: Arc<SummaryCache>,
    pub auth: AuthConfig,
    pub poll_interval_secs: u64,
}

impl AsRef<AuthConfig> for AppState {
    fn as_ref(&self) -> &AuthConfig {
        &self.auth
    }
}

/// State over an in-process store, for handler tests.
#[cfg(test)]
pub(crate) fn test_state(store: stratus_meta::MemoryMetaStore) -> AppState {
    AppState {
        store: Arc::new(store),
        metrics: Arc::new(Metrics::default()),
        summary: Arc::new(SummaryCache::new()),
        auth: AuthConfig::disabled(),
        poll_interval_secs: 15,
    }
}
