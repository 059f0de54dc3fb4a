//! Test helpers para rampart-cache.

#![allow(dead_code, unused_imports)]

pub mod loader;

pub use loader::CountingLoader;

use std::sync::Arc;

use rampart_cache::{CacheManager, CacheSettings, LocalFilter, RemoteFilter};
use rampart_store::MemoryStore;

/// Manager over a fresh in-process store with an in-process filter.
pub fn local_cache(settings: CacheSettings) -> (Arc<MemoryStore>, CacheManager) {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheManager::builder(store.clone())
        .filter(Arc::new(LocalFilter::new(10_000, 0.01).unwrap()))
        .settings(settings)
        .build()
        .unwrap();
    (store, cache)
}

/// Manager over a fresh in-process store using the default shared filter.
pub fn shared_cache(settings: CacheSettings) -> (Arc<MemoryStore>, CacheManager) {
    let store = Arc::new(MemoryStore::new());
    let cache = CacheManager::builder(store.clone())
        .settings(settings)
        .build()
        .unwrap();
    (store, cache)
}

/// A second manager sharing `store`, as another process would.
pub fn peer(store: &Arc<MemoryStore>, settings: CacheSettings) -> CacheManager {
    CacheManager::builder(store.clone())
        .settings(settings)
        .build()
        .unwrap()
}

/// Remote filter bound to the default filter name.
pub fn shared_filter(store: &Arc<MemoryStore>) -> RemoteFilter {
    RemoteFilter::new(store.clone(), &CacheSettings::default().filter.name)
}

/// Installs a fmt subscriber honoring `RUST_LOG`, once per test binary.
pub fn init_tracing() {
    use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

    let _ = tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")))
        .with(tracing_subscriber::fmt::layer().with_test_writer())
        .try_init();
}
