//! Bulk pre-population of the cache.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use rampart_core::keys::namespaced;
use rampart_core::{CachedValue, RampartError, Result};
use serde::Serialize;
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

use super::CacheManager;
use crate::filter::MembershipFilter;

impl CacheManager {
    /// Writes every entry under `namespace:suffix` in one batched round
    /// trip and records the keys in the membership filter.
    ///
    /// All entries share the default TTL. A failed remote write is an
    /// error; the entries stay in the mirror regardless.
    pub async fn warmup<V: Serialize>(
        &self,
        namespace: &str,
        entries: &HashMap<String, V>,
    ) -> Result<usize> {
        if entries.is_empty() {
            return Ok(0);
        }
        let ttl = self.settings().default_ttl;

        let mut keys = Vec::with_capacity(entries.len());
        let mut batch = Vec::with_capacity(entries.len());
        for (suffix, value) in entries {
            let key = namespaced(namespace, suffix);
            let cached = CachedValue::from_value(&key, value)?;
            batch.push((key.clone(), cached.encode().to_vec()));
            self.mirror().insert(&key, cached, ttl);
            keys.push(key);
        }
        self.metrics().update_mirror_entries(self.mirror().len());

        self.store()
            .set_many(&batch, Some(ttl))
            .await
            .map_err(|e| RampartError::warmup(namespace, e.to_string()))?;

        if let Err(e) = self.filter().insert_all(&keys).await {
            self.metrics().record_degraded("filter");
            self.defer_filter_insert(&keys);
            warn!(namespace = %namespace, error = %e, "Membership filter update failed during warm-up");
        }

        info!(namespace = %namespace, count = keys.len(), "Cache warmed up");
        Ok(keys.len())
    }
}

/// A unit of warm-up work, run once at startup.
///
/// # Example
///
/// ```no_run
/// use std::collections::HashMap;
/// use async_trait::async_trait;
/// use rampart_cache::{CacheManager, WarmupTask};
///
/// struct Prices;
///
/// #[async_trait]
/// impl WarmupTask for Prices {
///     fn name(&self) -> &str {
///         "prices"
///     }
///
///     async fn warm_up(&self, cache: &CacheManager) -> rampart_core::Result<usize> {
///         let prices = HashMap::from([("sku:42".to_string(), 1999u64)]);
///         cache.warmup("price", &prices).await
///     }
/// }
/// ```
#[async_trait]
pub trait WarmupTask: Send + Sync {
    fn name(&self) -> &str;

    /// Populates `cache`, returning how many keys were written.
    async fn warm_up(&self, cache: &CacheManager) -> Result<usize>;
}

/// Outcome of [`WarmupRegistry::run_all`].
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct WarmupReport {
    /// Tasks that finished, with their key counts.
    pub succeeded: Vec<(String, usize)>,
    /// Tasks that failed, with their error messages.
    pub failed: Vec<(String, String)>,
}

impl WarmupReport {
    pub fn total_keys(&self) -> usize {
        self.succeeded.iter().map(|(_, count)| count).sum()
    }

    pub fn is_success(&self) -> bool {
        self.failed.is_empty()
    }
}

/// Explicit list of warm-up tasks, built at startup.
#[derive(Clone, Default)]
pub struct WarmupRegistry {
    tasks: Vec<Arc<dyn WarmupTask>>,
}

impl WarmupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, task: Arc<dyn WarmupTask>) -> &mut Self {
        self.tasks.push(task);
        self
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Runs every task in registration order. A failing task is logged
    /// and does not stop the others.
    pub async fn run_all(&self, cache: &CacheManager) -> WarmupReport {
        let mut report = WarmupReport::default();

        for task in &self.tasks {
            match task.warm_up(cache).await {
                Ok(count) => {
                    info!(task = %task.name(), count, "Warm-up task completed");
                    report.succeeded.push((task.name().to_string(), count));
                },
                Err(e) => {
                    error!(task = %task.name(), error = %e, "Warm-up task failed");
                    report.failed.push((task.name().to_string(), e.to_string()));
                },
            }
        }

        report
    }

    /// Runs every task on a background tokio task after `delay`.
    pub fn spawn(&self, cache: CacheManager, delay: Duration) -> JoinHandle<WarmupReport> {
        let registry = self.clone();
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            registry.run_all(&cache).await
        })
    }
}

impl std::fmt::Debug for WarmupRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let names: Vec<&str> = self.tasks.iter().map(|t| t.name()).collect();
        f.debug_struct("WarmupRegistry")
            .field("tasks", &names)
            .finish()
    }
}
