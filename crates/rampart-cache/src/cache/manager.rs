//! Read-through cache with stampede protection.

use std::collections::HashSet;
use std::future::Future;
use std::sync::Arc;
use std::time::{Duration, Instant};

use rampart_core::ttl::{jittered, whole_seconds};
use parking_lot::Mutex;
use rampart_core::{CachedValue, RampartError, Result};
use rampart_store::SharedStore;
use serde::Serialize;
use serde::de::DeserializeOwned;
use tracing::{debug, info, warn};

use super::mirror::{LocalMirror, PruneReport};
use crate::filter::{MembershipFilter, RemoteFilter};
use crate::lock::DistributedLock;
use crate::metrics::{CacheMetrics, HitTier};
use crate::settings::CacheSettings;
use crate::sync::{JobResult, PeriodicScheduler, ScheduleConfig, TaskHandle};

/// Result of a lookup across the store and the mirror.
enum Lookup<V> {
    /// Found; `None` is a cached null marker.
    Hit(Option<V>),
    Miss,
}

/// Read-through cache in front of a shared store.
///
/// Lookups go filter, store, mirror, then a lock-guarded loader. Remote
/// failures are logged and absorbed by the local mirror; callers only
/// ever see a value, absent, or their own loader's error.
///
/// Construct one per process and share it; clones share all state.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use rampart_cache::CacheManager;
/// # use rampart_store::MemoryStore;
/// # #[tokio::main]
/// # async fn main() -> rampart_core::Result<()> {
/// let cache = CacheManager::builder(Arc::new(MemoryStore::new())).build()?;
///
/// let price: Option<u64> = cache
///     .get_or_load("price:sku:42", || async { Ok::<_, std::io::Error>(Some(1999)) })
///     .await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct CacheManager {
    store: SharedStore,
    filter: Arc<dyn MembershipFilter>,
    lock: DistributedLock,
    mirror: Arc<LocalMirror>,
    /// Keys whose filter insert failed; admitted until a retry lands.
    filter_backlog: Arc<Mutex<HashSet<String>>>,
    settings: Arc<CacheSettings>,
    metrics: CacheMetrics,
}

/// Builder for [`CacheManager`].
pub struct CacheManagerBuilder {
    store: SharedStore,
    filter: Option<Arc<dyn MembershipFilter>>,
    settings: CacheSettings,
    metrics: Option<CacheMetrics>,
}

impl CacheManagerBuilder {
    /// Uses `filter` instead of the shared remote filter.
    pub fn filter(mut self, filter: Arc<dyn MembershipFilter>) -> Self {
        self.filter = Some(filter);
        self
    }

    pub fn settings(mut self, settings: CacheSettings) -> Self {
        self.settings = settings;
        self
    }

    /// Shares an existing metrics recorder.
    pub fn metrics(mut self, metrics: CacheMetrics) -> Self {
        self.metrics = Some(metrics);
        self
    }

    /// Validates the settings and builds the manager.
    ///
    /// Without an explicit filter, a [`RemoteFilter`] named and sized from
    /// the settings is used, so every instance shares one filter.
    pub fn build(self) -> Result<CacheManager> {
        self.settings.validate()?;

        let filter = match self.filter {
            Some(filter) => filter,
            None => Arc::new(
                RemoteFilter::new(Arc::clone(&self.store), &self.settings.filter.name)
                    .with_params(self.settings.filter.params()?)
                    .with_ttl(self.settings.filter.ttl),
            ),
        };

        info!(
            store = %self.store.name(),
            filter = %filter.name(),
            default_ttl = ?self.settings.default_ttl,
            "Cache manager initialized"
        );

        Ok(CacheManager {
            lock: DistributedLock::new(Arc::clone(&self.store)),
            mirror: Arc::new(LocalMirror::new(&self.settings.mirror)),
            filter_backlog: Arc::default(),
            store: self.store,
            filter,
            settings: Arc::new(self.settings),
            metrics: self.metrics.unwrap_or_default(),
        })
    }
}

impl CacheManager {
    /// Starts building a manager over `store`.
    pub fn builder(store: SharedStore) -> CacheManagerBuilder {
        CacheManagerBuilder {
            store,
            filter: None,
            settings: CacheSettings::default(),
            metrics: None,
        }
    }

    /// Reads `key` without loading on a miss.
    ///
    /// The membership filter is not consulted: a plain read never costs a
    /// load, so there is nothing to short-circuit.
    pub async fn get<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let start = Instant::now();
        let result = match self.lookup(key).await {
            Lookup::Hit(value) => value,
            Lookup::Miss => {
                self.metrics.record_miss();
                None
            },
        };
        self.metrics.finish_operation("get", start);
        result
    }

    /// Reads `key`, loading it with `loader` on a miss, using the
    /// default TTL.
    pub async fn get_or_load<V, F, Fut, E>(&self, key: &str, loader: F) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.get_or_load_with_ttl(key, self.settings.default_ttl, loader)
            .await
    }

    /// Reads `key`, loading it with `loader` on a miss.
    ///
    /// 1. A key the filter has never seen returns absent at once.
    /// 2. Store, then mirror.
    /// 3. One caller takes the load lock, checks the store again and runs
    ///    the loader. A value is stored for `ttl` plus jitter and added to
    ///    the filter; absent is stored as the null marker for the null TTL.
    /// 4. Callers that lose the lock poll for the winner's result as
    ///    configured by [`LockRetry`](crate::settings::LockRetry), then
    ///    return absent.
    ///
    /// Keys whose filter insert failed (store outage) keep bypassing the
    /// filter until the insert is retried successfully.
    ///
    /// If the lock cannot be reached at all the loader runs unprotected.
    /// Loader errors are returned after the lock is released.
    pub async fn get_or_load_with_ttl<V, F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<V>>
    where
        V: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let start = Instant::now();

        if !self.filter.may_contain(key).await && !self.in_filter_backlog(key) {
            self.metrics.record_filter_rejection();
            debug!(key = %key, "Rejected by membership filter");
            self.metrics.finish_operation("get_or_load_rejected", start);
            return Ok(None);
        }

        if let Lookup::Hit(value) = self.lookup(key).await {
            self.metrics.finish_operation("get_or_load_hit", start);
            return Ok(value);
        }
        self.metrics.record_miss();

        let lock_key = self.settings.lock_key(key);
        let result = match self.lock.acquire_guard(&lock_key, self.settings.lock_ttl).await {
            Ok(Some(guard)) => {
                // Another caller may have filled the key while we contended
                let result = match self.lookup_remote(key).await {
                    Some(value) => Ok(value),
                    None => self.load_and_store(key, ttl, loader).await,
                };
                guard.release().await;
                result
            },
            Ok(None) => {
                self.metrics.record_lock_contention();
                debug!(key = %key, "Load lock held elsewhere");
                Ok(self.await_winner(key).await)
            },
            Err(e) => {
                self.metrics.record_degraded("lock");
                warn!(key = %key, error = %e, "Load lock unavailable, loading without it");
                self.load_and_store(key, ttl, loader).await
            },
        };

        self.metrics.finish_operation("get_or_load_miss", start);
        result
    }

    /// Writes `value` with the default TTL.
    pub async fn set<V: Serialize + ?Sized>(&self, key: &str, value: &V) -> Result<()> {
        self.set_with_ttl(key, value, self.settings.default_ttl)
            .await
    }

    /// Writes `value` to the store and the mirror, and records `key` in
    /// the filter.
    ///
    /// Only a serialization failure is an error. A failed remote write is
    /// logged and the mirror still takes the value.
    pub async fn set_with_ttl<V: Serialize + ?Sized>(
        &self,
        key: &str,
        value: &V,
        ttl: Duration,
    ) -> Result<()> {
        let start = Instant::now();
        let cached = CachedValue::from_value(key, value)?;
        self.write(key, cached, ttl).await;
        self.remember(key).await;
        self.metrics.finish_operation("set", start);
        Ok(())
    }

    /// Removes `keys` from the store and the mirror.
    ///
    /// Returns how many keys the store removed; zero when it could not be
    /// reached. The mirror is always cleared.
    pub async fn delete<K: AsRef<str>>(&self, keys: &[K]) -> u64 {
        if keys.is_empty() {
            return 0;
        }
        let keys: Vec<String> = keys.iter().map(|k| k.as_ref().to_string()).collect();
        for key in &keys {
            self.mirror.remove(key);
        }
        self.metrics.update_mirror_entries(self.mirror.len());

        match self.store.delete(&keys).await {
            Ok(removed) => {
                debug!(count = keys.len(), removed, "Cache keys deleted");
                removed
            },
            Err(e) => {
                self.metrics.record_degraded("delete");
                warn!(count = keys.len(), error = %e, "Remote delete failed, mirror cleared only");
                0
            },
        }
    }

    /// Sets a new TTL on `key`. False if the key is absent or the store
    /// failed.
    pub async fn expire(&self, key: &str, ttl: Duration) -> bool {
        match self.store.expire(key, ttl).await {
            Ok(applied) => applied,
            Err(e) => {
                self.metrics.record_degraded("expire");
                warn!(key = %key, error = %e, "Remote expire failed");
                false
            },
        }
    }

    /// Remaining TTL of `key` in seconds, as the store reports it.
    ///
    /// `-1` when the store failed (or the key has no expiry), `-2` when
    /// the key is missing.
    pub async fn get_expire(&self, key: &str) -> i64 {
        match self.store.ttl(key).await {
            Ok(ttl) => ttl,
            Err(e) => {
                self.metrics.record_degraded("get_expire");
                warn!(key = %key, error = %e, "Remote ttl lookup failed");
                -1
            },
        }
    }

    /// Records existing keys in the membership filter.
    ///
    /// Use at startup so keys that exist in the backing source but were
    /// never loaded through this cache are not short-circuited.
    pub async fn backfill(&self, keys: &[String]) -> Result<usize> {
        self.filter
            .insert_all(keys)
            .await
            .map_err(|e| RampartError::warmup(self.filter.name(), e.to_string()))?;
        info!(filter = %self.filter.name(), count = keys.len(), "Filter backfilled");
        Ok(keys.len())
    }

    /// Runs one prune pass over the mirror.
    pub fn prune_mirror(&self) -> PruneReport {
        let report = self.mirror.prune();
        self.metrics.record_evictions("ttl", report.expired);
        self.metrics.record_evictions("capacity", report.evicted);
        self.metrics.update_mirror_entries(report.remaining);
        if report.expired + report.evicted > 0 {
            info!(
                expired = report.expired,
                evicted = report.evicted,
                remaining = report.remaining,
                "Local mirror pruned"
            );
        }
        report
    }

    /// Retries filter inserts that failed earlier. Returns how many keys
    /// were recorded; on failure the backlog is kept for the next try.
    pub async fn flush_filter_backlog(&self) -> usize {
        let keys: Vec<String> = self.filter_backlog.lock().iter().cloned().collect();
        if keys.is_empty() {
            return 0;
        }
        match self.filter.insert_all(&keys).await {
            Ok(()) => {
                {
                    let mut backlog = self.filter_backlog.lock();
                    for key in &keys {
                        backlog.remove(key);
                    }
                }
                info!(filter = %self.filter.name(), count = keys.len(), "Filter backlog flushed");
                keys.len()
            },
            Err(e) => {
                debug!(count = keys.len(), error = %e, "Filter backlog still pending");
                0
            },
        }
    }

    /// Number of keys waiting for a filter insert retry.
    pub fn filter_backlog_len(&self) -> usize {
        self.filter_backlog.lock().len()
    }

    /// Starts pruning the mirror and retrying the filter backlog every
    /// `mirror.cleanup_interval`.
    ///
    /// Both stop when the returned handle is dropped.
    pub fn start_maintenance(&self) -> TaskHandle {
        let manager = self.clone();
        PeriodicScheduler::spawn(
            "mirror-prune",
            ScheduleConfig::every(self.settings.mirror.cleanup_interval),
            move || {
                let manager = manager.clone();
                async move {
                    manager.prune_mirror();
                    manager.flush_filter_backlog().await;
                    JobResult::Ok(())
                }
            },
        )
    }

    pub fn metrics(&self) -> &CacheMetrics {
        &self.metrics
    }

    pub fn settings(&self) -> &CacheSettings {
        &self.settings
    }

    /// The distributed lock used for loads, for callers that need their
    /// own critical sections.
    pub fn lock(&self) -> &DistributedLock {
        &self.lock
    }

    pub fn filter(&self) -> &Arc<dyn MembershipFilter> {
        &self.filter
    }

    pub(crate) fn store(&self) -> &SharedStore {
        &self.store
    }

    pub(crate) fn mirror(&self) -> &LocalMirror {
        &self.mirror
    }

    /// Number of entries in the local mirror.
    pub fn mirror_len(&self) -> usize {
        self.mirror.len()
    }

    async fn lookup<V: DeserializeOwned>(&self, key: &str) -> Lookup<V> {
        if let Some(value) = self.lookup_remote(key).await {
            return Lookup::Hit(value);
        }

        if let Some(cached) = self.mirror.get(key) {
            if let Some(value) = self.decode(key, &cached) {
                self.metrics.record_hit(HitTier::Mirror);
                debug!(key = %key, "Local mirror hit");
                return Lookup::Hit(value);
            }
        }

        Lookup::Miss
    }

    /// Store lookup. `None` on miss, undecodable data or store failure.
    async fn lookup_remote<V: DeserializeOwned>(&self, key: &str) -> Option<Option<V>> {
        match self.store.get(key).await {
            Ok(Some(bytes)) => {
                let value = self.decode(key, &CachedValue::decode(bytes))?;
                self.metrics.record_hit(HitTier::Remote);
                debug!(key = %key, null = value.is_none(), "Remote hit");
                Some(value)
            },
            Ok(None) => None,
            Err(e) => {
                self.metrics.record_degraded("get");
                warn!(key = %key, error = %e, "Remote get failed, falling back to local mirror");
                None
            },
        }
    }

    fn decode<V: DeserializeOwned>(&self, key: &str, cached: &CachedValue) -> Option<Option<V>> {
        match cached.to_value(key) {
            Ok(value) => Some(value),
            Err(e) => {
                warn!(key = %key, error = %e, "Cached value could not be decoded, treating as miss");
                None
            },
        }
    }

    async fn load_and_store<V, F, Fut, E>(
        &self,
        key: &str,
        ttl: Duration,
        loader: F,
    ) -> Result<Option<V>>
    where
        V: Serialize,
        F: FnOnce() -> Fut,
        Fut: Future<Output = std::result::Result<Option<V>, E>>,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let loaded = match self.settings.loader_timeout {
            Some(limit) => match tokio::time::timeout(limit, loader()).await {
                Ok(loaded) => loaded,
                Err(_) => {
                    self.metrics.record_load("timeout");
                    warn!(key = %key, timeout = ?limit, "Loader timed out");
                    return Err(RampartError::loader_timeout(key, whole_seconds(limit)));
                },
            },
            None => loader().await,
        };

        match loaded {
            Ok(Some(value)) => {
                self.metrics.record_load("value");
                match CachedValue::from_value(key, &value) {
                    Ok(cached) => {
                        let ttl = jittered(ttl, self.settings.jitter_ratio);
                        self.write(key, cached, ttl).await;
                        self.remember(key).await;
                        debug!(key = %key, ttl = ?ttl, "Loaded value cached");
                    },
                    Err(e) => {
                        warn!(key = %key, error = %e, "Loaded value not cacheable, returning uncached");
                    },
                }
                Ok(Some(value))
            },
            Ok(None) => {
                self.metrics.record_load("absent");
                self.metrics.record_null_cached();
                self.write(key, CachedValue::Null, self.settings.null_ttl)
                    .await;
                debug!(key = %key, "Loader found nothing, null marker cached");
                Ok(None)
            },
            Err(e) => {
                self.metrics.record_load("error");
                let error = RampartError::loader(key, e);
                warn!(key = %key, error = %error, "Loader failed");
                Err(error)
            },
        }
    }

    /// Polls for the value a lock holder is producing.
    async fn await_winner<V: DeserializeOwned>(&self, key: &str) -> Option<V> {
        let retry = self.settings.lock_retry;
        for attempt in 1..=retry.attempts {
            tokio::time::sleep(retry.interval).await;
            if let Lookup::Hit(value) = self.lookup(key).await {
                debug!(key = %key, attempt, "Value produced by lock holder");
                return value;
            }
        }
        debug!(key = %key, attempts = retry.attempts, "Lock holder produced nothing in time");
        None
    }

    /// Mirror first, then the store; the mirror keeps the value even if
    /// the store write fails.
    pub(crate) async fn write(&self, key: &str, cached: CachedValue, ttl: Duration) {
        let bytes = cached.encode().to_vec();
        self.mirror.insert(key, cached, ttl);
        self.metrics.update_mirror_entries(self.mirror.len());

        if let Err(e) = self.store.set(key, &bytes, Some(ttl)).await {
            self.metrics.record_degraded("set");
            warn!(key = %key, error = %e, "Remote set failed, value kept in local mirror");
        }
    }

    /// Queues keys whose filter insert failed.
    pub(crate) fn defer_filter_insert(&self, keys: &[String]) {
        self.filter_backlog.lock().extend(keys.iter().cloned());
    }

    fn in_filter_backlog(&self, key: &str) -> bool {
        self.filter_backlog.lock().contains(key)
    }

    /// Records `key` in the filter, or queues it for a retry.
    async fn remember(&self, key: &str) {
        match self.filter.insert(key).await {
            Ok(()) => {
                if self.filter_backlog_len() > 0 {
                    self.flush_filter_backlog().await;
                }
            },
            Err(e) => {
                self.metrics.record_degraded("filter");
                self.defer_filter_insert(&[key.to_string()]);
                warn!(key = %key, error = %e, "Membership filter update failed, queued for retry");
            },
        }
    }
}

impl std::fmt::Debug for CacheManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CacheManager")
            .field("store", &self.store.name())
            .field("filter", &self.filter.name())
            .field("mirror_entries", &self.mirror.len())
            .field("filter_backlog", &self.filter_backlog.lock().len())
            .finish()
    }
}
