//! Cache metrics recording.
//!
//! Events go to the `metrics` facade (no-op until the host installs a
//! recorder) and to in-process counters readable through
//! [`CacheMetrics::snapshot`].

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use metrics::{counter, gauge, histogram};

/// Describes the cache metrics to the installed recorder.
/// Call once at startup, after installing a recorder.
pub fn register_cache_metrics() {
    metrics::describe_counter!("rampart_cache_hits_total", "Cache hits by tier");
    metrics::describe_counter!("rampart_cache_misses_total", "Lookups that missed every tier");
    metrics::describe_counter!("rampart_cache_loads_total", "Loader invocations by outcome");
    metrics::describe_counter!(
        "rampart_cache_null_cached_total",
        "Null markers written for absent keys"
    );
    metrics::describe_counter!(
        "rampart_cache_filter_rejections_total",
        "Lookups short-circuited by the membership filter"
    );
    metrics::describe_counter!(
        "rampart_cache_lock_contention_total",
        "Load-lock acquisitions lost to another holder"
    );
    metrics::describe_counter!(
        "rampart_cache_degraded_total",
        "Remote store failures absorbed by the local mirror"
    );
    metrics::describe_counter!(
        "rampart_cache_evictions_total",
        "Local mirror evictions by reason"
    );
    metrics::describe_gauge!("rampart_cache_mirror_entries", "Entries in the local mirror");
    metrics::describe_histogram!(
        "rampart_cache_operation_seconds",
        "Time spent on cache operations"
    );
}

#[derive(Debug, Default)]
struct Counters {
    remote_hits: AtomicU64,
    mirror_hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    null_cached: AtomicU64,
    filter_rejections: AtomicU64,
    lock_contention: AtomicU64,
    degraded: AtomicU64,
}

/// Point-in-time copy of the in-process counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct MetricsSnapshot {
    pub remote_hits: u64,
    pub mirror_hits: u64,
    pub misses: u64,
    pub loads: u64,
    pub load_failures: u64,
    pub null_cached: u64,
    pub filter_rejections: u64,
    pub lock_contention: u64,
    pub degraded: u64,
}

impl MetricsSnapshot {
    /// Hits over hits plus misses; zero before any lookup.
    pub fn hit_rate(&self) -> f64 {
        let hits = (self.remote_hits + self.mirror_hits) as f64;
        let total = hits + self.misses as f64;
        if total == 0.0 { 0.0 } else { hits / total }
    }
}

/// Where a hit was served from.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HitTier {
    Remote,
    Mirror,
}

impl HitTier {
    fn label(self) -> &'static str {
        match self {
            Self::Remote => "remote",
            Self::Mirror => "mirror",
        }
    }
}

/// Recorder for cache events. Cloning shares the counters.
#[derive(Debug, Clone, Default)]
pub struct CacheMetrics {
    counters: Arc<Counters>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// Records a hit served by `tier`.
    pub fn record_hit(&self, tier: HitTier) {
        let slot = match tier {
            HitTier::Remote => &self.counters.remote_hits,
            HitTier::Mirror => &self.counters.mirror_hits,
        };
        slot.fetch_add(1, Ordering::Relaxed);
        counter!("rampart_cache_hits_total", "tier" => tier.label()).increment(1);
    }

    /// Records a lookup that missed every tier.
    pub fn record_miss(&self) {
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        counter!("rampart_cache_misses_total").increment(1);
    }

    /// Records a loader call and whether it produced a value, nothing, or an error.
    pub fn record_load(&self, outcome: &'static str) {
        self.counters.loads.fetch_add(1, Ordering::Relaxed);
        if outcome == "error" || outcome == "timeout" {
            self.counters.load_failures.fetch_add(1, Ordering::Relaxed);
        }
        counter!("rampart_cache_loads_total", "outcome" => outcome).increment(1);
    }

    pub fn record_null_cached(&self) {
        self.counters.null_cached.fetch_add(1, Ordering::Relaxed);
        counter!("rampart_cache_null_cached_total").increment(1);
    }

    pub fn record_filter_rejection(&self) {
        self.counters.filter_rejections.fetch_add(1, Ordering::Relaxed);
        counter!("rampart_cache_filter_rejections_total").increment(1);
    }

    pub fn record_lock_contention(&self) {
        self.counters.lock_contention.fetch_add(1, Ordering::Relaxed);
        counter!("rampart_cache_lock_contention_total").increment(1);
    }

    /// Records a remote failure absorbed during `operation`.
    pub fn record_degraded(&self, operation: &'static str) {
        self.counters.degraded.fetch_add(1, Ordering::Relaxed);
        counter!("rampart_cache_degraded_total", "operation" => operation).increment(1);
    }

    /// Records mirror evictions.
    pub fn record_evictions(&self, reason: &'static str, count: usize) {
        if count > 0 {
            counter!("rampart_cache_evictions_total", "reason" => reason).increment(count as u64);
        }
    }

    /// Updates the mirror size gauge.
    pub fn update_mirror_entries(&self, count: usize) {
        gauge!("rampart_cache_mirror_entries").set(count as f64);
    }

    /// Records the duration of an operation.
    pub fn record_operation_duration(&self, operation: &'static str, duration: Duration) {
        histogram!("rampart_cache_operation_seconds", "operation" => operation)
            .record(duration.as_secs_f64());
    }

    /// Records the time elapsed since `start`.
    pub fn finish_operation(&self, operation: &'static str, start: Instant) {
        self.record_operation_duration(operation, start.elapsed());
    }

    /// Current counter values.
    pub fn snapshot(&self) -> MetricsSnapshot {
        let c = &self.counters;
        MetricsSnapshot {
            remote_hits: c.remote_hits.load(Ordering::Relaxed),
            mirror_hits: c.mirror_hits.load(Ordering::Relaxed),
            misses: c.misses.load(Ordering::Relaxed),
            loads: c.loads.load(Ordering::Relaxed),
            load_failures: c.load_failures.load(Ordering::Relaxed),
            null_cached: c.null_cached.load(Ordering::Relaxed),
            filter_rejections: c.filter_rejections.load(Ordering::Relaxed),
            lock_contention: c.lock_contention.load(Ordering::Relaxed),
            degraded: c.degraded.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hit_rate() {
        let metrics = CacheMetrics::new();

        // 3 hits, 1 miss = 75% hit rate
        metrics.record_hit(HitTier::Remote);
        metrics.record_hit(HitTier::Remote);
        metrics.record_hit(HitTier::Mirror);
        metrics.record_miss();

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.remote_hits, 2);
        assert_eq!(snapshot.mirror_hits, 1);
        assert!((snapshot.hit_rate() - 0.75).abs() < 0.001);
    }

    #[test]
    fn test_empty_hit_rate_is_zero() {
        assert_eq!(CacheMetrics::new().snapshot().hit_rate(), 0.0);
    }

    #[test]
    fn test_clones_share_counters() {
        let metrics = CacheMetrics::new();
        let clone = metrics.clone();

        clone.record_load("value");
        clone.record_load("error");
        clone.record_lock_contention();
        metrics.record_degraded("get");

        let snapshot = metrics.snapshot();
        assert_eq!(snapshot.loads, 2);
        assert_eq!(snapshot.load_failures, 1);
        assert_eq!(snapshot.lock_contention, 1);
        assert_eq!(snapshot.degraded, 1);
    }

    #[test]
    fn test_recording_without_recorder_is_noop() {
        let metrics = CacheMetrics::new();
        metrics.record_evictions("capacity", 3);
        metrics.update_mirror_entries(10);
        metrics.finish_operation("get", Instant::now());
        register_cache_metrics();
    }
}
