//! Metrics for the cache layer.

pub mod cache;

pub use cache::{CacheMetrics, HitTier, MetricsSnapshot, register_cache_metrics};
