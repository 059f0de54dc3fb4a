//! # Rampart Cache
//!
//! Anti-stampede caching over a shared key-value store.
//!
//! ## Features
//!
//! - Bloom membership filters, in-process or shared through the store
//! - Distributed lock with owner tokens, plain and reentrant
//! - Read-through [`CacheManager`] with a single loader per key across
//!   instances, null-result caching and jittered TTLs
//! - Local mirror that keeps serving when the store is unreachable
//! - Pattern invalidation, pipelined warm-up and a warm-up registry
//! - Periodic maintenance and `metrics` instrumentation
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use rampart_cache::{CacheManager, CacheSettings};
//! use rampart_store::{RedisSettings, RedisStore};
//!
//! let settings = CacheSettings::load(None)?;
//! let store = RedisStore::connect(RedisSettings::builder().build()?).await?;
//! let cache = CacheManager::builder(Arc::new(store)).settings(settings).build()?;
//! let _maintenance = cache.start_maintenance();
//!
//! let price: Option<u64> = cache
//!     .get_or_load("price:sku:42", || async { db.price("sku:42").await })
//!     .await?;
//! ```

pub mod cache;
pub mod filter;
pub mod lock;
pub mod metrics;
pub mod settings;
pub mod sync;

// Re-exports
pub use cache::{
    CacheManager, CacheManagerBuilder, InvalidationResult, LocalMirror, PruneReport,
    WarmupRegistry, WarmupReport, WarmupTask,
};
pub use filter::{LocalFilter, MembershipFilter, RemoteFilter};
pub use lock::{DistributedLock, LockGuard, LockToken};
pub use metrics::{CacheMetrics, MetricsSnapshot, register_cache_metrics};
pub use settings::{CacheSettings, FilterSettings, LockRetry, MirrorSettings};
pub use sync::{PeriodicScheduler, ScheduleConfig, TaskHandle};

// Re-export lower layers for consumers
pub use rampart_core;
pub use rampart_store;
