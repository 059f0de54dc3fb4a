//! Cache module.
//!
//! [`CacheManager`] layers a membership filter, the shared store, a
//! process-local mirror and a distributed load lock, with support for
//! pattern-based invalidation and bulk warm-up.

pub mod invalidation;
pub mod manager;
pub mod mirror;
pub mod warmup;

// Re-exports
pub use invalidation::InvalidationResult;
pub use manager::{CacheManager, CacheManagerBuilder};
pub use mirror::{LocalMirror, MirrorEntry, PruneReport};
pub use warmup::{WarmupRegistry, WarmupReport, WarmupTask};
