//! # Rampart Store
//!
//! Shared key-value store backends for the Rampart cache layer.
//!
//! This crate defines the [`KeyValueStore`] seam and two implementations:
//! a pooled Redis client and an in-process store.
//!
//! ## Features
//!
//! - Async trait-based store abstraction
//! - Redis backend over a `deadpool-redis` pool with per-command timeouts
//! - Atomic compare-and-delete via a Lua script
//! - Pipelined bit and multi-key writes
//! - In-process store with a switchable outage mode for degradation tests
//!
//! ## Example
//!
//! ```ignore
//! use rampart_store::{KeyValueStore, RedisSettings, RedisStore};
//!
//! let settings = RedisSettings::builder()
//!     .url("redis://localhost:6379")
//!     .pool_size(32)
//!     .build()?;
//!
//! let store = RedisStore::connect(settings).await?;
//! store.set("sku:42", b"{}", None).await?;
//! ```

pub mod error;
pub mod memory;
pub mod redis_store;
pub mod store;

// Re-exports
pub use error::StoreError;
pub use memory::MemoryStore;
pub use redis_store::{RedisSettings, RedisSettingsBuilder, RedisStore};
pub use store::{KeyValueStore, SharedStore};

// Re-export rampart_core for consumers
pub use rampart_core;
