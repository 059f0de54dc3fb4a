//! Membership filters.
//!
//! A filter answers "might this key exist?" with no false negatives. The
//! cache consults it before touching the store so lookups for keys that
//! were never written cost nothing.
//!
//! Two implementations share [`rampart_core::bloom`] hashing:
//!
//! - [`LocalFilter`] - bit array owned by one process
//! - [`RemoteFilter`] - named bit field in the shared store

mod local;
mod remote;

pub use local::LocalFilter;
pub use remote::RemoteFilter;

use async_trait::async_trait;
use rampart_store::StoreError;

/// A filter as seen by the cache manager.
///
/// An unpopulated filter (nothing ever inserted) admits every key, so a
/// cold filter never hides keys that exist in the backing source.
#[async_trait]
pub trait MembershipFilter: Send + Sync {
    /// Records `key` as present.
    async fn insert(&self, key: &str) -> Result<(), StoreError>;

    /// Records several keys.
    async fn insert_all(&self, keys: &[String]) -> Result<(), StoreError> {
        for key in keys {
            self.insert(key).await?;
        }
        Ok(())
    }

    /// Returns false only when `key` was certainly never inserted.
    ///
    /// Implementations answer true when they cannot tell, including on
    /// store failures.
    async fn may_contain(&self, key: &str) -> bool;

    /// Returns true once at least one key has been inserted.
    async fn is_populated(&self) -> bool;

    /// Forgets every key.
    async fn reset(&self) -> Result<(), StoreError>;

    /// Name used in logs.
    fn name(&self) -> &str;
}
