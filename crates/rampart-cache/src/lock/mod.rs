//! Distributed mutual exclusion over the shared store.
//!
//! A lock is one store key holding the holder's token, written with
//! `SET NX EX` and removed by an atomic compare-and-delete, so a caller
//! whose lease already ran out can never delete someone else's lock.
//!
//! Every operation fails closed: when the store cannot be reached,
//! acquisition reports `false` and nothing is assumed held.

mod guard;
mod token;

pub use guard::LockGuard;
pub use token::LockToken;

use std::time::Duration;

use rampart_core::keys::reentrant_counter_key;
use rampart_store::{SharedStore, StoreError};
use tracing::{debug, warn};

/// Non-blocking distributed lock.
///
/// # Examples
///
/// ```no_run
/// # use std::sync::Arc;
/// # use std::time::Duration;
/// # use rampart_cache::lock::{DistributedLock, LockToken};
/// # use rampart_store::MemoryStore;
/// # #[tokio::main]
/// # async fn main() {
/// let lock = DistributedLock::new(Arc::new(MemoryStore::new()));
/// let token = LockToken::new();
///
/// if lock.try_lock("lock:report", token.as_str(), Duration::from_secs(30)).await {
///     // exclusive section
///     lock.unlock("lock:report", token.as_str()).await;
/// }
/// # }
/// ```
#[derive(Clone)]
pub struct DistributedLock {
    store: SharedStore,
}

impl DistributedLock {
    pub fn new(store: SharedStore) -> Self {
        Self { store }
    }

    /// Attempts to take `key` for `token`, surfacing store errors.
    ///
    /// Returns `Ok(false)` on contention. Callers use the error to tell
    /// "someone else holds it" from "the store is unreachable".
    pub async fn try_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let acquired = self.store.set_if_absent(key, token.as_bytes(), ttl).await?;
        debug!(key = %key, acquired, "Lock attempt");
        Ok(acquired)
    }

    /// Attempts to take `key` for `token`. Never waits.
    pub async fn try_lock(&self, key: &str, token: &str, ttl: Duration) -> bool {
        match self.try_acquire(key, token, ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(key = %key, error = %e, "Lock acquisition failed, store unavailable");
                false
            },
        }
    }

    /// Releases `key` if `token` still holds it.
    pub async fn unlock(&self, key: &str, token: &str) -> bool {
        match self.store.compare_and_delete(key, token.as_bytes()).await {
            Ok(released) => {
                debug!(key = %key, released, "Lock release");
                released
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Lock release failed");
                false
            },
        }
    }

    /// Takes `key`, or re-enters it when `token` already holds it.
    ///
    /// Each entry increments a counter at `key:token`; re-entry refreshes
    /// the lease of both keys.
    pub async fn try_reentrant_lock(&self, key: &str, token: &str, ttl: Duration) -> bool {
        match self.reentrant_acquire(key, token, ttl).await {
            Ok(acquired) => acquired,
            Err(e) => {
                warn!(key = %key, error = %e, "Reentrant lock acquisition failed");
                false
            },
        }
    }

    async fn reentrant_acquire(
        &self,
        key: &str,
        token: &str,
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        let counter = reentrant_counter_key(key, token);

        if self.store.set_if_absent(key, token.as_bytes(), ttl).await? {
            self.store.set(&counter, b"1", Some(ttl)).await?;
            debug!(key = %key, "Reentrant lock acquired");
            return Ok(true);
        }

        match self.store.get(key).await? {
            Some(holder) if holder == token.as_bytes() => {
                let depth = self.store.incr_by(&counter, 1).await?;
                self.store.expire(key, ttl).await?;
                self.store.expire(&counter, ttl).await?;
                debug!(key = %key, depth, "Reentrant lock re-entered");
                Ok(true)
            },
            _ => Ok(false),
        }
    }

    /// Leaves one level of a reentrant hold.
    ///
    /// The lock itself is deleted once the counter reaches zero (or was
    /// missing). Returns false if `token` does not hold `key`.
    pub async fn unlock_reentrant(&self, key: &str, token: &str) -> bool {
        match self.reentrant_release(key, token).await {
            Ok(released) => released,
            Err(e) => {
                warn!(key = %key, error = %e, "Reentrant lock release failed");
                false
            },
        }
    }

    async fn reentrant_release(&self, key: &str, token: &str) -> Result<bool, StoreError> {
        match self.store.get(key).await? {
            Some(holder) if holder == token.as_bytes() => {},
            _ => return Ok(false),
        }

        let counter = reentrant_counter_key(key, token);
        let remaining = self.store.incr_by(&counter, -1).await?;
        if remaining <= 0 {
            self.store.compare_and_delete(key, token.as_bytes()).await?;
            self.store.delete(&[counter]).await?;
            debug!(key = %key, "Reentrant lock released");
        }
        Ok(true)
    }

    /// Deletes `key` regardless of holder.
    ///
    /// Administrative use only: a current holder keeps running its
    /// critical section while another caller may now acquire the lock.
    pub async fn force_unlock(&self, key: &str) -> bool {
        match self.store.delete(&[key.to_string()]).await {
            Ok(removed) => {
                warn!(key = %key, removed, "Lock force-released");
                removed > 0
            },
            Err(e) => {
                warn!(key = %key, error = %e, "Forced lock release failed");
                false
            },
        }
    }

    /// Returns whether anyone holds `key`. False when the store is unreachable.
    pub async fn is_locked(&self, key: &str) -> bool {
        match self.store.exists(key).await {
            Ok(locked) => locked,
            Err(e) => {
                warn!(key = %key, error = %e, "Lock state check failed");
                false
            },
        }
    }

    /// Takes `key` under a fresh token and returns a guard owning it.
    ///
    /// `Ok(None)` means another holder has the lock.
    pub async fn acquire_guard(
        &self,
        key: &str,
        ttl: Duration,
    ) -> Result<Option<LockGuard>, StoreError> {
        let token = LockToken::new();
        if self.try_acquire(key, token.as_str(), ttl).await? {
            Ok(Some(LockGuard::new(self.clone(), key.to_string(), token)))
        } else {
            Ok(None)
        }
    }
}

impl std::fmt::Debug for DistributedLock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DistributedLock")
            .field("store", &self.store.name())
            .finish()
    }
}
