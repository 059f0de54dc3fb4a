//! Key-value store trait definition.

use std::time::Duration;

use async_trait::async_trait;

use crate::error::StoreError;

/// A networked key-value store with bit, counter, TTL and atomic
/// compare-and-delete primitives.
///
/// This trait abstracts over the shared store (Redis in production) so the
/// cache layer, filters and locks can be exercised against an in-process
/// implementation.
///
/// # Implementors
///
/// - `RedisStore` - Pooled Redis client
/// - `MemoryStore` - In-process store with a switchable outage mode
///
/// # TTL semantics
///
/// A `ttl` of `None` (or [`Duration::ZERO`] where a duration is required)
/// stores the key without expiry. Stores with second granularity round
/// sub-second TTLs up.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Reads the raw bytes stored at `key`.
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError>;

    /// Writes `value` at `key`, replacing any previous value and TTL.
    async fn set(&self, key: &str, value: &[u8], ttl: Option<Duration>)
    -> Result<(), StoreError>;

    /// Writes `value` only if `key` is absent (`SET key value NX EX ttl`).
    ///
    /// Returns `true` when the value was written.
    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError>;

    /// Deletes `keys`, returning how many existed.
    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError>;

    /// Deletes `key` only if it currently holds `expected`.
    ///
    /// Must execute atomically in a single round trip.
    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError>;

    /// Lists keys matching a glob-style `pattern`.
    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError>;

    /// Sets a TTL on an existing key. Returns `false` if the key is absent.
    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError>;

    /// Remaining TTL in seconds: `-1` for no expiry, `-2` for a missing key.
    async fn ttl(&self, key: &str) -> Result<i64, StoreError>;

    /// Returns whether `key` exists.
    async fn exists(&self, key: &str) -> Result<bool, StoreError>;

    /// Adds `delta` to the integer at `key` (absent counts as zero).
    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError>;

    /// Sets the bit at `offset`, returning its previous value.
    async fn set_bit(&self, key: &str, offset: u64) -> Result<bool, StoreError>;

    /// Reads the bit at `offset`. Missing keys read as all zeros.
    async fn get_bit(&self, key: &str, offset: u64) -> Result<bool, StoreError>;

    /// Sets several bits.
    ///
    /// The default implementation issues one command per bit. Networked
    /// stores should batch.
    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<(), StoreError> {
        for &offset in offsets {
            self.set_bit(key, offset).await?;
        }
        Ok(())
    }

    /// Reads several bits, in order.
    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>, StoreError> {
        let mut bits = Vec::with_capacity(offsets.len());
        for &offset in offsets {
            bits.push(self.get_bit(key, offset).await?);
        }
        Ok(bits)
    }

    /// Writes many entries with a shared TTL in one batch.
    async fn set_many(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError>;

    /// Checks that the store is reachable.
    async fn ping(&self) -> Result<(), StoreError>;

    /// Returns the name of this store, for logging.
    fn name(&self) -> &str;
}
