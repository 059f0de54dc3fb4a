//! In-process key-value store.
//!
//! Implements the same contract as the Redis backend, including TTLs, bit
//! fields in Redis bit order and glob key listing. It backs single-node
//! deployments and the test suites, where `set_available(false)` stands in
//! for a partitioned store.

use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::time::{Duration, Instant};

use async_trait::async_trait;
use glob::Pattern;
use parking_lot::Mutex;
use tracing::debug;

use crate::error::StoreError;
use crate::store::KeyValueStore;

#[derive(Debug, Clone)]
struct Slot {
    data: Vec<u8>,
    expires_at: Option<Instant>,
}

impl Slot {
    fn new(data: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            data,
            expires_at: deadline(ttl),
        }
    }

    fn is_expired(&self, now: Instant) -> bool {
        self.expires_at.is_some_and(|at| now >= at)
    }
}

fn deadline(ttl: Option<Duration>) -> Option<Instant> {
    ttl.filter(|ttl| !ttl.is_zero())
        .map(|ttl| Instant::now() + ttl)
}

/// In-process store.
#[derive(Debug)]
pub struct MemoryStore {
    slots: Mutex<HashMap<String, Slot>>,
    available: AtomicBool,
    commands: AtomicU64,
}

impl MemoryStore {
    /// Creates an empty, reachable store.
    pub fn new() -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            available: AtomicBool::new(true),
            commands: AtomicU64::new(0),
        }
    }

    /// Simulates the store becoming reachable or unreachable.
    ///
    /// While unavailable every command fails with
    /// [`StoreError::Unavailable`]; data is kept.
    pub fn set_available(&self, available: bool) {
        debug!(available, "memory store availability changed");
        self.available.store(available, Ordering::SeqCst);
    }

    /// Returns whether the store currently answers commands.
    pub fn is_available(&self) -> bool {
        self.available.load(Ordering::SeqCst)
    }

    /// Number of commands served (including batches as one), for
    /// round-trip assertions.
    pub fn command_count(&self) -> u64 {
        self.commands.load(Ordering::Relaxed)
    }

    /// Number of live keys.
    pub fn len(&self) -> usize {
        let now = Instant::now();
        self.slots
            .lock()
            .values()
            .filter(|slot| !slot.is_expired(now))
            .count()
    }

    /// Returns true if no live key is stored.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn check(&self) -> Result<(), StoreError> {
        self.commands.fetch_add(1, Ordering::Relaxed);
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::unavailable("memory store marked unavailable"))
        }
    }

    /// Runs `f` on the live slot for `key`, purging it first if expired.
    fn with_live<T>(&self, key: &str, f: impl FnOnce(Option<&mut Slot>) -> T) -> T {
        let mut slots = self.slots.lock();
        let now = Instant::now();
        if slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            slots.remove(key);
        }
        f(slots.get_mut(key))
    }
}

impl Default for MemoryStore {
    fn default() -> Self {
        Self::new()
    }
}

fn bit_location(offset: u64) -> (usize, u8) {
    let byte = (offset / 8) as usize;
    let mask = 0x80u8 >> (offset % 8);
    (byte, mask)
}

#[async_trait]
impl KeyValueStore for MemoryStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.check()?;
        Ok(self.with_live(key, |slot| slot.map(|s| s.data.clone())))
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check()?;
        self.slots
            .lock()
            .insert(key.to_string(), Slot::new(value.to_vec(), ttl));
        Ok(())
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        let now = Instant::now();
        match slots.get(key) {
            Some(slot) if !slot.is_expired(now) => Ok(false),
            _ => {
                slots.insert(key.to_string(), Slot::new(value.to_vec(), Some(ttl)));
                Ok(true)
            },
        }
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        let now = Instant::now();
        let removed = keys
            .iter()
            .filter_map(|key| slots.remove(key))
            .filter(|slot| !slot.is_expired(now))
            .count();
        Ok(removed as u64)
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        let now = Instant::now();
        let matches = slots
            .get(key)
            .is_some_and(|slot| !slot.is_expired(now) && slot.data == expected);
        if matches {
            slots.remove(key);
        }
        Ok(matches)
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.check()?;
        let pattern = Pattern::new(pattern)
            .map_err(|e| StoreError::command(format!("invalid pattern '{}': {}", pattern, e)))?;
        let now = Instant::now();
        let mut keys: Vec<String> = self
            .slots
            .lock()
            .iter()
            .filter(|(key, slot)| !slot.is_expired(now) && pattern.matches(key))
            .map(|(key, _)| key.clone())
            .collect();
        keys.sort();
        Ok(keys)
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.with_live(key, |slot| match slot {
            Some(slot) => {
                slot.expires_at = deadline(Some(ttl));
                true
            },
            None => false,
        }))
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.check()?;
        Ok(self.with_live(key, |slot| match slot {
            None => -2,
            Some(Slot {
                expires_at: None, ..
            }) => -1,
            Some(Slot {
                expires_at: Some(at),
                ..
            }) => {
                let remaining = at.saturating_duration_since(Instant::now());
                rampart_core::ttl::whole_seconds(remaining) as i64
            },
        }))
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.check()?;
        Ok(self.with_live(key, |slot| slot.is_some()))
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        let now = Instant::now();
        if slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            slots.remove(key);
        }

        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(b"0".to_vec(), None));
        let current: i64 = std::str::from_utf8(&slot.data)
            .ok()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| StoreError::invalid_data(key, "value is not an integer"))?;
        let next = current
            .checked_add(delta)
            .ok_or_else(|| StoreError::invalid_data(key, "increment would overflow"))?;
        slot.data = next.to_string().into_bytes();
        Ok(next)
    }

    async fn set_bit(&self, key: &str, offset: u64) -> Result<bool, StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        let now = Instant::now();
        if slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            slots.remove(key);
        }

        let (byte, mask) = bit_location(offset);
        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Vec::new(), None));
        if slot.data.len() <= byte {
            slot.data.resize(byte + 1, 0);
        }
        let previous = slot.data[byte] & mask != 0;
        slot.data[byte] |= mask;
        Ok(previous)
    }

    async fn get_bit(&self, key: &str, offset: u64) -> Result<bool, StoreError> {
        self.check()?;
        let (byte, mask) = bit_location(offset);
        Ok(self.with_live(key, |slot| {
            slot.and_then(|s| s.data.get(byte).copied())
                .is_some_and(|b| b & mask != 0)
        }))
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<(), StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        let now = Instant::now();
        if slots.get(key).is_some_and(|slot| slot.is_expired(now)) {
            slots.remove(key);
        }

        let slot = slots
            .entry(key.to_string())
            .or_insert_with(|| Slot::new(Vec::new(), None));
        for &offset in offsets {
            let (byte, mask) = bit_location(offset);
            if slot.data.len() <= byte {
                slot.data.resize(byte + 1, 0);
            }
            slot.data[byte] |= mask;
        }
        Ok(())
    }

    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>, StoreError> {
        self.check()?;
        Ok(self.with_live(key, |slot| {
            offsets
                .iter()
                .map(|&offset| {
                    let (byte, mask) = bit_location(offset);
                    slot.as_ref()
                        .and_then(|s| s.data.get(byte).copied())
                        .is_some_and(|b| b & mask != 0)
                })
                .collect()
        }))
    }

    async fn set_many(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.check()?;
        let mut slots = self.slots.lock();
        for (key, value) in entries {
            slots.insert(key.clone(), Slot::new(value.clone(), ttl));
        }
        Ok(())
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.check()
    }

    fn name(&self) -> &str {
        "memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_set_get_delete() {
        let store = MemoryStore::new();
        store.set("a", b"1", None).await.unwrap();

        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
        assert_eq!(store.delete(&["a".to_string(), "b".to_string()]).await.unwrap(), 1);
        assert_eq!(store.get("a").await.unwrap(), None);
    }

    #[tokio::test]
    async fn test_ttl_expiry() {
        let store = MemoryStore::new();
        store
            .set("short", b"v", Some(Duration::from_millis(30)))
            .await
            .unwrap();
        assert!(store.exists("short").await.unwrap());

        std::thread::sleep(Duration::from_millis(50));

        assert!(!store.exists("short").await.unwrap());
        assert_eq!(store.ttl("short").await.unwrap(), -2);
    }

    #[tokio::test]
    async fn test_ttl_reporting() {
        let store = MemoryStore::new();
        store.set("forever", b"v", None).await.unwrap();
        store
            .set("timed", b"v", Some(Duration::from_secs(90)))
            .await
            .unwrap();

        assert_eq!(store.ttl("forever").await.unwrap(), -1);
        let remaining = store.ttl("timed").await.unwrap();
        assert!((89..=90).contains(&remaining));
    }

    #[tokio::test]
    async fn test_set_if_absent_respects_existing() {
        let store = MemoryStore::new();
        let ttl = Duration::from_secs(30);

        assert!(store.set_if_absent("lock:x", b"a", ttl).await.unwrap());
        assert!(!store.set_if_absent("lock:x", b"b", ttl).await.unwrap());
        assert_eq!(store.get("lock:x").await.unwrap(), Some(b"a".to_vec()));
    }

    #[tokio::test]
    async fn test_compare_and_delete() {
        let store = MemoryStore::new();
        store.set("lock:x", b"a", None).await.unwrap();

        assert!(!store.compare_and_delete("lock:x", b"b").await.unwrap());
        assert!(store.exists("lock:x").await.unwrap());
        assert!(store.compare_and_delete("lock:x", b"a").await.unwrap());
        assert!(!store.exists("lock:x").await.unwrap());
    }

    #[tokio::test]
    async fn test_bits_use_redis_order() {
        let store = MemoryStore::new();
        assert!(!store.set_bit("f", 0).await.unwrap());
        assert!(store.set_bit("f", 0).await.unwrap());
        store.set_bit("f", 9).await.unwrap();

        // bit 0 is the high bit of byte 0, bit 9 is 0x40 of byte 1
        assert_eq!(store.get("f").await.unwrap(), Some(vec![0x80, 0x40]));
        assert_eq!(
            store.get_bits("f", &[0, 1, 9, 1_000]).await.unwrap(),
            vec![true, false, true, false]
        );
    }

    #[tokio::test]
    async fn test_incr_by() {
        let store = MemoryStore::new();
        assert_eq!(store.incr_by("c", 1).await.unwrap(), 1);
        assert_eq!(store.incr_by("c", 1).await.unwrap(), 2);
        assert_eq!(store.incr_by("c", -3).await.unwrap(), -1);
        assert_eq!(store.incr_by("missing", -1).await.unwrap(), -1);

        store.set("text", b"abc", None).await.unwrap();
        assert!(matches!(
            store.incr_by("text", 1).await,
            Err(StoreError::InvalidData { .. })
        ));
    }

    #[tokio::test]
    async fn test_keys_glob() {
        let store = MemoryStore::new();
        for key in ["product:1", "product:2", "order:1"] {
            store.set(key, b"x", None).await.unwrap();
        }

        assert_eq!(
            store.keys("product:*").await.unwrap(),
            vec!["product:1".to_string(), "product:2".to_string()]
        );
        assert_eq!(store.keys("*:1").await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_unavailable_fails_every_command() {
        let store = MemoryStore::new();
        store.set("a", b"1", None).await.unwrap();
        store.set_available(false);

        assert!(matches!(
            store.get("a").await,
            Err(StoreError::Unavailable { .. })
        ));
        assert!(store.set_if_absent("lock", b"t", Duration::from_secs(1)).await.is_err());
        assert!(store.ping().await.is_err());

        store.set_available(true);
        assert_eq!(store.get("a").await.unwrap(), Some(b"1".to_vec()));
    }

    #[tokio::test]
    async fn test_set_many_is_one_command() {
        let store = MemoryStore::new();
        let entries = vec![
            ("n:1".to_string(), b"1".to_vec()),
            ("n:2".to_string(), b"2".to_vec()),
        ];
        let before = store.command_count();
        store
            .set_many(&entries, Some(Duration::from_secs(60)))
            .await
            .unwrap();

        assert_eq!(store.command_count(), before + 1);
        assert_eq!(store.len(), 2);
    }
}
