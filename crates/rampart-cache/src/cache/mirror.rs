//! Process-local mirror of recently written values.
//!
//! The mirror answers reads when the remote store misses or cannot be
//! reached. It is never authoritative: whenever the store answers, the
//! store wins.

use std::time::{Duration, Instant};

use dashmap::DashMap;
use glob::Pattern;
use rampart_core::CachedValue;

use crate::settings::MirrorSettings;

/// Una entrada del mirror con su TTL.
#[derive(Debug, Clone)]
pub struct MirrorEntry {
    value: CachedValue,
    ttl: Duration,
    created_at: Instant,
}

impl MirrorEntry {
    /// A zero `ttl` never expires locally.
    pub fn new(value: CachedValue, ttl: Duration) -> Self {
        Self {
            value,
            ttl,
            created_at: Instant::now(),
        }
    }

    pub fn value(&self) -> &CachedValue {
        &self.value
    }

    pub fn is_expired(&self) -> bool {
        !self.ttl.is_zero() && self.created_at.elapsed() > self.ttl
    }

    fn expires_at(&self) -> Option<Instant> {
        (!self.ttl.is_zero()).then(|| self.created_at + self.ttl)
    }
}

/// Outcome of a [`LocalMirror::prune`] pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct PruneReport {
    /// Entries dropped because their TTL had passed.
    pub expired: usize,
    /// Live entries evicted to get back under the ceiling.
    pub evicted: usize,
    /// Entries left afterwards.
    pub remaining: usize,
}

/// Concurrent map of key to [`MirrorEntry`], sharded so unrelated keys
/// never contend.
#[derive(Debug)]
pub struct LocalMirror {
    entries: DashMap<String, MirrorEntry>,
    max_entries: usize,
    target_entries: usize,
}

impl LocalMirror {
    pub fn new(settings: &MirrorSettings) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: settings.max_entries,
            target_entries: settings.target_entries(),
        }
    }

    /// Obtiene un valor si existe y no ha expirado.
    pub fn get(&self, key: &str) -> Option<CachedValue> {
        let entry = self.entries.get(key)?;
        if entry.is_expired() {
            drop(entry);
            self.entries.remove_if(key, |_, entry| entry.is_expired());
            return None;
        }
        Some(entry.value.clone())
    }

    /// Inserta o reemplaza un valor.
    pub fn insert(&self, key: &str, value: CachedValue, ttl: Duration) {
        self.entries
            .insert(key.to_string(), MirrorEntry::new(value, ttl));
    }

    pub fn remove(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    /// Removes every key matching `pattern`, returning how many went.
    pub fn remove_matching(&self, pattern: &Pattern) -> usize {
        let mut removed = 0;
        self.entries.retain(|key, _| {
            let matches = pattern.matches(key);
            if matches {
                removed += 1;
            }
            !matches
        });
        removed
    }

    /// Drops expired entries, then evicts the entries closest to expiry
    /// until the mirror is back at its low watermark.
    ///
    /// Eviction only triggers above the ceiling. Entries without a TTL go
    /// last.
    pub fn prune(&self) -> PruneReport {
        let mut expired = 0;
        self.entries.retain(|_, entry| {
            let live = !entry.is_expired();
            if !live {
                expired += 1;
            }
            live
        });

        let mut evicted = 0;
        let len = self.entries.len();
        if len > self.max_entries {
            let excess = len - self.target_entries;
            let mut by_expiry: Vec<(Option<Instant>, String)> = self
                .entries
                .iter()
                .map(|entry| (entry.value().expires_at(), entry.key().clone()))
                .collect();
            by_expiry.sort_by_key(|(at, _)| (at.is_none(), *at));

            for (_, key) in by_expiry.into_iter().take(excess) {
                if self.entries.remove(&key).is_some() {
                    evicted += 1;
                }
            }
        }

        PruneReport {
            expired,
            evicted,
            remaining: self.entries.len(),
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }
}
