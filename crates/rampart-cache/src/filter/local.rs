//! In-process Bloom filter.

use std::sync::atomic::{AtomicU64, Ordering};

use async_trait::async_trait;
use parking_lot::RwLock;
use rampart_core::BloomParams;
use rampart_store::StoreError;

use super::MembershipFilter;

/// Bloom filter over a bit array held in memory.
///
/// # Examples
///
/// ```
/// use rampart_cache::filter::LocalFilter;
///
/// let filter = LocalFilter::new(10_000, 0.01).unwrap();
/// filter.add("sku:42");
///
/// assert!(filter.might_contain("sku:42"));
/// ```
#[derive(Debug)]
pub struct LocalFilter {
    params: BloomParams,
    words: RwLock<Vec<u64>>,
    insertions: AtomicU64,
}

impl LocalFilter {
    /// Creates a filter sized for `expected_insertions` at `false_positive_rate`.
    pub fn new(expected_insertions: u64, false_positive_rate: f64) -> rampart_core::Result<Self> {
        let params = BloomParams::optimal(expected_insertions, false_positive_rate)?;
        Ok(Self::with_params(params))
    }

    /// Creates a filter with explicit parameters.
    pub fn with_params(params: BloomParams) -> Self {
        let words = params.bits().div_ceil(64) as usize;
        Self {
            params,
            words: RwLock::new(vec![0; words]),
            insertions: AtomicU64::new(0),
        }
    }

    /// Sets the bits for `value`.
    pub fn add(&self, value: &str) {
        let positions = self.params.positions(value);
        let mut words = self.words.write();
        for position in positions {
            words[(position / 64) as usize] |= 1u64 << (position % 64);
        }
        self.insertions.fetch_add(1, Ordering::Relaxed);
    }

    /// Returns false only if `value` was never added.
    pub fn might_contain(&self, value: &str) -> bool {
        let positions = self.params.positions(value);
        let words = self.words.read();
        positions
            .into_iter()
            .all(|position| words[(position / 64) as usize] & (1u64 << (position % 64)) != 0)
    }

    /// Clears every bit.
    pub fn clear(&self) {
        self.words.write().fill(0);
        self.insertions.store(0, Ordering::Relaxed);
    }

    /// Number of `add` calls since creation or the last clear.
    pub fn len(&self) -> u64 {
        self.insertions.load(Ordering::Relaxed)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn bits(&self) -> u64 {
        self.params.bits()
    }

    pub fn hashes(&self) -> u32 {
        self.params.hashes()
    }

    pub fn params(&self) -> BloomParams {
        self.params
    }
}

#[async_trait]
impl MembershipFilter for LocalFilter {
    async fn insert(&self, key: &str) -> Result<(), StoreError> {
        self.add(key);
        Ok(())
    }

    async fn may_contain(&self, key: &str) -> bool {
        self.is_empty() || self.might_contain(key)
    }

    async fn is_populated(&self) -> bool {
        !self.is_empty()
    }

    async fn reset(&self) -> Result<(), StoreError> {
        self.clear();
        Ok(())
    }

    fn name(&self) -> &str {
        "local"
    }
}
