//! Bloom filter sizing and bit positions.
//!
//! Both filter variants (in-process and store-backed) share this code, so a
//! key hashes to the same positions regardless of where the bits live.
//!
//! Positions are derived from a single digest family: for seed `i` in
//! `0..k` the value's UTF-8 bytes followed by the decimal form of `i` are
//! run through MD5, the first four digest bytes are read as a
//! little-endian `u32`, and the result is reduced modulo the field size.

use std::f64::consts::LN_2;

use md5::{Digest, Md5};

use crate::error::{RampartError, Result};

/// Size and hash count for a Bloom filter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BloomParams {
    bits: u64,
    hashes: u32,
}

impl BloomParams {
    /// Parameters used by the shared filters when none are configured.
    pub const DEFAULT: Self = Self {
        bits: 1_000_000,
        hashes: 3,
    };

    /// Creates parameters from an explicit size and hash count.
    pub fn new(bits: u64, hashes: u32) -> Result<Self> {
        if bits == 0 {
            return Err(RampartError::invalid_filter_parameters(
                "bits",
                "must be greater than zero",
            ));
        }
        if hashes == 0 {
            return Err(RampartError::invalid_filter_parameters(
                "hashes",
                "must be greater than zero",
            ));
        }
        Ok(Self { bits, hashes })
    }

    /// Optimal parameters for `expected_insertions` keys at the given
    /// false-positive rate.
    ///
    /// `m = ceil(-n·ln(p) / ln(2)²)`, `k = ceil((m/n)·ln(2))`.
    ///
    /// # Example
    ///
    /// ```
    /// use rampart_core::BloomParams;
    ///
    /// let params = BloomParams::optimal(1_000, 0.01).unwrap();
    /// assert_eq!(params.bits(), 9_586);
    /// assert_eq!(params.hashes(), 7);
    /// ```
    pub fn optimal(expected_insertions: u64, false_positive_rate: f64) -> Result<Self> {
        if expected_insertions == 0 {
            return Err(RampartError::invalid_filter_parameters(
                "expected_insertions",
                "must be greater than zero",
            ));
        }
        if !(false_positive_rate > 0.0 && false_positive_rate < 1.0) {
            return Err(RampartError::invalid_filter_parameters(
                "false_positive_rate",
                format!("must be in (0, 1), got {}", false_positive_rate),
            ));
        }

        let n = expected_insertions as f64;
        let bits = (-n * false_positive_rate.ln() / (LN_2 * LN_2)).ceil();
        let hashes = ((bits / n) * LN_2).ceil().max(1.0);

        Self::new(bits as u64, hashes as u32)
    }

    /// Number of bits in the field.
    pub fn bits(&self) -> u64 {
        self.bits
    }

    /// Number of positions per key.
    pub fn hashes(&self) -> u32 {
        self.hashes
    }

    /// The `k` positions for `value`.
    pub fn positions(&self, value: &str) -> Vec<u64> {
        (0..self.hashes)
            .map(|seed| bit_position(value, seed, self.bits))
            .collect()
    }
}

impl Default for BloomParams {
    fn default() -> Self {
        Self::DEFAULT
    }
}

/// Position of `value` for hash `seed` in a field of `bits` bits.
pub fn bit_position(value: &str, seed: u32, bits: u64) -> u64 {
    let mut hasher = Md5::new();
    hasher.update(value.as_bytes());
    hasher.update(seed.to_string().as_bytes());
    let digest = hasher.finalize();

    let low = u32::from_le_bytes([digest[0], digest[1], digest[2], digest[3]]);
    u64::from(low) % bits
}
