//! Rampart Core - Domain types for the anti-stampede cache layer
//!
//! This crate holds the pieces that every other Rampart crate agrees on and
//! that need no I/O: the error type, the cached-value codec with its null
//! marker, TTL defaults and jitter, Bloom filter sizing and hash positions,
//! and key naming.

pub mod bloom;
pub mod error;
pub mod keys;
pub mod ttl;
pub mod value;

pub use bloom::BloomParams;
pub use error::{RampartError, Result};
pub use value::{CachedValue, NULL_MARKER};
