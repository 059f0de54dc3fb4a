//! Cached value encoding.
//!
//! Values travel to the remote store as JSON bytes. A known-absent key is
//! cached as [`NULL_MARKER`], which can never be produced by the JSON
//! encoder, so the two cases never collide.

use serde::Serialize;
use serde::de::DeserializeOwned;

use crate::error::{RampartError, Result};

/// Byte representation of the null marker.
///
/// Not valid JSON on purpose.
pub const NULL_MARKER: &[u8] = b"[NULL_VALUE]";

/// A value as stored by the cache: either real bytes or the null marker.
///
/// # Example
///
/// ```
/// use rampart_core::CachedValue;
///
/// let value = CachedValue::from_value("sku:42", &42_u32).unwrap();
/// assert_eq!(value.to_value::<u32>("sku:42").unwrap(), Some(42));
///
/// let null = CachedValue::decode(CachedValue::Null.encode());
/// assert!(null.is_null());
/// ```
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CachedValue {
    /// Serialized payload.
    Present(Vec<u8>),
    /// Known-absent marker.
    Null,
}

impl CachedValue {
    /// Serializes `value` as JSON.
    pub fn from_value<T: Serialize + ?Sized>(key: &str, value: &T) -> Result<Self> {
        serde_json::to_vec(value)
            .map(Self::Present)
            .map_err(|e| RampartError::codec(key, e.to_string()))
    }

    /// Decodes the raw bytes read from a store.
    pub fn decode(bytes: impl Into<Vec<u8>>) -> Self {
        let bytes = bytes.into();
        if bytes == NULL_MARKER {
            Self::Null
        } else {
            Self::Present(bytes)
        }
    }

    /// Returns the bytes to write to a store.
    pub fn encode(&self) -> &[u8] {
        match self {
            Self::Present(bytes) => bytes,
            Self::Null => NULL_MARKER,
        }
    }

    /// Returns true for the null marker.
    pub fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }

    /// Deserializes the payload. The null marker maps to `None`.
    pub fn to_value<T: DeserializeOwned>(&self, key: &str) -> Result<Option<T>> {
        match self {
            Self::Null => Ok(None),
            Self::Present(bytes) => serde_json::from_slice(bytes)
                .map(Some)
                .map_err(|e| RampartError::codec(key, e.to_string())),
        }
    }

    /// Size of the encoded representation in bytes.
    pub fn len(&self) -> usize {
        self.encode().len()
    }

    /// Returns true when the encoded representation is empty.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
