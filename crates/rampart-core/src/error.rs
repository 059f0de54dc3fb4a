//! Error types for Rampart.
//!
//! This module defines the error hierarchy that callers of the cache
//! layer can observe. Remote store failures never show up here: they are
//! absorbed by the cache layer and turned into local-mirror fallbacks.
//! What remains are construction errors, codec errors and failures of the
//! caller-supplied loader.
//!
//! # Example
//!
//! ```
//! use rampart_core::{RampartError, Result};
//!
//! fn expected_size(n: u64) -> Result<u64> {
//!     if n == 0 {
//!         return Err(RampartError::invalid_filter_parameters(
//!             "expected_insertions",
//!             "must be greater than zero",
//!         ));
//!     }
//!     Ok(n)
//! }
//!
//! assert!(expected_size(0).is_err());
//! ```

use thiserror::Error;

/// Main error type for Rampart operations.
///
/// # Example
///
/// ```
/// use rampart_core::RampartError;
///
/// let error = RampartError::loader_timeout("sku:42", 5);
/// assert!(error.is_loader_error());
/// ```
#[derive(Debug, Error)]
pub enum RampartError {
    /// A filter was constructed with out-of-range sizing parameters.
    #[error("Invalid filter parameter '{field}': {reason}")]
    InvalidFilterParameters {
        /// Parameter that failed validation
        field: &'static str,
        /// Why it's invalid
        reason: String,
    },

    /// A value could not be encoded or decoded.
    #[error("Codec error for key '{key}': {message}")]
    Codec {
        /// Cache key being processed
        key: String,
        /// Description of the failure
        message: String,
    },

    /// The caller-supplied loader failed.
    #[error("Loader failed for key '{key}': {cause}")]
    Loader {
        /// Key whose value could not be produced
        key: String,
        /// Underlying loader error
        #[source]
        cause: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The loader did not finish within the configured bound.
    #[error("Loader for key '{key}' timed out after {seconds}s")]
    LoaderTimeout {
        /// Key whose value could not be produced
        key: String,
        /// Configured bound, in seconds
        seconds: u64,
    },

    /// Bulk warm-up could not be written to the remote store.
    #[error("Warm-up of namespace '{namespace}' failed: {message}")]
    Warmup {
        /// Namespace being warmed
        namespace: String,
        /// Description of the failure
        message: String,
    },

    /// Settings could not be loaded or are inconsistent.
    #[error("Invalid settings: {0}")]
    InvalidSettings(String),
}

impl RampartError {
    // ============================================
    // Convenience constructors
    // ============================================

    /// Creates an InvalidFilterParameters error.
    pub fn invalid_filter_parameters(field: &'static str, reason: impl Into<String>) -> Self {
        Self::InvalidFilterParameters {
            field,
            reason: reason.into(),
        }
    }

    /// Creates a Codec error.
    pub fn codec(key: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Codec {
            key: key.into(),
            message: message.into(),
        }
    }

    /// Creates a Loader error wrapping the loader's own error.
    ///
    /// # Example
    ///
    /// ```
    /// use rampart_core::RampartError;
    ///
    /// let io = std::io::Error::new(std::io::ErrorKind::Other, "db down");
    /// let error = RampartError::loader("user:7", io);
    /// assert!(error.to_string().contains("db down"));
    /// ```
    pub fn loader<E>(key: impl Into<String>, cause: E) -> Self
    where
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        Self::Loader {
            key: key.into(),
            cause: cause.into(),
        }
    }

    /// Creates a LoaderTimeout error.
    pub fn loader_timeout(key: impl Into<String>, seconds: u64) -> Self {
        Self::LoaderTimeout {
            key: key.into(),
            seconds,
        }
    }

    /// Creates a Warmup error.
    pub fn warmup(namespace: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Warmup {
            namespace: namespace.into(),
            message: message.into(),
        }
    }

    /// Creates an InvalidSettings error.
    pub fn invalid_settings(message: impl Into<String>) -> Self {
        Self::InvalidSettings(message.into())
    }

    // ============================================
    // Query methods
    // ============================================

    /// Returns true if the error came from the caller's loader.
    pub fn is_loader_error(&self) -> bool {
        matches!(self, Self::Loader { .. } | Self::LoaderTimeout { .. })
    }

    /// Returns true if this is a codec error.
    pub fn is_codec_error(&self) -> bool {
        matches!(self, Self::Codec { .. })
    }

    /// Returns true if this is a construction-time validation error.
    pub fn is_validation_error(&self) -> bool {
        matches!(
            self,
            Self::InvalidFilterParameters { .. } | Self::InvalidSettings(_)
        )
    }
}

/// Type alias for Results with RampartError.
pub type Result<T> = std::result::Result<T, RampartError>;
