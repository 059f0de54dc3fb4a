//! Error types for key-value stores.

/// Errors that can occur when talking to a key-value store.
///
/// These never reach callers of the cache layer: the cache absorbs them and
/// degrades to its local mirror. They are public so the store-level APIs
/// (filters, locks) can be used directly.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The store cannot be reached.
    #[error("store unavailable: {reason}")]
    Unavailable { reason: String },

    /// A command did not complete within the client-level bound.
    #[error("store command timed out after {millis}ms")]
    Timeout { millis: u64 },

    /// The store rejected a command.
    #[error("store command failed: {0}")]
    Command(String),

    /// No pooled connection could be obtained.
    #[error("connection pool error: {0}")]
    Pool(String),

    /// The stored data does not have the expected shape.
    #[error("invalid data at '{key}': {reason}")]
    InvalidData { key: String, reason: String },

    /// Invalid store configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),
}

impl StoreError {
    /// Creates a new unavailable error.
    pub fn unavailable(reason: impl Into<String>) -> Self {
        Self::Unavailable {
            reason: reason.into(),
        }
    }

    /// Creates a new command error.
    pub fn command(msg: impl Into<String>) -> Self {
        Self::Command(msg.into())
    }

    /// Creates a new invalid data error.
    pub fn invalid_data(key: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidData {
            key: key.into(),
            reason: reason.into(),
        }
    }

    /// Creates a timeout error from a duration.
    pub fn timeout(after: std::time::Duration) -> Self {
        Self::Timeout {
            millis: after.as_millis() as u64,
        }
    }

    /// Returns true if this is a transient error that might succeed on retry.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::Timeout { .. } | Self::Pool(_)
        )
    }
}

impl From<redis::RedisError> for StoreError {
    fn from(e: redis::RedisError) -> Self {
        if e.is_timeout() {
            Self::Timeout { millis: 0 }
        } else if e.is_io_error() || e.is_connection_refusal() || e.is_connection_dropped() {
            Self::unavailable(e.to_string())
        } else {
            Self::Command(e.to_string())
        }
    }
}

impl From<deadpool_redis::PoolError> for StoreError {
    fn from(e: deadpool_redis::PoolError) -> Self {
        Self::Pool(e.to_string())
    }
}
