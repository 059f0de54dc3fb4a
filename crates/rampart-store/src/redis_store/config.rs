//! Redis connection settings.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::StoreError;

/// Settings for the Redis store.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub struct RedisSettings {
    /// Redis connection URL (e.g. `redis://localhost:6379`).
    #[serde(default = "default_url")]
    url: String,

    /// Maximum pooled connections.
    #[serde(default = "default_pool_size")]
    pool_size: usize,

    /// Bound applied to every command, including waiting for a connection.
    #[serde(default = "default_command_timeout", with = "humantime_serde")]
    command_timeout: Duration,

    /// Keys fetched per `SCAN` round trip.
    #[serde(default = "default_scan_count")]
    scan_count: usize,
}

fn default_url() -> String {
    "redis://localhost:6379".to_string()
}

fn default_pool_size() -> usize {
    16
}

fn default_command_timeout() -> Duration {
    Duration::from_millis(500)
}

fn default_scan_count() -> usize {
    500
}

impl Default for RedisSettings {
    fn default() -> Self {
        Self {
            url: default_url(),
            pool_size: default_pool_size(),
            command_timeout: default_command_timeout(),
            scan_count: default_scan_count(),
        }
    }
}

impl RedisSettings {
    /// Creates a new builder for RedisSettings.
    pub fn builder() -> RedisSettingsBuilder {
        RedisSettingsBuilder::default()
    }

    /// Returns the connection URL.
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Returns the maximum pool size.
    pub fn pool_size(&self) -> usize {
        self.pool_size
    }

    /// Returns the per-command timeout.
    pub fn command_timeout(&self) -> Duration {
        self.command_timeout
    }

    /// Returns the `SCAN` batch hint.
    pub fn scan_count(&self) -> usize {
        self.scan_count
    }

    /// Validates the settings.
    pub fn validate(&self) -> Result<(), StoreError> {
        if !(self.url.starts_with("redis://")
            || self.url.starts_with("rediss://")
            || self.url.starts_with("redis+unix://")
            || self.url.starts_with("unix://"))
        {
            return Err(StoreError::InvalidConfig(format!(
                "unsupported redis url scheme: {}",
                self.url
            )));
        }
        if self.pool_size == 0 {
            return Err(StoreError::InvalidConfig(
                "pool_size must be greater than zero".to_string(),
            ));
        }
        if self.command_timeout.is_zero() {
            return Err(StoreError::InvalidConfig(
                "command_timeout must be greater than zero".to_string(),
            ));
        }
        Ok(())
    }
}

/// Builder for RedisSettings.
#[derive(Debug, Default)]
pub struct RedisSettingsBuilder {
    url: Option<String>,
    pool_size: Option<usize>,
    command_timeout: Option<Duration>,
    scan_count: Option<usize>,
}

impl RedisSettingsBuilder {
    /// Sets the connection URL.
    pub fn url(mut self, url: impl Into<String>) -> Self {
        self.url = Some(url.into());
        self
    }

    /// Sets the pool size.
    pub fn pool_size(mut self, size: usize) -> Self {
        self.pool_size = Some(size);
        self
    }

    /// Sets the per-command timeout.
    pub fn command_timeout(mut self, timeout: Duration) -> Self {
        self.command_timeout = Some(timeout);
        self
    }

    /// Sets the `SCAN` batch hint.
    pub fn scan_count(mut self, count: usize) -> Self {
        self.scan_count = Some(count);
        self
    }

    /// Builds and validates the settings.
    pub fn build(self) -> Result<RedisSettings, StoreError> {
        let settings = RedisSettings {
            url: self.url.unwrap_or_else(default_url),
            pool_size: self.pool_size.unwrap_or_else(default_pool_size),
            command_timeout: self.command_timeout.unwrap_or_else(default_command_timeout),
            scan_count: self.scan_count.unwrap_or_else(default_scan_count),
        };
        settings.validate()?;
        Ok(settings)
    }
}
