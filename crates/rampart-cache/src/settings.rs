//! Cache settings.
//!
//! Settings are layered: built-in defaults, then an optional file, then
//! `RAMPART__*` environment variables (nested fields separated by `__`,
//! e.g. `RAMPART__MIRROR__MAX_ENTRIES=50000`).

use std::path::Path;
use std::time::Duration;

use config::{Config, ConfigBuilder, Environment, File, FileFormat, builder::DefaultState};
use rampart_core::ttl::{
    DEFAULT_JITTER_RATIO, DEFAULT_LOCK_TTL, DEFAULT_TTL, FILTER_TTL, NULL_TTL,
};
use rampart_core::keys::{BLOOM_PREFIX, LOCK_PREFIX};
use rampart_core::{BloomParams, RampartError, Result};
use serde::{Deserialize, Serialize};

/// Settings for a [`CacheManager`](crate::CacheManager).
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CacheSettings {
    /// TTL applied when the caller does not pass one.
    #[serde(with = "humantime_serde")]
    pub default_ttl: Duration,

    /// TTL of the null marker.
    #[serde(with = "humantime_serde")]
    pub null_ttl: Duration,

    /// Loaded values live `ttl * (1 + U(0, jitter_ratio))`.
    pub jitter_ratio: f64,

    /// Lease of the load lock.
    #[serde(with = "humantime_serde")]
    pub lock_ttl: Duration,

    /// Prefix of load-lock keys.
    pub lock_prefix: String,

    /// How a caller that lost the load lock waits for the winner.
    pub lock_retry: LockRetry,

    /// Upper bound on a single loader call.
    #[serde(with = "humantime_serde")]
    pub loader_timeout: Option<Duration>,

    /// Shared membership filter.
    pub filter: FilterSettings,

    /// Local mirror bounds.
    pub mirror: MirrorSettings,
}

/// Polling applied after losing the load lock.
///
/// `attempts = 0` returns absent immediately.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LockRetry {
    pub attempts: u32,
    #[serde(with = "humantime_serde")]
    pub interval: Duration,
}

impl Default for LockRetry {
    fn default() -> Self {
        Self {
            attempts: 5,
            interval: Duration::from_millis(50),
        }
    }
}

impl LockRetry {
    /// No polling: a lost lock race returns absent.
    pub const FAIL_FAST: Self = Self {
        attempts: 0,
        interval: Duration::ZERO,
    };
}

/// Membership filter settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FilterSettings {
    /// Name of the remote bit field.
    pub name: String,
    pub bits: u64,
    pub hashes: u32,
    /// Lifetime of the remote bit field, refreshed on every add.
    #[serde(with = "humantime_serde")]
    pub ttl: Duration,
}

impl Default for FilterSettings {
    fn default() -> Self {
        Self {
            name: format!("{}cache-keys", BLOOM_PREFIX),
            bits: BloomParams::DEFAULT.bits(),
            hashes: BloomParams::DEFAULT.hashes(),
            ttl: FILTER_TTL,
        }
    }
}

impl FilterSettings {
    /// Validated Bloom parameters.
    pub fn params(&self) -> Result<BloomParams> {
        BloomParams::new(self.bits, self.hashes)
    }
}

/// Local mirror settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorSettings {
    /// Size ceiling that triggers eviction during a prune.
    pub max_entries: usize,
    /// Fraction of `max_entries` a prune evicts down to.
    pub low_watermark: f64,
    /// Interval of the background prune.
    #[serde(with = "humantime_serde")]
    pub cleanup_interval: Duration,
}

impl Default for MirrorSettings {
    fn default() -> Self {
        Self {
            max_entries: 10_000,
            low_watermark: 0.7,
            cleanup_interval: Duration::from_secs(60),
        }
    }
}

impl MirrorSettings {
    /// Entry count a prune evicts down to.
    pub fn target_entries(&self) -> usize {
        (self.max_entries as f64 * self.low_watermark).floor() as usize
    }
}

impl Default for CacheSettings {
    fn default() -> Self {
        Self {
            default_ttl: DEFAULT_TTL,
            null_ttl: NULL_TTL,
            jitter_ratio: DEFAULT_JITTER_RATIO,
            lock_ttl: DEFAULT_LOCK_TTL,
            lock_prefix: LOCK_PREFIX.to_string(),
            lock_retry: LockRetry::default(),
            loader_timeout: None,
            filter: FilterSettings::default(),
            mirror: MirrorSettings::default(),
        }
    }
}

impl CacheSettings {
    /// Environment variable prefix.
    pub const ENV_PREFIX: &'static str = "RAMPART";

    /// Loads settings from an optional file plus the environment.
    ///
    /// The file format is inferred from its extension.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut builder = Config::builder();
        if let Some(path) = path {
            builder = builder.add_source(File::from(path).required(true));
        }
        Self::finish(builder)
    }

    /// Loads settings from TOML text plus the environment.
    pub fn from_toml_str(toml: &str) -> Result<Self> {
        let builder = Config::builder().add_source(File::from_str(toml, FileFormat::Toml));
        Self::finish(builder)
    }

    fn finish(builder: ConfigBuilder<DefaultState>) -> Result<Self> {
        let settings: Self = builder
            .add_source(
                Environment::with_prefix(Self::ENV_PREFIX)
                    .prefix_separator("__")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()
            .and_then(|cfg| cfg.try_deserialize())
            .map_err(|e| RampartError::invalid_settings(e.to_string()))?;

        settings.validate()?;
        Ok(settings)
    }

    /// Checks value ranges.
    pub fn validate(&self) -> Result<()> {
        if self.default_ttl.is_zero() {
            return Err(RampartError::invalid_settings("default_ttl must be positive"));
        }
        if self.null_ttl.is_zero() {
            return Err(RampartError::invalid_settings("null_ttl must be positive"));
        }
        if !(0.0..=1.0).contains(&self.jitter_ratio) {
            return Err(RampartError::invalid_settings(format!(
                "jitter_ratio must be within [0, 1], got {}",
                self.jitter_ratio
            )));
        }
        if self.lock_ttl < Duration::from_secs(1) {
            return Err(RampartError::invalid_settings(
                "lock_ttl must be at least one second",
            ));
        }
        if self.lock_prefix.is_empty() {
            return Err(RampartError::invalid_settings("lock_prefix must not be empty"));
        }
        if self.filter.name.is_empty() {
            return Err(RampartError::invalid_settings("filter.name must not be empty"));
        }
        self.filter
            .params()
            .map_err(|e| RampartError::invalid_settings(e.to_string()))?;
        if self.mirror.max_entries == 0 {
            return Err(RampartError::invalid_settings(
                "mirror.max_entries must be positive",
            ));
        }
        if !(self.mirror.low_watermark > 0.0 && self.mirror.low_watermark <= 1.0) {
            return Err(RampartError::invalid_settings(format!(
                "mirror.low_watermark must be within (0, 1], got {}",
                self.mirror.low_watermark
            )));
        }
        if self.mirror.cleanup_interval.is_zero() {
            return Err(RampartError::invalid_settings(
                "mirror.cleanup_interval must be positive",
            ));
        }
        Ok(())
    }

    /// Lock key guarding the load of `key`.
    pub fn lock_key(&self, key: &str) -> String {
        format!("{}{}", self.lock_prefix, key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let settings = CacheSettings::default();

        assert_eq!(settings.default_ttl, Duration::from_secs(300));
        assert_eq!(settings.null_ttl, Duration::from_secs(60));
        assert_eq!(settings.lock_ttl, Duration::from_secs(30));
        assert_eq!(settings.jitter_ratio, 0.1);
        assert_eq!(settings.lock_prefix, "lock:");
        assert_eq!(settings.filter.name, "bloom:cache-keys");
        assert_eq!(settings.filter.ttl, Duration::from_secs(30 * 24 * 3600));
        assert_eq!(settings.mirror.max_entries, 10_000);
        assert_eq!(settings.mirror.target_entries(), 7_000);
        assert!(settings.loader_timeout.is_none());
        assert!(settings.validate().is_ok());
    }

    #[test]
    fn test_lock_key_uses_prefix() {
        let settings = CacheSettings::default();
        assert_eq!(settings.lock_key("sku:42"), "lock:sku:42");
    }

    #[test]
    fn test_from_toml_overrides_and_keeps_defaults() {
        let settings = CacheSettings::from_toml_str(
            r#"
            default_ttl = "10m"
            jitter_ratio = 0.2
            loader_timeout = "2s"

            [lock_retry]
            attempts = 0

            [mirror]
            max_entries = 500
            "#,
        )
        .unwrap();

        assert_eq!(settings.default_ttl, Duration::from_secs(600));
        assert_eq!(settings.jitter_ratio, 0.2);
        assert_eq!(settings.loader_timeout, Some(Duration::from_secs(2)));
        assert_eq!(settings.lock_retry.attempts, 0);
        assert_eq!(settings.lock_retry.interval, Duration::from_millis(50));
        assert_eq!(settings.mirror.max_entries, 500);
        assert_eq!(settings.mirror.low_watermark, 0.7);
        assert_eq!(settings.null_ttl, Duration::from_secs(60));
    }

    #[test]
    fn test_invalid_values_rejected() {
        let result = CacheSettings::from_toml_str("jitter_ratio = 1.5");
        assert!(matches!(result, Err(RampartError::InvalidSettings(_))));

        let mut settings = CacheSettings::default();
        settings.mirror.low_watermark = 0.0;
        assert!(settings.validate().is_err());

        let mut settings = CacheSettings::default();
        settings.filter.hashes = 0;
        assert!(settings.validate().is_err());

        let mut settings = CacheSettings::default();
        settings.lock_ttl = Duration::from_millis(200);
        assert!(settings.validate().is_err());
    }

    #[test]
    fn test_missing_file_is_an_error() {
        let result = CacheSettings::load(Some(Path::new("/nonexistent/rampart.toml")));
        assert!(result.is_err());
    }
}
