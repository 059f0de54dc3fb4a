//! Redis store implementation.

mod config;

pub use config::{RedisSettings, RedisSettingsBuilder};

use std::future::Future;
use std::sync::LazyLock;
use std::time::Duration;

use async_trait::async_trait;
use deadpool_redis::{Config, Connection, Pool, PoolConfig, Runtime};
use redis::AsyncCommands;
use rampart_core::ttl::whole_seconds;
use tracing::{debug, info};

use crate::error::StoreError;
use crate::store::KeyValueStore;

/// Deletes KEYS[1] only while it still holds ARGV[1].
const COMPARE_AND_DELETE_LUA: &str = r#"
if redis.call('get', KEYS[1]) == ARGV[1] then
    return redis.call('del', KEYS[1])
else
    return 0
end
"#;

static COMPARE_AND_DELETE: LazyLock<redis::Script> =
    LazyLock::new(|| redis::Script::new(COMPARE_AND_DELETE_LUA));

/// A pooled Redis client implementing [`KeyValueStore`].
///
/// Every command, including the wait for a pooled connection, is bounded
/// by the configured command timeout so a partitioned server surfaces as
/// [`StoreError::Timeout`] instead of stalling callers.
pub struct RedisStore {
    pool: Pool,
    settings: RedisSettings,
}

impl RedisStore {
    /// Creates a store with a lazily connecting pool.
    pub fn new(settings: RedisSettings) -> Result<Self, StoreError> {
        settings.validate()?;

        let mut config = Config::from_url(settings.url());
        let mut pool_config = PoolConfig::new(settings.pool_size());
        pool_config.timeouts.wait = Some(settings.command_timeout());
        pool_config.timeouts.create = Some(settings.command_timeout());
        pool_config.timeouts.recycle = Some(settings.command_timeout());
        config.pool = Some(pool_config);

        let pool = config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| StoreError::InvalidConfig(e.to_string()))?;

        info!(
            url = %settings.url(),
            pool_size = settings.pool_size(),
            "Redis store configured"
        );

        Ok(Self { pool, settings })
    }

    /// Creates a store and verifies the server answers.
    pub async fn connect(settings: RedisSettings) -> Result<Self, StoreError> {
        let store = Self::new(settings)?;
        store.ping().await?;
        info!(url = %store.settings.url(), "Connected to Redis");
        Ok(store)
    }

    /// Wraps an existing pool.
    pub fn from_pool(pool: Pool, settings: RedisSettings) -> Self {
        Self { pool, settings }
    }

    /// Returns the settings.
    pub fn settings(&self) -> &RedisSettings {
        &self.settings
    }

    async fn bounded<T, F>(&self, op: F) -> Result<T, StoreError>
    where
        F: Future<Output = Result<T, StoreError>>,
    {
        let limit = self.settings.command_timeout();
        tokio::time::timeout(limit, op)
            .await
            .map_err(|_| StoreError::timeout(limit))?
    }

    async fn connection(&self) -> Result<Connection, StoreError> {
        Ok(self.pool.get().await?)
    }
}

#[async_trait]
impl KeyValueStore for RedisStore {
    async fn get(&self, key: &str) -> Result<Option<Vec<u8>>, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let value: Option<Vec<u8>> = conn.get(key).await?;
            Ok(value)
        })
        .await
    }

    async fn set(
        &self,
        key: &str,
        value: &[u8],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let mut cmd = redis::cmd("SET");
            cmd.arg(key).arg(value);
            let seconds = ttl.map(whole_seconds).unwrap_or(0);
            if seconds > 0 {
                cmd.arg("EX").arg(seconds);
            }
            let _: () = cmd.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn set_if_absent(
        &self,
        key: &str,
        value: &[u8],
        ttl: Duration,
    ) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let reply: Option<String> = redis::cmd("SET")
                .arg(key)
                .arg(value)
                .arg("NX")
                .arg("EX")
                .arg(whole_seconds(ttl).max(1))
                .query_async(&mut conn)
                .await?;
            Ok(reply.is_some())
        })
        .await
    }

    async fn delete(&self, keys: &[String]) -> Result<u64, StoreError> {
        if keys.is_empty() {
            return Ok(0);
        }
        self.bounded(async {
            let mut conn = self.connection().await?;
            let mut cmd = redis::cmd("DEL");
            for key in keys {
                cmd.arg(key);
            }
            let removed: u64 = cmd.query_async(&mut conn).await?;
            Ok(removed)
        })
        .await
    }

    async fn compare_and_delete(&self, key: &str, expected: &[u8]) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let removed: i64 = COMPARE_AND_DELETE
                .key(key)
                .arg(expected)
                .invoke_async(&mut conn)
                .await?;
            Ok(removed > 0)
        })
        .await
    }

    async fn keys(&self, pattern: &str) -> Result<Vec<String>, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let mut keys = Vec::new();
            let mut cursor: u64 = 0;
            loop {
                let (next, batch): (u64, Vec<String>) = redis::cmd("SCAN")
                    .arg(cursor)
                    .arg("MATCH")
                    .arg(pattern)
                    .arg("COUNT")
                    .arg(self.settings.scan_count())
                    .query_async(&mut conn)
                    .await?;
                keys.extend(batch);
                if next == 0 {
                    break;
                }
                cursor = next;
            }
            // SCAN may return a key more than once
            keys.sort();
            keys.dedup();
            debug!(pattern = %pattern, count = keys.len(), "Scanned keys");
            Ok(keys)
        })
        .await
    }

    async fn expire(&self, key: &str, ttl: Duration) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            if ttl.is_zero() {
                let _: i64 = redis::cmd("PERSIST").arg(key).query_async(&mut conn).await?;
                let present: bool = conn.exists(key).await?;
                return Ok(present);
            }
            let applied: i64 = redis::cmd("EXPIRE")
                .arg(key)
                .arg(whole_seconds(ttl))
                .query_async(&mut conn)
                .await?;
            Ok(applied == 1)
        })
        .await
    }

    async fn ttl(&self, key: &str) -> Result<i64, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let remaining: i64 = conn.ttl(key).await?;
            Ok(remaining)
        })
        .await
    }

    async fn exists(&self, key: &str) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let present: bool = conn.exists(key).await?;
            Ok(present)
        })
        .await
    }

    async fn incr_by(&self, key: &str, delta: i64) -> Result<i64, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let value: i64 = conn.incr(key, delta).await?;
            Ok(value)
        })
        .await
    }

    async fn set_bit(&self, key: &str, offset: u64) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let previous: u8 = redis::cmd("SETBIT")
                .arg(key)
                .arg(offset)
                .arg(1)
                .query_async(&mut conn)
                .await?;
            Ok(previous == 1)
        })
        .await
    }

    async fn get_bit(&self, key: &str, offset: u64) -> Result<bool, StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let bit: u8 = redis::cmd("GETBIT")
                .arg(key)
                .arg(offset)
                .query_async(&mut conn)
                .await?;
            Ok(bit == 1)
        })
        .await
    }

    async fn set_bits(&self, key: &str, offsets: &[u64]) -> Result<(), StoreError> {
        if offsets.is_empty() {
            return Ok(());
        }
        self.bounded(async {
            let mut conn = self.connection().await?;
            let mut pipe = redis::pipe();
            for &offset in offsets {
                pipe.cmd("SETBIT").arg(key).arg(offset).arg(1).ignore();
            }
            let _: () = pipe.query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    async fn get_bits(&self, key: &str, offsets: &[u64]) -> Result<Vec<bool>, StoreError> {
        if offsets.is_empty() {
            return Ok(Vec::new());
        }
        self.bounded(async {
            let mut conn = self.connection().await?;
            let mut pipe = redis::pipe();
            for &offset in offsets {
                pipe.cmd("GETBIT").arg(key).arg(offset);
            }
            let bits: Vec<u8> = pipe.query_async(&mut conn).await?;
            Ok(bits.into_iter().map(|b| b == 1).collect())
        })
        .await
    }

    async fn set_many(
        &self,
        entries: &[(String, Vec<u8>)],
        ttl: Option<Duration>,
    ) -> Result<(), StoreError> {
        if entries.is_empty() {
            return Ok(());
        }
        self.bounded(async {
            let mut conn = self.connection().await?;
            let seconds = ttl.map(whole_seconds).unwrap_or(0);
            let mut pipe = redis::pipe();
            for (key, value) in entries {
                let cmd = pipe.cmd("SET").arg(key).arg(value.as_slice());
                if seconds > 0 {
                    cmd.arg("EX").arg(seconds);
                }
                cmd.ignore();
            }
            let _: () = pipe.query_async(&mut conn).await?;
            debug!(count = entries.len(), "Pipelined multi-set");
            Ok(())
        })
        .await
    }

    async fn ping(&self) -> Result<(), StoreError> {
        self.bounded(async {
            let mut conn = self.connection().await?;
            let _: String = redis::cmd("PING").query_async(&mut conn).await?;
            Ok(())
        })
        .await
    }

    fn name(&self) -> &str {
        "redis"
    }
}

impl std::fmt::Debug for RedisStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisStore")
            .field("url", &self.settings.url())
            .field("pool_size", &self.settings.pool_size())
            .field("command_timeout", &self.settings.command_timeout())
            .finish()
    }
}
