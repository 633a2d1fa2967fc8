use super::KeyValueStore;
use crate::config::RedisConfig;
use crate::error::{DealwatchError, Result};
use async_trait::async_trait;
use deadpool_redis::redis;
use deadpool_redis::{Config, Pool, Runtime};
use std::time::Duration;
use tracing::debug;

/// Redis-backed store using `SET NX PX` for atomic acquisition
#[derive(Clone)]
pub struct RedisKeyValueStore {
    pool: Pool,
}

impl std::fmt::Debug for RedisKeyValueStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RedisKeyValueStore")
            .field("status", &self.pool.status())
            .finish()
    }
}

impl RedisKeyValueStore {
    pub fn new(pool: Pool) -> Self {
        Self { pool }
    }

    /// Build a pool from config. No connection is made until first use.
    pub fn from_config(config: &RedisConfig) -> Result<Option<Self>> {
        let Some(url) = config.url.as_deref() else {
            return Ok(None);
        };
        let pool = Config::from_url(url)
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| DealwatchError::ConfigurationError(format!("Invalid redis url: {e}")))?;
        Ok(Some(Self { pool }))
    }
}

// Redis rejects PX 0; anything shorter than a millisecond rounds up
fn ttl_millis(ttl: Duration) -> u64 {
    u64::try_from(ttl.as_millis()).unwrap_or(u64::MAX).max(1)
}

#[async_trait]
impl KeyValueStore for RedisKeyValueStore {
    async fn set_if_absent(&self, key: &str, value: &str, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await?;
        let reply: Option<String> = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;

        debug!(key, acquired = reply.is_some(), "SET NX PX");
        Ok(reply.is_some())
    }

    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await?;
        let value: Option<String> = redis::cmd("GET").arg(key).query_async(&mut conn).await?;
        Ok(value)
    }

    async fn set(&self, key: &str, value: &str, ttl: Duration) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn set_persistent(&self, key: &str, value: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: () = redis::cmd("SET")
            .arg(key)
            .arg(value)
            .query_async(&mut conn)
            .await?;
        Ok(())
    }

    async fn ttl_seconds(&self, key: &str) -> Result<Option<i64>> {
        let mut conn = self.pool.get().await?;
        // -2: missing key, -1: no expiry
        let ttl: i64 = redis::cmd("TTL").arg(key).query_async(&mut conn).await?;
        Ok((ttl >= 0).then_some(ttl))
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await?;
        let _: i64 = redis::cmd("DEL").arg(key).query_async(&mut conn).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_missing_url_means_no_store() {
        let store = RedisKeyValueStore::from_config(&RedisConfig { url: None }).unwrap();
        assert!(store.is_none());
    }

    #[test]
    fn test_pool_is_built_without_connecting() {
        let store = RedisKeyValueStore::from_config(&RedisConfig {
            url: Some("redis://127.0.0.1:6379".to_string()),
        })
        .unwrap();
        assert!(store.is_some());
    }

    #[test]
    fn test_ttl_is_sent_in_milliseconds() {
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
        assert_eq!(ttl_millis(Duration::from_millis(1300)), 1300);
        assert_eq!(ttl_millis(Duration::from_secs(600)), 600_000);
    }
}
