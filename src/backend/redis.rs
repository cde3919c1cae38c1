//! Redis cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use deadpool_redis::redis::cmd;
use deadpool_redis::{Config, Pool, Runtime};
use std::time::Duration;

/// Default Redis connection pool size.
/// Override with REDIS_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: usize = 16;

/// Configuration for Redis backend.
#[derive(Clone, Debug)]
pub struct RedisConfig {
    pub url: String, // e.g., "redis://localhost:6379/0"
    pub pool_size: usize,
}

impl Default for RedisConfig {
    fn default() -> Self {
        RedisConfig {
            url: "redis://localhost:6379".to_string(),
            pool_size: 10,
        }
    }
}

/// Redis backend with connection pooling.
///
/// Commands used: `GET`, `SET .. PX`, `SET .. NX PX`, `DEL`, `PING`.
/// Set-if-absent is a single `SET NX`, atomic on the server.
///
/// # Example
///
/// ```no_run
/// # use cache_shield::backend::{RedisBackend, RedisConfig, CacheBackend};
/// # use cache_shield::error::Result;
/// # async fn example() -> Result<()> {
/// let backend = RedisBackend::new(RedisConfig::default())?;
/// backend.set("key", "value".to_string(), None).await?;
/// let value = backend.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct RedisBackend {
    pool: Pool,
}

impl RedisBackend {
    /// Create new Redis backend from configuration.
    ///
    /// Connections are opened lazily on first use.
    ///
    /// # Errors
    /// Returns `Err` if the URL is invalid or pool creation fails
    pub fn new(config: RedisConfig) -> Result<Self> {
        let mut pool_config = Config::from_url(config.url.clone());
        pool_config.pool = Some(deadpool_redis::PoolConfig::new(config.pool_size));

        let pool = pool_config
            .create_pool(Some(Runtime::Tokio1))
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Redis backend initialized with url: {} (pool size: {})",
            config.url, config.pool_size
        );

        Ok(RedisBackend { pool })
    }

    /// Create from a Redis URL directly.
    ///
    /// Pool size comes from `REDIS_POOL_SIZE` if set, else `DEFAULT_POOL_SIZE`.
    pub fn from_url(url: String) -> Result<Self> {
        let pool_size = std::env::var("REDIS_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<usize>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        Self::new(RedisConfig { url, pool_size })
    }

    /// Wrap an existing pool shared with the rest of the application.
    pub fn from_pool(pool: Pool) -> Self {
        RedisBackend { pool }
    }
}

fn ttl_millis(ttl: Duration) -> u64 {
    (ttl.as_millis() as u64).max(1)
}

impl CacheBackend for RedisBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Redis connection: {}", e))
        })?;

        let value: Option<String> = cmd("GET")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis GET failed for key {}: {}", key, e))
            })?;

        if value.is_some() {
            debug!("✓ Redis GET {} -> HIT", key);
        } else {
            debug!("✓ Redis GET {} -> MISS", key);
        }
        Ok(value)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Redis connection: {}", e))
        })?;

        let mut command = cmd("SET");
        command.arg(key).arg(value);
        if let Some(d) = ttl {
            command.arg("PX").arg(ttl_millis(d));
        }

        let _: () = command.query_async(&mut conn).await.map_err(|e| {
            Error::StoreUnavailable(format!("Redis SET failed for key {}: {}", key, e))
        })?;

        if let Some(d) = ttl {
            debug!("✓ Redis SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ Redis SET {}", key);
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Redis connection: {}", e))
        })?;

        // Replies "OK" when stored, nil when the key exists.
        let reply: Option<String> = cmd("SET")
            .arg(key)
            .arg(value)
            .arg("NX")
            .arg("PX")
            .arg(ttl_millis(ttl))
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis SET NX failed for key {}: {}", key, e))
            })?;

        let created = reply.is_some();
        debug!("✓ Redis SETNX {} -> {}", key, created);
        Ok(created)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Redis connection: {}", e))
        })?;

        let _: i64 = cmd("DEL")
            .arg(key)
            .query_async(&mut conn)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Redis DEL failed for key {}: {}", key, e))
            })?;

        debug!("✓ Redis DELETE {}", key);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(mut conn) => {
                let pong: std::result::Result<String, _> =
                    cmd("PING").query_async(&mut conn).await;
                Ok(pong.is_ok())
            }
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_redis_config_default() {
        let config = RedisConfig::default();
        assert_eq!(config.url, "redis://localhost:6379");
        assert_eq!(config.pool_size, 10);
    }

    #[test]
    fn test_ttl_millis_never_zero() {
        assert_eq!(ttl_millis(Duration::from_secs(10)), 10_000);
        assert_eq!(ttl_millis(Duration::from_micros(10)), 1);
    }
}
