//! Memcached cache backend implementation.

use super::CacheBackend;
use crate::error::{Error, Result};
use async_memcached::AsciiProtocol;
use deadpool_memcached::{Manager, Pool};
use std::time::Duration;

/// Default Memcached connection pool size.
/// Override with MEMCACHED_POOL_SIZE environment variable
const DEFAULT_POOL_SIZE: u32 = 16;

/// Configuration for Memcached backend.
#[derive(Clone, Debug)]
pub struct MemcachedConfig {
    pub servers: Vec<String>, // e.g., ["localhost:11211", "cache2:11211"]
    pub connection_timeout: Duration,
    pub pool_size: u32,
}

impl Default for MemcachedConfig {
    fn default() -> Self {
        MemcachedConfig {
            servers: vec!["localhost:11211".to_string()],
            connection_timeout: Duration::from_secs(5),
            pool_size: 10,
        }
    }
}

/// Memcached backend with connection pooling.
///
/// Set-if-absent maps to Memcached's `add`, which is atomic on the server.
/// TTLs are rounded up to whole seconds.
///
/// # Example
///
/// ```no_run
/// # use cache_shield::backend::{MemcachedBackend, MemcachedConfig, CacheBackend};
/// # use cache_shield::error::Result;
/// # async fn example() -> Result<()> {
/// let config = MemcachedConfig {
///     servers: vec!["localhost:11211".to_string()],
///     ..Default::default()
/// };
///
/// let backend = MemcachedBackend::new(config).await?;
/// backend.set("key", "value".to_string(), None).await?;
/// let value = backend.get("key").await?;
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct MemcachedBackend {
    pool: Pool,
}

impl MemcachedBackend {
    /// Create new Memcached backend from configuration.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn new(config: MemcachedConfig) -> Result<Self> {
        // deadpool-memcached Manager takes a single server address
        let addr = config
            .servers
            .first()
            .ok_or_else(|| Error::ConfigError("No memcached servers specified".to_string()))?
            .clone();

        let manager = Manager::new(addr.clone());

        let pool = Pool::builder(manager)
            .max_size(config.pool_size as usize)
            .build()
            .map_err(|e| Error::ConfigError(format!("Failed to create connection pool: {}", e)))?;

        info!(
            "✓ Memcached backend initialized with server: {} (pool size: {})",
            addr, config.pool_size
        );

        Ok(MemcachedBackend { pool })
    }

    /// Create from server address directly.
    ///
    /// Pool size comes from `MEMCACHED_POOL_SIZE` if set, else `DEFAULT_POOL_SIZE`.
    ///
    /// # Errors
    /// Returns `Err` if connection pool creation fails
    pub async fn from_server(addr: String) -> Result<Self> {
        let pool_size = std::env::var("MEMCACHED_POOL_SIZE")
            .ok()
            .and_then(|s| s.parse::<u32>().ok())
            .unwrap_or(DEFAULT_POOL_SIZE);

        let config = MemcachedConfig {
            servers: vec![addr],
            pool_size,
            ..Default::default()
        };
        Self::new(config).await
    }
}

/// Memcached expirations are whole seconds; never round a TTL down to 0,
/// which would mean "no expiry".
fn expiration_secs(ttl: Duration) -> i64 {
    let secs = ttl.as_secs() + u64::from(ttl.subsec_nanos() > 0);
    secs.max(1) as i64
}

impl CacheBackend for MemcachedBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Memcached connection: {}", e))
        })?;

        match conn.get(key).await {
            Ok(Some(value)) => {
                debug!("✓ Memcached GET {} -> HIT", key);
                value
                    .data
                    .map(|bytes| {
                        String::from_utf8(bytes).map_err(|e| {
                            Error::MalformedEntry(format!("Non UTF-8 value at {}: {}", key, e))
                        })
                    })
                    .transpose()
            }
            Ok(None) => {
                debug!("✓ Memcached GET {} -> MISS", key);
                Ok(None)
            }
            Err(e) => Err(Error::StoreUnavailable(format!(
                "Memcached GET failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Memcached connection: {}", e))
        })?;

        let expiration = ttl.map(expiration_secs);

        // Parameter order: set(key, value, ttl, flags)
        conn.set(key, value.as_bytes(), expiration, None)
            .await
            .map_err(|e| {
                Error::StoreUnavailable(format!("Memcached SET failed for key {}: {}", key, e))
            })?;

        if let Some(d) = ttl {
            debug!("✓ Memcached SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ Memcached SET {}", key);
        }

        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Memcached connection: {}", e))
        })?;

        match conn
            .add(key, value.as_bytes(), Some(expiration_secs(ttl)), None)
            .await
        {
            Ok(()) => {
                debug!("✓ Memcached ADD {} -> stored", key);
                Ok(true)
            }
            Err(async_memcached::Error::Protocol(async_memcached::Status::NotStored)) => {
                debug!("✓ Memcached ADD {} -> exists", key);
                Ok(false)
            }
            Err(e) => Err(Error::StoreUnavailable(format!(
                "Memcached ADD failed for key {}: {}",
                key, e
            ))),
        }
    }

    async fn delete(&self, key: &str) -> Result<()> {
        let mut conn = self.pool.get().await.map_err(|e| {
            Error::StoreUnavailable(format!("Failed to get Memcached connection: {}", e))
        })?;

        match conn.delete(key).await {
            Ok(()) => {}
            Err(async_memcached::Error::Protocol(async_memcached::Status::NotFound)) => {}
            Err(e) => {
                return Err(Error::StoreUnavailable(format!(
                    "Memcached DELETE failed for key {}: {}",
                    key, e
                )))
            }
        }

        debug!("✓ Memcached DELETE {}", key);
        Ok(())
    }

    async fn health_check(&self) -> Result<bool> {
        match self.pool.get().await {
            Ok(mut conn) => match conn.get("__health_check__").await {
                Ok(_) => Ok(true),
                Err(_) => Ok(false),
            },
            Err(_) => Ok(false),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memcached_config_default() {
        let config = MemcachedConfig::default();
        assert_eq!(config.servers.len(), 1);
        assert_eq!(config.servers[0], "localhost:11211");
        assert_eq!(config.pool_size, 10);
    }

    #[test]
    fn test_expiration_rounds_up() {
        assert_eq!(expiration_secs(Duration::from_secs(10)), 10);
        assert_eq!(expiration_secs(Duration::from_millis(1500)), 2);
        assert_eq!(expiration_secs(Duration::from_millis(50)), 1);
        assert_eq!(expiration_secs(Duration::ZERO), 1);
    }
}
