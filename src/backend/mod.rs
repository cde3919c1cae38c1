//! Cache store adapters.
//!
//! A backend is a narrowed, string-valued view of a key/value store: get,
//! set with TTL, atomic set-if-absent, delete. The query engine's mutual
//! exclusion relies on `set_if_absent` being atomic per key.

use crate::error::Result;
use std::future::Future;
use std::time::Duration;

#[cfg(feature = "inmemory")]
mod inmemory;
#[cfg(feature = "memcached")]
mod memcached;
#[cfg(feature = "redis")]
mod redis;

#[cfg(feature = "inmemory")]
pub use inmemory::InMemoryBackend;
#[cfg(feature = "memcached")]
pub use memcached::{MemcachedBackend, MemcachedConfig};
#[cfg(feature = "redis")]
pub use self::redis::{RedisBackend, RedisConfig};

/// Capability surface the engine needs from a key/value store.
///
/// Implementations must be cheap to clone (a pool or `Arc` handle): the
/// engine hands clones to background rebuild tasks.
///
/// Implementors may write plain `async fn`; the returned futures must be
/// `Send`.
pub trait CacheBackend: Clone + Send + Sync + 'static {
    /// Read `key`. Expired keys read as `None`.
    fn get(&self, key: &str) -> impl Future<Output = Result<Option<String>>> + Send;

    /// Write `key`, replacing any previous value. `None` TTL never expires.
    fn set(
        &self,
        key: &str,
        value: String,
        ttl: Option<Duration>,
    ) -> impl Future<Output = Result<()>> + Send;

    /// Write `key` only if it holds no live value.
    ///
    /// Returns `true` iff this call created the key.
    fn set_if_absent(
        &self,
        key: &str,
        value: String,
        ttl: Duration,
    ) -> impl Future<Output = Result<bool>> + Send;

    /// Remove `key`. Removing a missing key is not an error.
    fn delete(&self, key: &str) -> impl Future<Output = Result<()>> + Send;

    /// Check the store is reachable.
    fn health_check(&self) -> impl Future<Output = Result<bool>> + Send {
        async { Ok(true) }
    }
}
