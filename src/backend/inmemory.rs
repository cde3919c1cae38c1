//! In-memory cache backend built on `DashMap`.

use super::CacheBackend;
use crate::error::Result;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

#[derive(Clone, Debug)]
struct StoredValue {
    value: String,
    expires_at: Option<Instant>,
}

impl StoredValue {
    fn new(value: String, ttl: Option<Duration>) -> Self {
        StoredValue {
            value,
            expires_at: ttl.map(|ttl| Instant::now() + ttl),
        }
    }

    fn is_expired(&self) -> bool {
        self.expires_at
            .map(|deadline| Instant::now() >= deadline)
            .unwrap_or(false)
    }
}

/// Process-local backend for tests, demos and single-instance deployments.
///
/// Clones share the same map. Expired values are invisible to readers and
/// removed lazily.
///
/// # Example
///
/// ```
/// # use cache_shield::backend::{CacheBackend, InMemoryBackend};
/// # async fn example() -> cache_shield::Result<()> {
/// let backend = InMemoryBackend::new();
/// backend.set("cache:shop:1", "{}".to_string(), None).await?;
/// assert!(backend.get("cache:shop:1").await?.is_some());
/// # Ok(())
/// # }
/// ```
#[derive(Clone, Default)]
pub struct InMemoryBackend {
    store: Arc<DashMap<String, StoredValue>>,
}

impl InMemoryBackend {
    pub fn new() -> Self {
        InMemoryBackend {
            store: Arc::new(DashMap::new()),
        }
    }

    /// Number of live keys.
    pub async fn len(&self) -> usize {
        self.store.retain(|_, stored| !stored.is_expired());
        self.store.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    /// Remaining time to live of `key`.
    ///
    /// `None` when the key is missing, expired or has no TTL.
    pub async fn ttl(&self, key: &str) -> Option<Duration> {
        let stored = self.store.get(key)?;
        stored
            .expires_at
            .and_then(|deadline| deadline.checked_duration_since(Instant::now()))
            .filter(|remaining| !remaining.is_zero())
    }

    pub async fn clear(&self) {
        self.store.clear();
        debug!("✓ InMemory CLEAR");
    }
}

impl CacheBackend for InMemoryBackend {
    async fn get(&self, key: &str) -> Result<Option<String>> {
        if let Some(stored) = self.store.get(key) {
            if !stored.is_expired() {
                debug!("✓ InMemory GET {} -> HIT", key);
                return Ok(Some(stored.value.clone()));
            }
        }

        // Drop expired leftovers without racing a concurrent writer.
        self.store.remove_if(key, |_, stored| stored.is_expired());
        debug!("✓ InMemory GET {} -> MISS", key);
        Ok(None)
    }

    async fn set(&self, key: &str, value: String, ttl: Option<Duration>) -> Result<()> {
        self.store
            .insert(key.to_string(), StoredValue::new(value, ttl));

        if let Some(d) = ttl {
            debug!("✓ InMemory SET {} (TTL: {:?})", key, d);
        } else {
            debug!("✓ InMemory SET {}", key);
        }
        Ok(())
    }

    async fn set_if_absent(&self, key: &str, value: String, ttl: Duration) -> Result<bool> {
        let created = match self.store.entry(key.to_string()) {
            Entry::Occupied(mut occupied) => {
                if occupied.get().is_expired() {
                    occupied.insert(StoredValue::new(value, Some(ttl)));
                    true
                } else {
                    false
                }
            }
            Entry::Vacant(vacant) => {
                vacant.insert(StoredValue::new(value, Some(ttl)));
                true
            }
        };

        debug!("✓ InMemory SETNX {} -> {}", key, created);
        Ok(created)
    }

    async fn delete(&self, key: &str) -> Result<()> {
        self.store.remove(key);
        debug!("✓ InMemory DELETE {}", key);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_get_set_delete() {
        let backend = InMemoryBackend::new();

        backend
            .set("k", "v".to_string(), None)
            .await
            .expect("Failed to set");
        assert_eq!(backend.get("k").await.expect("Failed to get"), Some("v".to_string()));
        assert_eq!(backend.len().await, 1);

        backend.delete("k").await.expect("Failed to delete");
        assert_eq!(backend.get("k").await.expect("Failed to get"), None);
        assert!(backend.is_empty().await);

        // Deleting twice is fine
        backend.delete("k").await.expect("Failed to delete");
    }

    #[tokio::test]
    async fn test_expired_values_are_invisible() {
        let backend = InMemoryBackend::new();

        backend
            .set("short", "v".to_string(), Some(Duration::from_millis(30)))
            .await
            .expect("Failed to set");
        assert!(backend.get("short").await.expect("Failed to get").is_some());
        assert!(backend.ttl("short").await.is_some());

        tokio::time::sleep(Duration::from_millis(60)).await;

        assert!(backend.get("short").await.expect("Failed to get").is_none());
        assert!(backend.ttl("short").await.is_none());
        assert_eq!(backend.len().await, 0);
    }

    #[tokio::test]
    async fn test_set_if_absent_is_exclusive() {
        let backend = InMemoryBackend::new();
        let ttl = Duration::from_secs(10);

        assert!(backend
            .set_if_absent("lock", "1".to_string(), ttl)
            .await
            .expect("Failed to setnx"));
        assert!(!backend
            .set_if_absent("lock", "1".to_string(), ttl)
            .await
            .expect("Failed to setnx"));

        backend.delete("lock").await.expect("Failed to delete");
        assert!(backend
            .set_if_absent("lock", "1".to_string(), ttl)
            .await
            .expect("Failed to setnx"));
    }

    #[tokio::test]
    async fn test_set_if_absent_reclaims_expired_key() {
        let backend = InMemoryBackend::new();

        assert!(backend
            .set_if_absent("lock", "1".to_string(), Duration::from_millis(20))
            .await
            .expect("Failed to setnx"));

        tokio::time::sleep(Duration::from_millis(40)).await;

        assert!(backend
            .set_if_absent("lock", "1".to_string(), Duration::from_secs(10))
            .await
            .expect("Failed to setnx"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_set_if_absent_has_one_winner() {
        let backend = InMemoryBackend::new();

        let mut handles = Vec::new();
        for _ in 0..32 {
            let backend = backend.clone();
            handles.push(tokio::spawn(async move {
                backend
                    .set_if_absent("lock", "1".to_string(), Duration::from_secs(10))
                    .await
                    .expect("Failed to setnx")
            }));
        }

        let mut winners = 0;
        for handle in handles {
            if handle.await.expect("Task panicked") {
                winners += 1;
            }
        }
        assert_eq!(winners, 1);
    }

    #[tokio::test]
    async fn test_clones_share_state() {
        let backend = InMemoryBackend::new();
        let clone = backend.clone();

        clone
            .set("shared", "v".to_string(), None)
            .await
            .expect("Failed to set");
        assert!(backend.get("shared").await.expect("Failed to get").is_some());

        backend.clear().await;
        assert!(clone.is_empty().await);
    }
}
