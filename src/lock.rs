//! Advisory mutual exclusion over a cache backend.
//!
//! A lock is a short-lived key written with set-if-absent. Holders delete it
//! when done; the TTL frees it if a holder dies first.

use crate::backend::CacheBackend;
use crate::error::{Error, Result};
use crate::key::LockKey;
use futures::FutureExt;
use std::future::Future;
use std::panic::{resume_unwind, AssertUnwindSafe};
use std::time::Duration;

/// Default lock TTL; bounds how long a crashed holder blocks rebuilds.
pub const DEFAULT_LOCK_TTL: Duration = Duration::from_secs(10);

const LOCK_TOKEN: &str = "1";

/// Distributed lock keyed by [`LockKey`].
///
/// Holds no state of its own; clones and separate processes sharing the
/// backend contend on the same keys.
#[derive(Clone)]
pub struct DistributedLock<B: CacheBackend> {
    backend: B,
    ttl: Duration,
}

impl<B: CacheBackend> DistributedLock<B> {
    pub fn new(backend: B, ttl: Duration) -> Self {
        DistributedLock { backend, ttl }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Try to take the lock. `true` iff this call created the lock key.
    pub async fn try_acquire(&self, key: &LockKey) -> Result<bool> {
        let acquired = self
            .backend
            .set_if_absent(key.as_str(), LOCK_TOKEN.to_string(), self.ttl)
            .await?;

        if acquired {
            debug!("✓ Lock acquired: {}", key);
        } else {
            debug!("✗ Lock busy: {}", key);
        }
        Ok(acquired)
    }

    /// Delete the lock key.
    ///
    /// Unconditional: if the TTL already expired and someone else took the
    /// lock, theirs is released too.
    pub async fn release(&self, key: &LockKey) -> Result<()> {
        self.backend.delete(key.as_str()).await?;
        debug!("✓ Lock released: {}", key);
        Ok(())
    }

    /// Acquire `key`, run `body`, release.
    ///
    /// # Errors
    ///
    /// - `Error::LockContention` if the lock is held elsewhere (`body` is not run)
    /// - whatever `body` or the release returns
    pub async fn run_exclusive<F, Fut, R>(&self, key: &LockKey, body: F) -> Result<R>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<R>>,
    {
        if !self.try_acquire(key).await? {
            return Err(Error::LockContention(key.to_string()));
        }
        self.run_locked(key, body()).await
    }

    /// Run `body` under a lock the caller already holds, then release it.
    ///
    /// Release happens whether `body` succeeds, fails or panics; a panic is
    /// resumed afterwards. A failed release is logged and only reported when
    /// `body` itself succeeded; the TTL frees the key eventually.
    pub async fn run_locked<Fut, R>(&self, key: &LockKey, body: Fut) -> Result<R>
    where
        Fut: Future<Output = Result<R>>,
    {
        let outcome = AssertUnwindSafe(body).catch_unwind().await;
        let released = self.release(key).await;

        if let Err(e) = &released {
            warn!("Failed to release lock {}: {} (expires in {:?})", key, e, self.ttl);
        }

        match outcome {
            Ok(result) => {
                let value = result?;
                released?;
                Ok(value)
            }
            Err(panic) => resume_unwind(panic),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::key::CacheKeyBuilder;
    use crate::CacheEntity;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Serialize, Deserialize)]
    struct Shop {
        id: Option<u64>,
    }

    impl CacheEntity for Shop {
        type Key = u64;

        fn cache_key(&self) -> Option<Self::Key> {
            self.id
        }

        fn cache_prefix() -> &'static str {
            "shop"
        }
    }

    fn lock() -> (DistributedLock<InMemoryBackend>, InMemoryBackend) {
        let backend = InMemoryBackend::new();
        (DistributedLock::new(backend.clone(), DEFAULT_LOCK_TTL), backend)
    }

    #[tokio::test]
    async fn test_acquire_is_exclusive_until_release() {
        let (lock, backend) = lock();
        let key = CacheKeyBuilder::lock_key::<Shop>(&1);

        assert!(lock.try_acquire(&key).await.expect("Failed to acquire"));
        assert!(!lock.try_acquire(&key).await.expect("Failed to acquire"));
        assert!(backend.ttl(key.as_str()).await.is_some());

        lock.release(&key).await.expect("Failed to release");
        assert!(lock.try_acquire(&key).await.expect("Failed to acquire"));
    }

    #[tokio::test]
    async fn test_locks_for_different_ids_are_independent() {
        let (lock, _) = lock();

        assert!(lock
            .try_acquire(&CacheKeyBuilder::lock_key::<Shop>(&1))
            .await
            .expect("Failed to acquire"));
        assert!(lock
            .try_acquire(&CacheKeyBuilder::lock_key::<Shop>(&2))
            .await
            .expect("Failed to acquire"));
    }

    #[tokio::test]
    async fn test_ttl_frees_abandoned_lock() {
        let backend = InMemoryBackend::new();
        let lock = DistributedLock::new(backend, Duration::from_millis(30));
        let key = CacheKeyBuilder::lock_key::<Shop>(&1);

        assert!(lock.try_acquire(&key).await.expect("Failed to acquire"));
        tokio::time::sleep(Duration::from_millis(60)).await;
        assert!(lock.try_acquire(&key).await.expect("Failed to acquire"));
    }

    #[tokio::test]
    async fn test_run_exclusive_releases_after_success() {
        let (lock, backend) = lock();
        let key = CacheKeyBuilder::lock_key::<Shop>(&1);

        let value = lock
            .run_exclusive(&key, || async { Ok(42) })
            .await
            .expect("Failed to run");

        assert_eq!(value, 42);
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_exclusive_releases_after_error() {
        let (lock, backend) = lock();
        let key = CacheKeyBuilder::lock_key::<Shop>(&1);

        let result: Result<()> = lock
            .run_exclusive(&key, || async {
                Err(Error::RepositoryError("db down".to_string()))
            })
            .await;

        assert_eq!(result, Err(Error::RepositoryError("db down".to_string())));
        assert!(backend.is_empty().await);
    }

    #[tokio::test]
    async fn test_run_exclusive_reports_contention() {
        let (lock, _) = lock();
        let key = CacheKeyBuilder::lock_key::<Shop>(&1);
        assert!(lock.try_acquire(&key).await.expect("Failed to acquire"));

        let mut ran = false;
        let result = lock
            .run_exclusive(&key, || {
                ran = true;
                async { Ok(()) }
            })
            .await;

        assert!(matches!(result, Err(Error::LockContention(_))));
        assert!(!ran);
    }

    #[tokio::test]
    async fn test_run_locked_releases_on_panic() {
        let (lock, backend) = lock();
        let key = CacheKeyBuilder::lock_key::<Shop>(&1);
        assert!(lock.try_acquire(&key).await.expect("Failed to acquire"));

        let task_lock = lock.clone();
        let task_key = key.clone();
        let handle = tokio::spawn(async move {
            task_lock
                .run_locked::<_, ()>(&task_key, async { panic!("rebuild exploded") })
                .await
        });

        let joined = handle.await;
        assert!(joined.is_err_and(|e| e.is_panic()));
        assert!(backend.is_empty().await);
    }
}
