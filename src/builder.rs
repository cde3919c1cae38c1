//! Builder for single queries with per-call overrides.

use crate::backend::CacheBackend;
use crate::engine::QueryEngine;
use crate::entity::CacheEntity;
use crate::error::Result;
use crate::repository::DataRepository;
use crate::strategy::CacheStrategy;
use std::sync::Arc;
use std::time::Duration;

/// Fluent builder for one query.
///
/// Starts from the engine's configured default strategy. Created with
/// [`QueryEngine::builder`].
///
/// # Example
///
/// ```ignore
/// use cache_shield::CacheStrategy;
/// use std::time::Duration;
///
/// let shop = engine
///     .builder::<Shop>(1)
///     .with_strategy(CacheStrategy::Mutex)
///     .with_ttl(Duration::from_secs(300))
///     .with_retry(3)
///     .execute(&repository)
///     .await?;
/// ```
pub struct QueryBuilder<'a, B: CacheBackend, T: CacheEntity> {
    engine: &'a QueryEngine<B>,
    id: T::Key,
    strategy: CacheStrategy,
    ttl_override: Option<Duration>,
    retry_count: u32,
}

impl<'a, B: CacheBackend, T: CacheEntity> QueryBuilder<'a, B, T> {
    pub(crate) fn new(engine: &'a QueryEngine<B>, id: T::Key) -> Self {
        Self {
            strategy: engine.config().default_strategy,
            engine,
            id,
            ttl_override: None,
            retry_count: 0,
        }
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    /// Override the TTL for this query.
    ///
    /// For `PassThrough` and `Mutex` this is the store TTL of a freshly
    /// loaded entry; for `LogicalExpire` it is the logical window of a
    /// rebuild it schedules. Null markers keep the configured null TTL.
    pub fn with_ttl(mut self, ttl: Duration) -> Self {
        self.ttl_override = Some(ttl);
        self
    }

    /// Retry up to `count` more times on retryable errors.
    ///
    /// # Example
    ///
    /// ```ignore
    /// builder.with_retry(3)  // Up to 4 attempts in total
    /// ```
    pub fn with_retry(mut self, count: u32) -> Self {
        self.retry_count = count;
        self
    }

    /// Run the query.
    ///
    /// # Errors
    ///
    /// Same as [`QueryEngine::query_by_id`]. Only errors for which
    /// `Error::is_retryable` holds are retried, with exponential backoff
    /// starting at 100ms; the last error is returned.
    pub async fn execute<R>(self, repository: &Arc<R>) -> Result<Option<T>>
    where
        R: DataRepository<T> + 'static,
    {
        let mut attempts = 0;
        let max_attempts = self.retry_count + 1;

        loop {
            attempts += 1;

            match self
                .engine
                .query_with_options::<T, R>(&self.id, repository, self.strategy, self.ttl_override)
                .await
            {
                Ok(found) => return Ok(found),
                Err(e) => {
                    if attempts >= max_attempts || !e.is_retryable() {
                        return Err(e);
                    }

                    debug!(
                        "Cache query failed (attempt {}/{}): {}, retrying...",
                        attempts, max_attempts, e
                    );

                    let delay = Duration::from_millis(100 * 2_u64.pow(attempts - 1));
                    tokio::time::sleep(delay).await;
                }
            }
        }
    }
}
