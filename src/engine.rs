//! Cache-aside query engine - main entry point for cache operations.

use crate::backend::CacheBackend;
use crate::builder::QueryBuilder;
use crate::config::CacheConfig;
use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::feed::CacheFeed;
use crate::key::CacheKeyBuilder;
use crate::lock::DistributedLock;
use crate::observability::{CacheMetrics, NoOpMetrics, TtlPolicy};
use crate::repository::{CollectionRepository, DataRepository};
use crate::scheduler::RebuildScheduler;
use crate::serialization::{self, CacheEntry};
use crate::strategy::CacheStrategy;
use std::sync::Arc;
use std::time::{Duration, Instant, SystemTime};

/// What a cache read found.
enum Cached<T> {
    Hit(T),
    /// Null marker: the backing store is known not to have the id.
    Null,
    Miss,
}

/// Cache-aside query engine.
///
/// Reads go cache first and fall back to a [`DataRepository`] according to a
/// [`CacheStrategy`]; writes go to the repository and invalidate the cache.
/// Cloning is cheap and clones share the backend, scheduler and metrics.
///
/// # Example
///
/// ```ignore
/// use cache_shield::{QueryEngine, backend::InMemoryBackend, scheduler::RebuildScheduler};
/// use std::sync::Arc;
///
/// let scheduler = Arc::new(RebuildScheduler::new(10));
/// let engine = QueryEngine::new(InMemoryBackend::new(), scheduler);
///
/// let shop = engine
///     .query_by_id::<Shop, _>(&1, &repository, CacheStrategy::Mutex)
///     .await?;
/// ```
#[derive(Clone)]
pub struct QueryEngine<B: CacheBackend> {
    backend: B,
    lock: DistributedLock<B>,
    scheduler: Arc<RebuildScheduler>,
    metrics: Arc<dyn CacheMetrics>,
    pub(crate) ttl_policy: TtlPolicy,
    config: CacheConfig,
}

impl<B: CacheBackend> QueryEngine<B> {
    /// Create new engine with default configuration.
    pub fn new(backend: B, scheduler: Arc<RebuildScheduler>) -> Self {
        Self::with_config(backend, scheduler, CacheConfig::default())
    }

    /// Create new engine; the entry TTL of `config` becomes a fixed TTL policy.
    pub fn with_config(backend: B, scheduler: Arc<RebuildScheduler>, config: CacheConfig) -> Self {
        QueryEngine {
            lock: DistributedLock::new(backend.clone(), config.lock_ttl),
            backend,
            scheduler,
            metrics: Arc::new(NoOpMetrics),
            ttl_policy: TtlPolicy::Fixed(config.entry_ttl),
            config,
        }
    }

    /// Set custom metrics handler.
    pub fn with_metrics(mut self, metrics: Arc<dyn CacheMetrics>) -> Self {
        self.metrics = metrics;
        self
    }

    /// Set custom TTL policy.
    pub fn with_ttl_policy(mut self, policy: TtlPolicy) -> Self {
        self.ttl_policy = policy;
        self
    }

    /// Create a builder for a single query with per-call overrides.
    ///
    /// # Example
    ///
    /// ```ignore
    /// let shop = engine
    ///     .builder::<Shop>(1)
    ///     .with_strategy(CacheStrategy::PassThrough)
    ///     .with_ttl(Duration::from_secs(300))
    ///     .with_retry(3)
    ///     .execute(&repository)
    ///     .await?;
    /// ```
    pub fn builder<T: CacheEntity>(&self, id: T::Key) -> QueryBuilder<'_, B, T> {
        QueryBuilder::new(self, id)
    }

    /// Look up `id` with the given strategy.
    ///
    /// `Ok(None)` means the entity does not exist (or, for
    /// `LogicalExpire`, that the cache was never warmed for it).
    ///
    /// # Errors
    ///
    /// - `Error::MalformedEntry`: cached value does not decode
    /// - `Error::StoreUnavailable`: cache store failure, or the rebuild lock
    ///   stayed busy for `lock_max_attempts` attempts (`Mutex`)
    /// - `Error::RepositoryError`: backing store failure
    /// - `Error::SerializationError`: loaded entity cannot be encoded
    /// - any error from `CacheEntity::validate`
    pub async fn query_by_id<T, R>(
        &self,
        id: &T::Key,
        repository: &Arc<R>,
        strategy: CacheStrategy,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T> + 'static,
    {
        self.query_with_options(id, repository, strategy, None).await
    }

    pub(crate) async fn query_with_options<T, R>(
        &self,
        id: &T::Key,
        repository: &Arc<R>,
        strategy: CacheStrategy,
        ttl_override: Option<Duration>,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T> + 'static,
    {
        let timer = Instant::now();
        let cache_key = CacheKeyBuilder::build::<T>(id);

        debug!(
            "» Cache query for key: {} (strategy: {})",
            cache_key, strategy
        );

        let result = match strategy {
            CacheStrategy::PassThrough => {
                let ttl = ttl_override.unwrap_or_else(|| self.entry_ttl::<T>());
                self.pass_through::<T, R>(id, &cache_key, repository.as_ref(), ttl)
                    .await
            }
            CacheStrategy::Mutex => {
                let ttl = ttl_override.unwrap_or_else(|| self.entry_ttl::<T>());
                self.mutex::<T, R>(id, &cache_key, repository.as_ref(), ttl).await
            }
            CacheStrategy::LogicalExpire => {
                let window = ttl_override.unwrap_or(self.config.logical_ttl);
                self.logical_expire::<T, R>(id, &cache_key, repository, window)
                    .await
            }
        };

        match result {
            Ok(Some(entity)) => {
                entity.validate()?;
                debug!("✓ Cache query for {} served in {:?}", cache_key, timer.elapsed());
                Ok(Some(entity))
            }
            Ok(None) => {
                self.metrics.record_miss(&cache_key, timer.elapsed());
                debug!("Entity not found for {}", cache_key);
                Ok(None)
            }
            Err(e) => {
                self.metrics.record_error(&cache_key, &e.to_string());
                Err(e)
            }
        }
    }

    /// Feeder-driven query: validates the feeder, runs the query and feeds
    /// the result through the feeder's hooks.
    ///
    /// # Example
    /// ```ignore
    /// let mut feeder = ShopFeeder { id: 1, shop: None };
    /// engine.with(&mut feeder, &repository, CacheStrategy::Mutex).await?;
    /// let shop = feeder.shop;
    /// ```
    pub async fn with<T, F, R>(
        &self,
        feeder: &mut F,
        repository: &Arc<R>,
        strategy: CacheStrategy,
    ) -> Result<()>
    where
        T: CacheEntity,
        F: CacheFeed<T>,
        R: DataRepository<T> + 'static,
    {
        feeder.validate()?;

        let id = feeder.entity_id();
        let cache_key = CacheKeyBuilder::build::<T>(&id);

        match self.query_by_id::<T, R>(&id, repository, strategy).await? {
            Some(entity) => {
                feeder.on_hit(&cache_key)?;
                feeder.on_loaded(&entity)?;
                feeder.feed(Some(entity));
            }
            None => {
                feeder.on_miss(&cache_key)?;
                feeder.feed(None);
            }
        }

        Ok(())
    }

    /// Read-through with null markers against penetration.
    pub async fn query_with_pass_through<T, R>(&self, id: &T::Key, repository: &R) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let cache_key = CacheKeyBuilder::build::<T>(id);
        self.pass_through::<T, R>(id, &cache_key, repository, self.entry_ttl::<T>())
            .await
    }

    /// Read-through where only the lock holder loads from the backing store.
    pub async fn query_with_mutex<T, R>(&self, id: &T::Key, repository: &R) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let cache_key = CacheKeyBuilder::build::<T>(id);
        self.mutex::<T, R>(id, &cache_key, repository, self.entry_ttl::<T>())
            .await
    }

    /// Serve cached data even when logically expired; refresh it in the
    /// background.
    pub async fn query_with_logical_expire<T, R>(
        &self,
        id: &T::Key,
        repository: &Arc<R>,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T> + 'static,
    {
        let cache_key = CacheKeyBuilder::build::<T>(id);
        self.logical_expire::<T, R>(id, &cache_key, repository, self.config.logical_ttl)
            .await
    }

    async fn pass_through<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        match self.read_cached::<T>(cache_key).await? {
            Cached::Hit(entity) => Ok(Some(entity)),
            Cached::Null => Ok(None),
            Cached::Miss => {
                debug!("Cache miss, falling back to backing store");
                self.load_and_populate::<T, R>(id, cache_key, repository, ttl).await
            }
        }
    }

    async fn mutex<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let lock_key = CacheKeyBuilder::lock_key::<T>(id);
        let max_attempts = self.config.lock_max_attempts;

        for attempt in 1..=max_attempts {
            match self.read_cached::<T>(cache_key).await? {
                Cached::Hit(entity) => return Ok(Some(entity)),
                Cached::Null => return Ok(None),
                Cached::Miss => {}
            }

            let rebuilt = self
                .lock
                .run_exclusive(&lock_key, move || async move {
                    // Another holder may have filled the key since our miss.
                    match self.read_cached::<T>(cache_key).await? {
                        Cached::Hit(entity) => Ok(Some(entity)),
                        Cached::Null => Ok(None),
                        Cached::Miss => {
                            self.load_and_populate::<T, R>(id, cache_key, repository, ttl)
                                .await
                        }
                    }
                })
                .await;

            match rebuilt {
                Err(Error::LockContention(_)) => {
                    self.metrics.record_lock_contention(cache_key);
                    debug!(
                        "✗ Rebuild lock busy for {} (attempt {}/{}), retrying...",
                        cache_key, attempt, max_attempts
                    );
                    tokio::time::sleep(self.config.lock_retry_backoff).await;
                }
                other => return other,
            }
        }

        Err(Error::StoreUnavailable(format!(
            "rebuild lock for {} still held after {} attempts",
            cache_key, max_attempts
        )))
    }

    async fn logical_expire<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &Arc<R>,
        window: Duration,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T> + 'static,
    {
        let timer = Instant::now();
        let raw = match self.backend.get(cache_key).await? {
            Some(raw) if !serialization::is_null_marker(&raw) => raw,
            _ => {
                debug!("✗ Cache miss (logical expire) - entry not warmed");
                return Ok(None);
            }
        };

        let entry = CacheEntry::<T>::decode_with_expiry(&raw).map_err(|e| {
            warn!("✗ Malformed cache entry at {}: {}", cache_key, e);
            e
        })?;

        if entry.is_live_at(SystemTime::now()) {
            debug!("✓ Cache hit (logical expire)");
            self.metrics.record_hit(cache_key, timer.elapsed());
            return Ok(Some(entry.data));
        }

        self.metrics.record_stale(cache_key);
        let lock_key = CacheKeyBuilder::lock_key::<T>(id);

        if self.lock.try_acquire(&lock_key).await? {
            let engine = self.clone();
            let repository = Arc::clone(repository);
            let id = id.clone();
            let task_lock_key = lock_key.clone();

            let submitted = self.scheduler.submit(async move {
                let rebuild = engine.save_with_logical_expire::<T, R>(&id, repository.as_ref(), window);
                engine.lock.run_locked(&task_lock_key, rebuild).await.map(|_| ())
            });

            match submitted {
                Ok(()) => {
                    self.metrics.record_rebuild_scheduled(cache_key);
                    debug!("» Stale entry {} served, rebuild scheduled", cache_key);
                }
                Err(e) => {
                    warn!("Could not schedule rebuild for {}: {}", cache_key, e);
                    if let Err(release_err) = self.lock.release(&lock_key).await {
                        warn!("Failed to release lock {}: {}", lock_key, release_err);
                    }
                }
            }
        } else {
            self.metrics.record_lock_contention(cache_key);
            debug!("» Stale entry {} served, rebuild already in flight", cache_key);
        }

        Ok(Some(entry.data))
    }

    /// Load `id` from the backing store and cache it with a logical expiry
    /// `expire_after` from now, without a store TTL.
    ///
    /// This is the warm-up step the `LogicalExpire` strategy relies on, and
    /// the body of every background rebuild. Returns `false` (and drops any
    /// cached entry) if the backing store no longer has `id`.
    pub async fn save_with_logical_expire<T, R>(
        &self,
        id: &T::Key,
        repository: &R,
        expire_after: Duration,
    ) -> Result<bool>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let cache_key = CacheKeyBuilder::build::<T>(id);

        match repository.fetch_by_id(id).await? {
            Some(entity) => {
                let expiry = SystemTime::now() + expire_after;
                let raw = entity.encode_for_cache(Some(expiry))?;
                self.backend.set(&cache_key, raw, None).await?;
                debug!(
                    "✓ Cache rebuilt for {} (logically fresh for {:?})",
                    cache_key, expire_after
                );
                Ok(true)
            }
            None => {
                self.backend.delete(&cache_key).await?;
                debug!("✗ {} gone from backing store, cache entry dropped", cache_key);
                Ok(false)
            }
        }
    }

    /// Write `entity` to the backing store, then drop its cache entry and
    /// the cached collection of `T`.
    ///
    /// The next read repopulates the cache.
    ///
    /// # Errors
    ///
    /// - `Error::InvalidArgument`: entity has no id (nothing is written)
    /// - errors from the repository write or the cache delete
    pub async fn update<T, R>(&self, entity: &T, repository: &R) -> Result<()>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let id = entity.cache_key().ok_or_else(|| {
            Error::InvalidArgument(format!("{} id must not be empty", T::cache_prefix()))
        })?;

        repository.update_by_id(entity).await?;
        self.invalidate::<T>(&id).await?;
        self.invalidate_collection::<T>().await
    }

    /// Drop the cache entry for `id`.
    pub async fn invalidate<T: CacheEntity>(&self, id: &T::Key) -> Result<()> {
        let cache_key = CacheKeyBuilder::build::<T>(id);
        self.backend.delete(&cache_key).await?;
        debug!("✓ Cache invalidated for {}", cache_key);
        Ok(())
    }

    /// Cached list of every `T`.
    ///
    /// `Ok(None)` if the backing store has no rows; empty lists are not
    /// cached.
    pub async fn query_all<T, R>(&self, repository: &R) -> Result<Option<Vec<T>>>
    where
        T: CacheEntity,
        R: CollectionRepository<T>,
    {
        let timer = Instant::now();
        let cache_key = CacheKeyBuilder::collection::<T>();

        if let Some(raw) = self.backend.get(&cache_key).await? {
            if !serialization::is_null_marker(&raw) {
                debug!("✓ Cache hit for collection {}", cache_key);
                let entities = serialization::decode::<Vec<T>>(&raw)?;
                self.metrics.record_hit(&cache_key, timer.elapsed());
                return Ok(Some(entities));
            }
        }

        let entities = repository.fetch_all().await?;
        if entities.is_empty() {
            debug!("✗ Collection {} is empty in backing store", cache_key);
            return Ok(None);
        }

        let raw = serialization::encode(&entities, None)?;
        self.backend
            .set(&cache_key, raw, Some(self.entry_ttl::<T>()))
            .await?;
        self.metrics.record_load(&cache_key, timer.elapsed());
        debug!("✓ Collection {} cached ({} items)", cache_key, entities.len());
        Ok(Some(entities))
    }

    /// Drop the cached list of every `T`.
    pub async fn invalidate_collection<T: CacheEntity>(&self) -> Result<()> {
        self.backend
            .delete(&CacheKeyBuilder::collection::<T>())
            .await
    }

    async fn read_cached<T: CacheEntity>(&self, cache_key: &str) -> Result<Cached<T>> {
        let timer = Instant::now();
        match self.backend.get(cache_key).await? {
            None => Ok(Cached::Miss),
            Some(raw) if serialization::is_null_marker(&raw) => {
                debug!("✓ Null marker hit for {}", cache_key);
                self.metrics.record_null_hit(cache_key);
                Ok(Cached::Null)
            }
            Some(raw) => {
                let entity = T::decode_from_cache(&raw).map_err(|e| {
                    warn!("✗ Malformed cache entry at {}: {}", cache_key, e);
                    e
                })?;
                debug!("✓ Cache hit for {}", cache_key);
                self.metrics.record_hit(cache_key, timer.elapsed());
                Ok(Cached::Hit(entity))
            }
        }
    }

    async fn load_and_populate<T, R>(
        &self,
        id: &T::Key,
        cache_key: &str,
        repository: &R,
        ttl: Duration,
    ) -> Result<Option<T>>
    where
        T: CacheEntity,
        R: DataRepository<T>,
    {
        let timer = Instant::now();
        match repository.fetch_by_id(id).await? {
            Some(entity) => {
                let raw = entity.encode_for_cache(None)?;
                self.backend.set(cache_key, raw, Some(ttl)).await?;
                self.metrics.record_load(cache_key, timer.elapsed());
                Ok(Some(entity))
            }
            None => {
                self.backend
                    .set(
                        cache_key,
                        serialization::encode_null_marker(),
                        Some(self.config.null_ttl),
                    )
                    .await?;
                debug!("✗ {} absent from backing store, null marker cached", cache_key);
                Ok(None)
            }
        }
    }

    fn entry_ttl<T: CacheEntity>(&self) -> Duration {
        self.ttl_policy.get_ttl(T::cache_prefix())
    }

    /// Get backend reference (for advanced use).
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn lock(&self) -> &DistributedLock<B> {
        &self.lock
    }

    pub fn scheduler(&self) -> &Arc<RebuildScheduler> {
        &self.scheduler
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}
