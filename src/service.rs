//! Service facade bundling an engine, a repository and a default strategy.

use crate::backend::CacheBackend;
use crate::engine::QueryEngine;
use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use crate::feed::CacheFeed;
use crate::repository::{CollectionRepository, DataRepository};
use crate::strategy::CacheStrategy;
use std::marker::PhantomData;
use std::sync::Arc;
use std::time::Duration;

/// Cache-backed access to one entity type.
///
/// Cheap to clone; share it across request handlers.
///
/// # Example
///
/// ```ignore
/// let shops = CacheService::new(engine, Arc::new(ShopRepository::new(pool)));
///
/// let shop = shops.query_by_id(&1).await?;   // Err(NotFound) if absent
/// shops.update(&Shop { id: Some(1), name: "Tea House".into() }).await?;
/// ```
pub struct CacheService<T, B, R>
where
    T: CacheEntity,
    B: CacheBackend,
    R: DataRepository<T> + 'static,
{
    engine: QueryEngine<B>,
    repository: Arc<R>,
    strategy: CacheStrategy,
    _entity: PhantomData<fn() -> T>,
}

impl<T, B, R> Clone for CacheService<T, B, R>
where
    T: CacheEntity,
    B: CacheBackend,
    R: DataRepository<T> + 'static,
{
    fn clone(&self) -> Self {
        CacheService {
            engine: self.engine.clone(),
            repository: Arc::clone(&self.repository),
            strategy: self.strategy,
            _entity: PhantomData,
        }
    }
}

impl<T, B, R> CacheService<T, B, R>
where
    T: CacheEntity,
    B: CacheBackend,
    R: DataRepository<T> + 'static,
{
    /// Service using the engine's configured default strategy.
    pub fn new(engine: QueryEngine<B>, repository: Arc<R>) -> Self {
        let strategy = engine.config().default_strategy;
        CacheService {
            engine,
            repository,
            strategy,
            _entity: PhantomData,
        }
    }

    pub fn with_strategy(mut self, strategy: CacheStrategy) -> Self {
        self.strategy = strategy;
        self
    }

    pub fn strategy(&self) -> CacheStrategy {
        self.strategy
    }

    pub fn engine(&self) -> &QueryEngine<B> {
        &self.engine
    }

    pub fn repository(&self) -> &Arc<R> {
        &self.repository
    }

    /// Look up `id`; `Ok(None)` if it does not exist.
    pub async fn find(&self, id: &T::Key) -> Result<Option<T>> {
        self.engine
            .query_by_id::<T, R>(id, &self.repository, self.strategy)
            .await
    }

    /// Look up `id`.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the entity does not exist, plus anything
    /// [`QueryEngine::query_by_id`] returns.
    pub async fn query_by_id(&self, id: &T::Key) -> Result<T> {
        self.find(id)
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::cache_prefix(), id)))
    }

    /// Run the feeder workflow with this service's strategy.
    pub async fn execute<F>(&self, feeder: &mut F) -> Result<()>
    where
        F: CacheFeed<T>,
    {
        self.engine
            .with::<T, F, R>(feeder, &self.repository, self.strategy)
            .await
    }

    /// Write through to the repository and invalidate the cached entry and
    /// list.
    pub async fn update(&self, entity: &T) -> Result<()> {
        self.engine.update::<T, R>(entity, self.repository.as_ref()).await
    }

    /// Insert a new entity; the cache fills on first read.
    ///
    /// The cached list of `T` is dropped, since it no longer holds every row.
    pub async fn create(&self, entity: &T) -> Result<()> {
        self.repository.save(entity).await?;
        self.engine.invalidate_collection::<T>().await?;
        if let Some(id) = entity.cache_key() {
            debug!("✓ Created {} {}", T::cache_prefix(), id);
        }
        Ok(())
    }

    /// Preload `id` for the logical expire strategy.
    ///
    /// Returns `false` if the repository does not have `id`.
    pub async fn warm_up(&self, id: &T::Key, expire_after: Duration) -> Result<bool> {
        self.engine
            .save_with_logical_expire::<T, R>(id, self.repository.as_ref(), expire_after)
            .await
    }
}

impl<T, B, R> CacheService<T, B, R>
where
    T: CacheEntity,
    B: CacheBackend,
    R: DataRepository<T> + CollectionRepository<T> + 'static,
{
    /// Every entity, served from the collection cache.
    ///
    /// # Errors
    ///
    /// `Error::NotFound` if the repository has none.
    pub async fn list_all(&self) -> Result<Vec<T>> {
        self.engine
            .query_all::<T, R>(self.repository.as_ref())
            .await?
            .ok_or_else(|| Error::NotFound(format!("{} list is empty", T::cache_prefix())))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::backend::InMemoryBackend;
    use crate::feed::GenericFeeder;
    use crate::repository::InMemoryRepository;
    use crate::scheduler::RebuildScheduler;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct ShopType {
        id: Option<u32>,
        name: String,
        sort: u32,
    }

    impl CacheEntity for ShopType {
        type Key = u32;

        fn cache_key(&self) -> Option<Self::Key> {
            self.id
        }

        fn cache_prefix() -> &'static str {
            "shop_type"
        }
    }

    fn shop_type(id: u32, name: &str) -> ShopType {
        ShopType {
            id: Some(id),
            name: name.to_string(),
            sort: id,
        }
    }

    type TestService =
        CacheService<ShopType, InMemoryBackend, InMemoryRepository<ShopType>>;

    fn service() -> (TestService, Arc<InMemoryRepository<ShopType>>) {
        let engine = QueryEngine::new(InMemoryBackend::new(), Arc::new(RebuildScheduler::new(2)));
        let repo = Arc::new(InMemoryRepository::new());
        (CacheService::new(engine, Arc::clone(&repo)), repo)
    }

    #[tokio::test]
    async fn test_query_by_id_maps_absence_to_not_found() {
        let (service, repo) = service();
        repo.insert(1, shop_type(1, "food"));

        assert_eq!(
            service.query_by_id(&1).await.expect("Failed to query"),
            shop_type(1, "food")
        );
        assert_eq!(
            service.query_by_id(&7).await,
            Err(Error::NotFound("shop_type 7".to_string()))
        );
        assert_eq!(service.find(&7).await, Ok(None));
    }

    #[tokio::test]
    async fn test_create_then_update() {
        let (service, repo) = service();

        service
            .create(&shop_type(1, "food"))
            .await
            .expect("Failed to create");
        assert_eq!(
            service.query_by_id(&1).await.expect("Failed to query").name,
            "food"
        );

        service
            .update(&shop_type(1, "bars"))
            .await
            .expect("Failed to update");
        assert_eq!(
            service.query_by_id(&1).await.expect("Failed to query").name,
            "bars"
        );
        assert_eq!(repo.fetch_count(), 2);
    }

    #[tokio::test]
    async fn test_warm_up_enables_logical_expire() {
        let (service, repo) = service();
        let service = service.with_strategy(CacheStrategy::LogicalExpire);
        repo.insert(1, shop_type(1, "food"));

        assert_eq!(service.find(&1).await, Ok(None));

        assert!(service
            .warm_up(&1, Duration::from_secs(30))
            .await
            .expect("Failed to warm up"));
        assert!(!service
            .warm_up(&2, Duration::from_secs(30))
            .await
            .expect("Failed to warm up"));

        assert_eq!(
            service.query_by_id(&1).await.expect("Failed to query"),
            shop_type(1, "food")
        );
    }

    #[tokio::test]
    async fn test_execute_feeds_result() {
        let (service, repo) = service();
        repo.insert(3, shop_type(3, "ktv"));

        let mut feeder = GenericFeeder::<ShopType>::new(3);
        service.execute(&mut feeder).await.expect("Failed to execute");

        assert_eq!(feeder.into_found().expect("Not found").name, "ktv");
    }

    #[tokio::test]
    async fn test_list_all() {
        let (service, repo) = service();
        assert!(matches!(service.list_all().await, Err(Error::NotFound(_))));

        repo.insert(2, shop_type(2, "ktv"));
        repo.insert(1, shop_type(1, "food"));

        let names: Vec<_> = service
            .list_all()
            .await
            .expect("Failed to list")
            .into_iter()
            .map(|t| t.name)
            .collect();
        assert_eq!(names, vec!["food", "ktv"]);
    }

    #[tokio::test]
    async fn test_writes_refresh_list() {
        let (service, repo) = service();
        repo.insert(1, shop_type(1, "food"));

        let names = |list: Vec<ShopType>| list.into_iter().map(|t| t.name).collect::<Vec<_>>();

        assert_eq!(
            names(service.list_all().await.expect("Failed to list")),
            vec!["food"]
        );

        service
            .update(&shop_type(1, "bars"))
            .await
            .expect("Failed to update");
        assert_eq!(
            names(service.list_all().await.expect("Failed to list")),
            vec!["bars"]
        );

        service
            .create(&shop_type(2, "ktv"))
            .await
            .expect("Failed to create");
        assert_eq!(
            names(service.list_all().await.expect("Failed to list")),
            vec!["bars", "ktv"]
        );
    }
}
