//! Backing store abstraction.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};
use dashmap::DashMap;
use std::future::Future;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

/// The slow, authoritative store the cache protects.
///
/// `fetch_by_id` returning `Ok(None)` means the entity does not exist; it is
/// not an error. Implementors may write plain `async fn`.
///
/// # Example
///
/// ```ignore
/// impl DataRepository<Shop> for ShopRepository {
///     async fn fetch_by_id(&self, id: &u64) -> cache_shield::Result<Option<Shop>> {
///         sqlx::query_as("SELECT * FROM tb_shop WHERE id = $1")
///             .bind(*id as i64)
///             .fetch_optional(&self.pool)
///             .await
///             .map_err(|e| cache_shield::Error::RepositoryError(e.to_string()))
///     }
///
///     async fn save(&self, shop: &Shop) -> cache_shield::Result<()> { /* INSERT */ }
///     async fn update_by_id(&self, shop: &Shop) -> cache_shield::Result<()> { /* UPDATE */ }
/// }
/// ```
pub trait DataRepository<T: CacheEntity>: Send + Sync {
    fn fetch_by_id(&self, id: &T::Key) -> impl Future<Output = Result<Option<T>>> + Send;

    /// Insert a new entity.
    fn save(&self, entity: &T) -> impl Future<Output = Result<()>> + Send;

    /// Overwrite the stored entity with the same identifier.
    fn update_by_id(&self, entity: &T) -> impl Future<Output = Result<()>> + Send;
}

/// Backing store that can list a whole entity collection.
pub trait CollectionRepository<T: CacheEntity>: Send + Sync {
    /// All entities, in the order they should be presented.
    fn fetch_all(&self) -> impl Future<Output = Result<Vec<T>>> + Send;
}

/// `DashMap`-backed repository for tests and demos.
///
/// Counts `fetch_by_id` and `fetch_all` calls so callers can verify how often
/// the cache let a read through.
pub struct InMemoryRepository<T: CacheEntity> {
    rows: DashMap<T::Key, T>,
    fetches: AtomicUsize,
}

impl<T: CacheEntity> InMemoryRepository<T> {
    pub fn new() -> Self {
        InMemoryRepository {
            rows: DashMap::new(),
            fetches: AtomicUsize::new(0),
        }
    }

    /// Seed a row without going through `save`.
    pub fn insert(&self, id: T::Key, entity: T) {
        self.rows.insert(id, entity);
    }

    pub fn remove(&self, id: &T::Key) -> Option<T> {
        self.rows.remove(id).map(|(_, entity)| entity)
    }

    pub fn get(&self, id: &T::Key) -> Option<T> {
        self.rows.get(id).map(|row| row.value().clone())
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Number of reads served so far.
    pub fn fetch_count(&self) -> usize {
        self.fetches.load(Ordering::SeqCst)
    }

    pub fn into_shared(self) -> Arc<Self> {
        Arc::new(self)
    }
}

impl<T: CacheEntity> Default for InMemoryRepository<T> {
    fn default() -> Self {
        Self::new()
    }
}

fn require_id<T: CacheEntity>(entity: &T) -> Result<T::Key> {
    entity.cache_key().ok_or_else(|| {
        Error::InvalidArgument(format!("{} entity has no id", T::cache_prefix()))
    })
}

impl<T: CacheEntity> DataRepository<T> for InMemoryRepository<T> {
    async fn fetch_by_id(&self, id: &T::Key) -> Result<Option<T>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        Ok(self.get(id))
    }

    async fn save(&self, entity: &T) -> Result<()> {
        let id = require_id(entity)?;
        if self.rows.contains_key(&id) {
            return Err(Error::RepositoryError(format!(
                "{} {} already exists",
                T::cache_prefix(),
                id
            )));
        }
        self.rows.insert(id, entity.clone());
        Ok(())
    }

    async fn update_by_id(&self, entity: &T) -> Result<()> {
        let id = require_id(entity)?;
        match self.rows.get_mut(&id) {
            Some(mut row) => {
                *row = entity.clone();
                Ok(())
            }
            None => Err(Error::RepositoryError(format!(
                "{} {} does not exist",
                T::cache_prefix(),
                id
            ))),
        }
    }
}

impl<T: CacheEntity> CollectionRepository<T> for InMemoryRepository<T> {
    /// Rows ordered by the string form of their id.
    async fn fetch_all(&self) -> Result<Vec<T>> {
        self.fetches.fetch_add(1, Ordering::SeqCst);
        let mut rows: Vec<(String, T)> = self
            .rows
            .iter()
            .map(|row| (row.key().to_string(), row.value().clone()))
            .collect();
        rows.sort_by(|a, b| a.0.cmp(&b.0));
        Ok(rows.into_iter().map(|(_, entity)| entity).collect())
    }
}
