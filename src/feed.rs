//! Feeder pattern: a caller-owned slot the engine fills with a query result.

use crate::entity::CacheEntity;
use crate::error::{Error, Result};

/// Supplies an id to look up and receives the result.
///
/// # Example
///
/// ```
/// use cache_shield::{CacheEntity, CacheFeed};
/// # use serde::{Deserialize, Serialize};
/// # #[derive(Clone, Serialize, Deserialize)]
/// # struct Shop { id: Option<u64> }
/// # impl CacheEntity for Shop {
/// #     type Key = u64;
/// #     fn cache_key(&self) -> Option<u64> { self.id }
/// #     fn cache_prefix() -> &'static str { "shop" }
/// # }
///
/// struct ShopFeeder {
///     id: u64,
///     shop: Option<Shop>,
/// }
///
/// impl CacheFeed<Shop> for ShopFeeder {
///     fn entity_id(&mut self) -> u64 {
///         self.id
///     }
///
///     fn feed(&mut self, entity: Option<Shop>) {
///         self.shop = entity;
///     }
/// }
/// ```
pub trait CacheFeed<T: CacheEntity>: Send {
    /// Identifier to look up.
    fn entity_id(&mut self) -> T::Key;

    /// Receive the result; `None` if the entity does not exist.
    fn feed(&mut self, entity: Option<T>);

    /// Optional: Reject the request before any store access.
    fn validate(&self) -> Result<()> {
        Ok(())
    }

    /// Optional: Called when an entity was found, before `feed`.
    fn on_hit(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Optional: Called when the entity does not exist, before `feed`.
    fn on_miss(&mut self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// Optional: Inspect the entity before it is fed.
    fn on_loaded(&mut self, _entity: &T) -> Result<()> {
        Ok(())
    }
}

/// Feeder that just stores what it receives.
#[derive(Clone)]
pub struct GenericFeeder<T: CacheEntity> {
    pub id: T::Key,
    pub data: Option<T>,
}

impl<T: CacheEntity> GenericFeeder<T> {
    pub fn new(id: T::Key) -> Self {
        GenericFeeder { id, data: None }
    }

    /// Take the fed entity, failing with `Error::NotFound` if there is none.
    pub fn into_found(self) -> Result<T> {
        let id = self.id;
        self.data
            .ok_or_else(|| Error::NotFound(format!("{} {}", T::cache_prefix(), id)))
    }
}

impl<T: CacheEntity> CacheFeed<T> for GenericFeeder<T> {
    fn entity_id(&mut self) -> T::Key {
        self.id.clone()
    }

    fn feed(&mut self, entity: Option<T>) {
        self.data = entity;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde::{Deserialize, Serialize};

    #[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
    struct TestEntity {
        id: Option<String>,
        value: String,
    }

    impl CacheEntity for TestEntity {
        type Key = String;

        fn cache_key(&self) -> Option<Self::Key> {
            self.id.clone()
        }

        fn cache_prefix() -> &'static str {
            "test"
        }
    }

    #[test]
    fn test_generic_feeder_stores_result() {
        let mut feeder = GenericFeeder::<TestEntity>::new("1".to_string());
        assert_eq!(feeder.entity_id(), "1");

        feeder.feed(Some(TestEntity {
            id: Some("1".to_string()),
            value: "data".to_string(),
        }));
        assert_eq!(feeder.into_found().expect("Data not found").value, "data");
    }

    #[test]
    fn test_generic_feeder_not_found() {
        let mut feeder = GenericFeeder::<TestEntity>::new("9".to_string());
        feeder.feed(None);
        assert_eq!(
            feeder.into_found(),
            Err(Error::NotFound("test 9".to_string()))
        );
    }
}
