//! Core entity trait that all cached entities must implement.

use crate::error::Result;
use crate::serialization;
use serde::{Deserialize, Serialize};
use std::fmt::Display;
use std::hash::Hash;
use std::time::SystemTime;

/// Trait that all entities stored in cache must implement.
///
/// # Example
///
/// ```
/// use serde::{Deserialize, Serialize};
/// use cache_shield::CacheEntity;
///
/// #[derive(Clone, Serialize, Deserialize)]
/// pub struct Shop {
///     pub id: Option<u64>,
///     pub name: String,
/// }
///
/// impl CacheEntity for Shop {
///     type Key = u64;
///
///     fn cache_key(&self) -> Option<Self::Key> {
///         self.id
///     }
///
///     fn cache_prefix() -> &'static str {
///         "shop"
///     }
/// }
/// ```
pub trait CacheEntity:
    Send + Sync + Serialize + for<'de> Deserialize<'de> + Clone + 'static
{
    /// Type of the entity's identifier.
    type Key: Display + Clone + Send + Sync + Eq + Hash + 'static;

    /// Return the entity's identifier.
    ///
    /// `None` for entities that have not been assigned one yet. Writes
    /// through the engine reject such entities.
    fn cache_key(&self) -> Option<Self::Key>;

    /// Return the cache prefix for this entity type.
    ///
    /// Used to namespace cache keys. Example: "shop", "shop_type"
    /// Final entry key format: `"cache:{prefix}:{id}"`
    fn cache_prefix() -> &'static str;

    /// Encode entity for cache storage.
    ///
    /// `None` produces the bare JSON form used by TTL-governed strategies;
    /// `Some(expiry)` wraps it for the logical expiry strategy.
    /// See `crate::serialization` for the format.
    fn encode_for_cache(&self, logical_expiry: Option<SystemTime>) -> Result<String> {
        serialization::encode(self, logical_expiry)
    }

    /// Decode entity from its bare cache form.
    ///
    /// # Errors
    ///
    /// - `Error::MalformedEntry`: null marker, corrupted or foreign payload
    fn decode_from_cache(raw: &str) -> Result<Self> {
        serialization::decode(raw)
    }

    /// Optional: Validate entity after loading.
    ///
    /// Called on every entity served by the engine, whether it came from the
    /// cache or the backing store.
    fn validate(&self) -> Result<()> {
        Ok(())
    }
}
