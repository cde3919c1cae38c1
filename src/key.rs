//! Cache key derivation.
//!
//! Entries, collections and lock tokens live in disjoint namespaces of the
//! same store, so no identifier can alias another kind of key:
//!
//! ```text
//! cache:{prefix}:{id}    entry
//! list:{prefix}          collection entry
//! lock:{prefix}:{id}     rebuild lock
//! ```

use crate::entity::CacheEntity;
use std::fmt;

pub const CACHE_NAMESPACE: &str = "cache";
pub const LOCK_NAMESPACE: &str = "lock";
pub const LIST_NAMESPACE: &str = "list";

/// Key of a rebuild lock.
///
/// Only [`CacheKeyBuilder::lock_key`] creates these, so acquisition and
/// release always agree on the key.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct LockKey(String);

impl LockKey {
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for LockKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

pub struct CacheKeyBuilder;

impl CacheKeyBuilder {
    /// Entry key for `id`: `"cache:{prefix}:{id}"`.
    pub fn build<T: CacheEntity>(id: &T::Key) -> String {
        format!("{}:{}:{}", CACHE_NAMESPACE, T::cache_prefix(), id)
    }

    /// Rebuild lock key for `id`: `"lock:{prefix}:{id}"`.
    pub fn lock_key<T: CacheEntity>(id: &T::Key) -> LockKey {
        LockKey(format!("{}:{}:{}", LOCK_NAMESPACE, T::cache_prefix(), id))
    }

    /// Key holding the whole collection of `T`: `"list:{prefix}"`.
    pub fn collection<T: CacheEntity>() -> String {
        format!("{}:{}", LIST_NAMESPACE, T::cache_prefix())
    }
}
