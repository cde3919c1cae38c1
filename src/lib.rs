//! # cache-shield
//!
//! Cache-aside reads that protect a slow backing store from the three classic
//! cache failure modes.
//!
//! ## Strategies
//!
//! - **PassThrough:** read through on miss; confirmed absences are cached as
//!   short-lived null markers so repeated lookups of missing ids never reach
//!   the store (penetration).
//! - **Mutex:** as above, but only the holder of a per-id lock rebuilds a
//!   missing entry; other callers back off and retry (breakdown).
//! - **LogicalExpire:** pre-warmed entries carry a logical expiry and never
//!   leave the store; stale data is served immediately while one background
//!   rebuild per id refreshes it.
//!
//! Writes go to the backing store first, then invalidate the cache entry.
//!
//! ## Quick Start
//!
//! ```ignore
//! use cache_shield::{
//!     backend::InMemoryBackend, repository::InMemoryRepository, CacheEntity,
//!     CacheStrategy, QueryEngine, RebuildScheduler,
//! };
//! use std::sync::Arc;
//!
//! // 1. Define your entity
//! #[derive(Clone, Serialize, Deserialize)]
//! struct Shop {
//!     id: Option<u64>,
//!     name: String,
//! }
//!
//! // 2. Implement CacheEntity
//! impl CacheEntity for Shop {
//!     type Key = u64;
//!
//!     fn cache_key(&self) -> Option<Self::Key> {
//!         self.id
//!     }
//!
//!     fn cache_prefix() -> &'static str {
//!         "shop"
//!     }
//! }
//!
//! // 3. Use it
//! let scheduler = Arc::new(RebuildScheduler::new(10));
//! let engine = QueryEngine::new(InMemoryBackend::new(), scheduler);
//! let repository = Arc::new(InMemoryRepository::<Shop>::new());
//!
//! let shop = engine
//!     .query_by_id::<Shop, _>(&1, &repository, CacheStrategy::Mutex)
//!     .await?;
//! ```

#[macro_use]
extern crate log;

pub mod backend;
pub mod builder;
pub mod config;
pub mod engine;
pub mod entity;
pub mod error;
pub mod feed;
pub mod key;
pub mod lock;
pub mod observability;
pub mod repository;
pub mod scheduler;
pub mod serialization;
pub mod service;
pub mod strategy;

// Re-exports for convenience
pub use backend::CacheBackend;
pub use builder::QueryBuilder;
pub use config::CacheConfig;
pub use engine::QueryEngine;
pub use entity::CacheEntity;
pub use error::{Error, Result};
pub use feed::CacheFeed;
pub use lock::DistributedLock;
pub use repository::{CollectionRepository, DataRepository};
pub use scheduler::RebuildScheduler;
pub use service::CacheService;
pub use strategy::CacheStrategy;

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
