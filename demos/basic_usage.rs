//! Basic usage of the query engine: pass-through, mutex and write-invalidate.

use cache_shield::{
    backend::InMemoryBackend, error::Result, CacheEntity, CacheFeed, CacheStrategy,
    DataRepository, QueryEngine, RebuildScheduler,
};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::RwLock;

/// Example entity: Shop
#[derive(Clone, Serialize, Deserialize, Debug)]
struct Shop {
    id: Option<u64>,
    name: String,
    area: String,
    score: u32,
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

/// Feeder for Shop
struct ShopFeeder {
    id: u64,
    shop: Option<Shop>,
}

impl CacheFeed<Shop> for ShopFeeder {
    fn entity_id(&mut self) -> u64 {
        self.id
    }

    fn feed(&mut self, entity: Option<Shop>) {
        self.shop = entity;
    }
}

/// Mock repository that simulates database access
struct ShopRepository {
    rows: RwLock<HashMap<u64, Shop>>,
}

impl ShopRepository {
    fn seeded() -> Self {
        let mut rows = HashMap::new();
        rows.insert(
            1,
            Shop {
                id: Some(1),
                name: "103 Tea House".to_string(),
                area: "Grand Canal".to_string(),
                score: 37,
            },
        );
        rows.insert(
            2,
            Shop {
                id: Some(2),
                name: "Lucky Noodles".to_string(),
                area: "Old Town".to_string(),
                score: 45,
            },
        );
        ShopRepository {
            rows: RwLock::new(rows),
        }
    }
}

impl DataRepository<Shop> for ShopRepository {
    async fn fetch_by_id(&self, id: &u64) -> Result<Option<Shop>> {
        println!("  [DB] Fetching shop: {}", id);
        Ok(self.rows.read().await.get(id).cloned())
    }

    async fn save(&self, shop: &Shop) -> Result<()> {
        if let Some(id) = shop.id {
            self.rows.write().await.insert(id, shop.clone());
        }
        Ok(())
    }

    async fn update_by_id(&self, shop: &Shop) -> Result<()> {
        println!("  [DB] Updating shop: {:?}", shop.id);
        self.save(shop).await
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Cache Shield - Basic Example ===\n");

    // 1. Initialize engine
    println!("1. Initializing in-memory cache backend...");
    let scheduler = Arc::new(RebuildScheduler::new(2));
    let engine = QueryEngine::new(InMemoryBackend::new(), scheduler.clone());
    let repository = Arc::new(ShopRepository::seeded());
    println!("   ✓ Engine ready\n");

    // 2. First request - cache miss, fetch from database
    println!("2. First request for shop 1 (pass-through):");
    if let Some(shop) = engine
        .query_by_id::<Shop, _>(&1, &repository, CacheStrategy::PassThrough)
        .await?
    {
        println!("   ✓ Shop loaded: {} in {}\n", shop.name, shop.area);
    }

    // 3. Second request - cache hit
    println!("3. Second request for shop 1:");
    if let Some(shop) = engine
        .query_by_id::<Shop, _>(&1, &repository, CacheStrategy::PassThrough)
        .await?
    {
        println!("   ✓ Shop loaded from cache: {} (score {})\n", shop.name, shop.score);
    }

    // 4. Missing id - null marker stops repeated database lookups
    println!("4. Two requests for missing shop 99:");
    for _ in 0..2 {
        let found = engine
            .query_by_id::<Shop, _>(&99, &repository, CacheStrategy::PassThrough)
            .await?;
        println!("   ✓ Found: {:?}", found.map(|s| s.name));
    }
    println!();

    // 5. Mutex strategy through a feeder
    println!("5. Mutex strategy via feeder (shop 2):");
    let mut feeder = ShopFeeder { id: 2, shop: None };
    engine
        .with::<Shop, _, _>(&mut feeder, &repository, CacheStrategy::Mutex)
        .await?;
    if let Some(shop) = &feeder.shop {
        println!("   ✓ Shop loaded: {}\n", shop.name);
    }

    // 6. Update - write database, drop cache entry
    println!("6. Renaming shop 1:");
    let renamed = Shop {
        id: Some(1),
        name: "104 Tea House".to_string(),
        area: "Grand Canal".to_string(),
        score: 37,
    };
    engine.update(&renamed, repository.as_ref()).await?;
    if let Some(shop) = engine
        .query_by_id::<Shop, _>(&1, &repository, CacheStrategy::Mutex)
        .await?
    {
        println!("   ✓ Shop after update: {}\n", shop.name);
    }

    scheduler.shutdown().await;
    println!("=== Example Complete ===\n");
    Ok(())
}
