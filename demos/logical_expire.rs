//! Logical expiry: warm up, serve stale data, rebuild in the background.

use cache_shield::{
    backend::InMemoryBackend, error::Result, repository::InMemoryRepository, CacheConfig,
    CacheEntity, CacheService, CacheStrategy, QueryEngine, RebuildScheduler,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::Duration;

#[derive(Clone, Serialize, Deserialize, Debug)]
struct Shop {
    id: Option<u64>,
    name: String,
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

#[tokio::main]
async fn main() -> Result<()> {
    env_logger::Builder::from_default_env()
        .filter_level(log::LevelFilter::Debug)
        .try_init()
        .ok();

    println!("\n=== Cache Shield - Logical Expire Example ===\n");

    let config = CacheConfig::from_env()?
        .with_logical_ttl(Duration::from_secs(1))
        .with_default_strategy(CacheStrategy::LogicalExpire);
    let scheduler = Arc::new(RebuildScheduler::new(config.rebuild_workers));
    let engine = QueryEngine::with_config(InMemoryBackend::new(), scheduler.clone(), config);

    let repository = Arc::new(InMemoryRepository::new());
    repository.insert(
        1,
        Shop {
            id: Some(1),
            name: "Hot Pot Corner".to_string(),
        },
    );
    let shops = CacheService::new(engine, Arc::clone(&repository));

    // 1. Not warmed: the strategy never touches the database
    println!("1. Query before warm-up:");
    println!("   ✓ Found: {:?}\n", shops.find(&1).await?.map(|s| s.name));

    // 2. Warm up with a short logical window
    println!("2. Warming shop 1 (fresh for 1s):");
    shops.warm_up(&1, Duration::from_secs(1)).await?;
    println!("   ✓ Found: {:?}\n", shops.find(&1).await?.map(|s| s.name));

    // 3. Change the database behind the cache, let the entry go stale
    println!("3. Renaming shop 1 in the database and waiting 1.5s...");
    repository.insert(
        1,
        Shop {
            id: Some(1),
            name: "Hot Pot Palace".to_string(),
        },
    );
    tokio::time::sleep(Duration::from_millis(1500)).await;

    // 4. Stale data is served at once; a rebuild is scheduled
    println!("4. Query after expiry:");
    println!("   ✓ Served: {:?}", shops.find(&1).await?.map(|s| s.name));
    scheduler.wait_idle().await;
    println!("   ✓ Rebuilds scheduled: {}\n", scheduler.submitted());

    // 5. Next query sees the rebuilt entry
    println!("5. Query after rebuild:");
    println!("   ✓ Served: {:?}\n", shops.find(&1).await?.map(|s| s.name));

    scheduler.shutdown().await;
    println!("=== Example Complete ===\n");
    Ok(())
}
