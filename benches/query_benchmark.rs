//! Criterion benchmarks for the query engine hot paths.
//!
//! Run with: `cargo bench --bench query_benchmark`

use cache_shield::backend::InMemoryBackend;
use cache_shield::repository::InMemoryRepository;
use cache_shield::{CacheEntity, CacheStrategy, QueryEngine, RebuildScheduler};
use criterion::{criterion_group, criterion_main, Criterion};
use serde::{Deserialize, Serialize};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;
use tokio::runtime::Runtime;

#[derive(Clone, Serialize, Deserialize)]
struct Shop {
    id: Option<u64>,
    name: String,
    address: String,
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

fn setup(rt: &Runtime) -> (QueryEngine<InMemoryBackend>, Arc<InMemoryRepository<Shop>>) {
    let _guard = rt.enter();
    let engine = QueryEngine::new(InMemoryBackend::new(), Arc::new(RebuildScheduler::new(2)));
    let repo = Arc::new(InMemoryRepository::new());
    repo.insert(
        1,
        Shop {
            id: Some(1),
            name: "103 Tea House".to_string(),
            address: "Jinhua Road 1".to_string(),
            score: 37,
        },
    );
    (engine, repo)
}

fn bench_cache_hit(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let (engine, repo) = setup(&rt);
    let (engine, repo) = (&engine, &repo);

    for strategy in [CacheStrategy::PassThrough, CacheStrategy::Mutex] {
        rt.block_on(engine.query_by_id::<Shop, _>(&1, repo, strategy))
            .expect("Failed to warm cache");

        c.bench_function(&format!("cache_hit_{}", strategy), |b| {
            b.to_async(&rt).iter(|| async move {
                black_box(
                    engine
                        .query_by_id::<Shop, _>(&1, repo, strategy)
                        .await
                        .expect("Query failed"),
                )
            });
        });
    }

    rt.block_on(engine.save_with_logical_expire::<Shop, _>(
        &1,
        repo.as_ref(),
        Duration::from_secs(3600),
    ))
    .expect("Failed to warm cache");

    c.bench_function("cache_hit_logical_expire", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(
                engine
                    .query_by_id::<Shop, _>(&1, repo, CacheStrategy::LogicalExpire)
                    .await
                    .expect("Query failed"),
            )
        });
    });
}

fn bench_null_marker(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let (engine, repo) = setup(&rt);
    let (engine, repo) = (&engine, &repo);

    c.bench_function("null_marker_hit", |b| {
        b.to_async(&rt).iter(|| async move {
            black_box(
                engine
                    .query_by_id::<Shop, _>(&404, repo, CacheStrategy::PassThrough)
                    .await
                    .expect("Query failed"),
            )
        });
    });
}

fn bench_miss_and_invalidate(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to build runtime");
    let (engine, repo) = setup(&rt);
    let (engine, repo) = (&engine, &repo);

    c.bench_function("mutex_cold_read", |b| {
        b.to_async(&rt).iter(|| async move {
            engine
                .invalidate::<Shop>(&1)
                .await
                .expect("Invalidate failed");
            black_box(
                engine
                    .query_by_id::<Shop, _>(&1, repo, CacheStrategy::Mutex)
                    .await
                    .expect("Query failed"),
            )
        });
    });
}

criterion_group!(
    benches,
    bench_cache_hit,
    bench_null_marker,
    bench_miss_and_invalidate
);
criterion_main!(benches);
