//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存基准测试
//!
//! - 本地层后端读写
//! - 本地缓存与加上全部防护层之后的开销对比
//! - 多级缓存的提升读取
//! - 热点键并发回源
//! - Redis共享层读写（Redis不可用时跳过）

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use oxtier::backend::l1::L1Backend;
use oxtier::backend::l2::L2Backend;
use oxtier::client::{CacheExt, CacheOps};
use oxtier::config::{MultiLevelConfig, ProtectionConfig};
use oxtier::error::BoxError;
use oxtier::lock::{LocalLockProvider, LockProvider};
use oxtier::protection::protect;
use oxtier::serialization::SerializerEnum;
use oxtier::utils::create_standalone_config;
use oxtier::{LocalCache, MultiLevelCache, RedisCache};
use std::sync::Arc;
use tokio::runtime::Runtime;
use tokio::task::JoinSet;

// ============================= 本地层基准测试 =============================

fn bench_l1_backend(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let l1 = L1Backend::new(10000, 300);
    rt.block_on(l1.set_bytes("key", vec![0; 100], Some(300)));

    let mut group = c.benchmark_group("l1_backend");
    group.bench_function("set", |b| {
        b.to_async(&rt)
            .iter(|| async { l1.set_bytes(black_box("key"), black_box(vec![0; 100]), Some(300)).await });
    });
    group.bench_function("get", |b| {
        b.to_async(&rt)
            .iter(|| async { l1.get_bytes(black_box("key")).await });
    });
    group.finish();
}

fn bench_l1_different_sizes(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let l1 = L1Backend::new(10000, 300);

    let mut group = c.benchmark_group("l1_different_sizes");
    for size in [100, 1000, 10000, 100000].iter() {
        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            b.to_async(&rt).iter(|| async {
                let key = format!("l1_size_test_{}", size);
                l1.set_bytes(black_box(&key), black_box(vec![0u8; size]), None)
                    .await
            });
        });
    }
    group.finish();
}

// ============================= 防护层开销 =============================

fn bench_protection_overhead(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let bare: Arc<dyn CacheOps> = Arc::new(LocalCache::new("bench_bare", 10000, 300));
    let locks: Arc<dyn LockProvider> = Arc::new(LocalLockProvider::new());
    let protected = protect(
        Arc::new(LocalCache::new("bench_protected", 10000, 300)),
        &ProtectionConfig::default(),
        Some(locks),
    );
    rt.block_on(async {
        bare.put("key", &"value", None).await.unwrap();
        protected.put("key", &"value", None).await.unwrap();
    });

    let mut group = c.benchmark_group("protection_overhead");
    for (label, cache) in [("bare", bare), ("protected", protected)] {
        group.bench_function(BenchmarkId::new("get_hit", label), |b| {
            b.to_async(&rt)
                .iter(|| async { cache.get::<String>(black_box("key")).await.unwrap() });
        });
        group.bench_function(BenchmarkId::new("put", label), |b| {
            b.to_async(&rt).iter(|| async {
                cache
                    .put(black_box("key"), black_box(&"value"), Some(300))
                    .await
                    .unwrap()
            });
        });
    }
    group.finish();
}

// ============================= 多级缓存 =============================

fn bench_multi_level_local_hit(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let cache = MultiLevelCache::new(
        "bench_ml",
        Arc::new(LocalCache::new("bench_ml_local", 10000, 0)),
        Arc::new(LocalCache::new("bench_ml_shared", 10000, 0)),
        MultiLevelConfig::default(),
    );
    rt.block_on(cache.put("key", &vec![0u8; 256], None)).unwrap();

    c.bench_function("multi_level_local_hit", |b| {
        b.to_async(&rt)
            .iter(|| async { cache.get::<Vec<u8>>(black_box("key")).await.unwrap() });
    });
}

/// 热点键失效后多个任务同时回源
fn bench_hot_key_reload(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let locks: Arc<dyn LockProvider> = Arc::new(LocalLockProvider::new());
    let cache = protect(
        Arc::new(LocalCache::new("bench_hot", 10000, 300)),
        &ProtectionConfig::default(),
        Some(locks),
    );

    let mut group = c.benchmark_group("hot_key_reload");
    for concurrency in [1, 10, 50].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(concurrency),
            concurrency,
            |b, &concurrency| {
                b.to_async(&rt).iter(|| async {
                    cache.evict("hot").await.unwrap();
                    let mut tasks = JoinSet::new();
                    for _ in 0..concurrency {
                        let cache = cache.clone();
                        tasks.spawn(async move {
                            cache
                                .get_or_load("hot", None, || async {
                                    Ok::<_, BoxError>(42u64)
                                })
                                .await
                        });
                    }
                    while let Some(result) = tasks.join_next().await {
                        result.unwrap().unwrap();
                    }
                });
            },
        );
    }
    group.finish();
}

// ============================= Redis共享层 =============================

fn bench_redis_cache(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let config = create_standalone_config(oxtier::utils::DEFAULT_REDIS_URL);

    let l2 = match rt.block_on(L2Backend::new(&config)) {
        Ok(backend) => Arc::new(backend),
        Err(e) => {
            eprintln!("无法连接到Redis，跳过Redis基准测试: {}", e);
            return;
        }
    };
    let cache = RedisCache::new("bench", l2, 300, Some("oxtier_bench"), SerializerEnum::default());

    let mut group = c.benchmark_group("redis_cache");
    for size in [100, 1000, 10000].iter() {
        let key = format!("size_{}", size);
        rt.block_on(cache.put_bytes(&key, vec![0u8; *size], None))
            .unwrap();

        group.throughput(Throughput::Bytes(*size as u64));
        group.bench_with_input(BenchmarkId::new("get", size), &key, |b, key| {
            b.to_async(&rt)
                .iter(|| async { cache.get_bytes(black_box(key)).await.unwrap() });
        });
        group.bench_with_input(BenchmarkId::new("put", size), size, |b, &size| {
            b.to_async(&rt).iter(|| async {
                cache
                    .put_bytes(black_box("bench_put"), vec![0u8; size], Some(300))
                    .await
                    .unwrap()
            });
        });
    }
    group.finish();
    rt.block_on(cache.clear()).ok();
}

criterion_group!(
    benches,
    bench_l1_backend,
    bench_l1_different_sizes,
    bench_protection_overhead,
    bench_multi_level_local_hit,
    bench_hot_key_reload,
    bench_redis_cache
);
criterion_main!(benches);
