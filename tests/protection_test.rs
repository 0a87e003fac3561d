//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 防护层组合集成测试

mod common;

use oxtier::client::{CacheExt, CacheOps, Lookup};
use oxtier::config::ProtectionConfig;
use oxtier::error::{BoxError, CacheError};
use oxtier::lock::{LocalLockProvider, LockProvider};
use oxtier::protection::protect;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

fn protected_tiers(name: &str) -> (common::TestTiers, Arc<dyn CacheOps>) {
    let tiers = common::in_memory_tiers(name, 60, 3600);
    let locks: Arc<dyn LockProvider> = Arc::new(LocalLockProvider::new());
    let cache = protect(tiers.cache.clone(), &ProtectionConfig::default(), Some(locks));
    (tiers, cache)
}

/// 多级缓存本身不保证单飞，击穿防护把并发回源压到一次
#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn test_breakdown_over_multi_level() {
    common::setup_logging();
    let (_tiers, cache) = protected_tiers("stampede");
    let calls = Arc::new(AtomicUsize::new(0));

    let mut handles = Vec::new();
    for _ in 0..32 {
        let cache = cache.clone();
        let calls = calls.clone();
        handles.push(tokio::spawn(async move {
            cache
                .get_or_load("hot", Some(300), || async move {
                    calls.fetch_add(1, Ordering::SeqCst);
                    tokio::time::sleep(Duration::from_millis(50)).await;
                    Ok::<_, BoxError>(vec![1u8, 2, 3])
                })
                .await
        }));
    }

    for handle in handles {
        assert_eq!(handle.await.unwrap().unwrap(), vec![1u8, 2, 3]);
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

/// 数据源中不存在的键在空值标记有效期内不会再次查询数据源
#[tokio::test]
async fn test_penetration_over_multi_level() {
    let (tiers, cache) = protected_tiers("ghosts");
    let calls = AtomicUsize::new(0);

    for _ in 0..3 {
        let result: Lookup<u32> = cache
            .load_optional("user:404", None, || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(None)
            })
            .await
            .unwrap();
        assert!(!result.is_present());
    }
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    let result = cache
        .get_or_load("user:404", None, || async {
            calls.fetch_add(1, Ordering::SeqCst);
            Ok::<_, BoxError>(1u32)
        })
        .await;
    assert!(matches!(result, Err(CacheError::CachedAbsent(_))));
    assert_eq!(calls.load(Ordering::SeqCst), 1);

    // 标记写到了两层
    assert!(tiers.shared.has_key("user:404").await.unwrap());
}

/// 读取未命中时写入标记，第二次读取直接得到带标记的不存在结果
#[tokio::test]
async fn test_get_miss_is_remembered() {
    let (tiers, cache) = protected_tiers("remember");

    assert_eq!(cache.get::<String>("nope").await.unwrap(), None);
    let reads_after_first = tiers.shared.gets();

    assert_eq!(cache.lookup::<String>("nope").await.unwrap(), Lookup::CachedAbsent);
    assert_eq!(tiers.shared.gets(), reads_after_first);
}

#[tokio::test]
async fn test_loader_error_is_not_cached() {
    let (tiers, cache) = protected_tiers("failing");

    let result = cache
        .get_or_load("k", None, || async { Err::<u32, _>("database unavailable") })
        .await;
    match result {
        Err(CacheError::Loader { key, source }) => {
            assert_eq!(key, "k");
            assert_eq!(source.to_string(), "database unavailable");
        }
        other => panic!("unexpected result: {:?}", other.map(|_| ())),
    }
    assert!(!tiers.cache.has_key("k").await.unwrap());
}

#[tokio::test]
async fn test_jittered_writes_stay_below_shared_ttl_bound() {
    let (tiers, cache) = protected_tiers("jitter");
    cache.put("k", &1u32, Some(1000)).await.unwrap();

    let shared_ttl = tiers.shared.get_expire("k").await.unwrap().unwrap();
    assert!(shared_ttl <= Duration::from_secs(1100));
    assert!(shared_ttl >= Duration::from_secs(899));

    let local_ttl = tiers.local.get_expire("k").await.unwrap().unwrap();
    assert!(local_ttl <= Duration::from_secs(60));
}
