//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 缓存管理器集成测试

mod common;

use oxtier::client::{CacheExt, CacheOps};
use oxtier::config::{CacheType, Config};
use oxtier::manager::CacheManager;
use std::sync::{Arc, Barrier};

fn local_config() -> Config {
    Config::from_toml_str(
        r#"
        [global]
        cache_type = "local"
        default_ttl = 600

        [l1]
        max_capacity = 1000
        default_ttl = 60
        "#,
    )
    .unwrap()
}

/// 两个线程同时首次获取同一个名称，得到的是同一个实例
#[tokio::test]
async fn test_concurrent_get_cache_returns_same_instance() {
    common::setup_logging();
    let manager = Arc::new(CacheManager::from_config(&local_config()).await.unwrap());

    for round in 0..20 {
        let name = format!("shared_{}", round);
        let barrier = Arc::new(Barrier::new(2));

        let results: Vec<Arc<dyn CacheOps>> = std::thread::scope(|scope| {
            let handles: Vec<_> = (0..2)
                .map(|_| {
                    let manager = manager.clone();
                    let barrier = barrier.clone();
                    let name = name.clone();
                    scope.spawn(move || {
                        barrier.wait();
                        manager.get_cache(&name).unwrap()
                    })
                })
                .collect();
            handles.into_iter().map(|h| h.join().unwrap()).collect()
        });

        assert!(Arc::ptr_eq(&results[0], &results[1]));
    }
    assert_eq!(manager.get_cache_names().len(), 20);
}

#[tokio::test]
async fn test_lifecycle() {
    let manager = CacheManager::from_config(&local_config()).await.unwrap();
    assert_eq!(manager.cache_type(), CacheType::Local);

    let users = manager.get_cache("users").unwrap();
    users.put("u1", &"alice", None).await.unwrap();
    assert_eq!(manager.get_cache_type("users"), Some(CacheType::Local));

    let same = manager.get_cache("users").unwrap();
    assert_eq!(same.get::<String>("u1").await.unwrap().as_deref(), Some("alice"));

    manager.destroy_cache("users").await.unwrap();
    assert!(manager.get_cache_names().is_empty());
    assert_eq!(users.get::<String>("u1").await.unwrap(), None);

    let fresh = manager.get_cache("users").unwrap();
    assert!(!Arc::ptr_eq(&users, &fresh));
}

#[tokio::test]
async fn test_redis_type_requires_l2_section() {
    let mut config = local_config();
    config.global.cache_type = CacheType::Redis;
    let result = CacheManager::from_config(&config).await;
    assert!(matches!(
        result,
        Err(oxtier::CacheError::ConfigError(_))
    ));
}
