//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了测试的通用工具函数和设置。

#![allow(dead_code)]

use async_trait::async_trait;
use oxtier::client::{CacheOps, Loader, Lookup, OptionalLoader};
use oxtier::config::MultiLevelConfig;
use oxtier::error::Result;
use oxtier::serialization::SerializerEnum;
use oxtier::{LocalCache, MultiLevelCache};
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Once};
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(EnvFilter::new("debug"))
            .try_init()
            .ok();
    });
}

/// 等待Redis可用
///
/// 循环检查Redis是否可用，最多等待约3秒
pub async fn wait_for_redis(url: &str) -> bool {
    for _ in 0..3 {
        if oxtier::utils::is_redis_available_url(url).await {
            return true;
        }
        tokio::time::sleep(Duration::from_millis(500)).await;
    }
    false
}

/// Redis测试使用的URL，可用 `REDIS_URL` 覆盖
pub fn redis_url() -> String {
    std::env::var("REDIS_URL").unwrap_or_else(|_| oxtier::utils::DEFAULT_REDIS_URL.to_string())
}

/// 统计读调用次数的缓存包装，用来断言某一层是否被访问
pub struct CountingCache {
    inner: Arc<dyn CacheOps>,
    pub gets: AtomicUsize,
    pub loads: AtomicUsize,
}

impl CountingCache {
    pub fn new(inner: Arc<dyn CacheOps>) -> Self {
        Self {
            inner,
            gets: AtomicUsize::new(0),
            loads: AtomicUsize::new(0),
        }
    }

    pub fn gets(&self) -> usize {
        self.gets.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl CacheOps for CountingCache {
    fn name(&self) -> &str {
        self.inner.name()
    }

    fn serializer(&self) -> &SerializerEnum {
        self.inner.serializer()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }

    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.gets.fetch_add(1, Ordering::SeqCst);
        self.inner.get_bytes(key).await
    }

    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: Loader<'_>,
    ) -> Result<Vec<u8>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.get_or_load_bytes(key, ttl, loader).await
    }

    async fn load_optional_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: OptionalLoader<'_>,
    ) -> Result<Lookup<Vec<u8>>> {
        self.loads.fetch_add(1, Ordering::SeqCst);
        self.inner.load_optional_bytes(key, ttl, loader).await
    }

    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        self.inner.put_bytes(key, value, ttl).await
    }

    async fn put_if_absent_bytes(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
    ) -> Result<bool> {
        self.inner.put_if_absent_bytes(key, value, ttl).await
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.inner.evict(key).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn multi_get_bytes(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.gets.fetch_add(keys.len(), Ordering::SeqCst);
        self.inner.multi_get_bytes(keys).await
    }

    async fn get_expire(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.get_expire(key).await
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        self.inner.expire(key, ttl).await
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        self.inner.has_key(key).await
    }

    async fn size(&self) -> Result<u64> {
        self.inner.size().await
    }
}

/// 两层都在内存中的多级缓存，共享层带读计数
pub struct TestTiers {
    pub local: Arc<LocalCache>,
    pub shared: Arc<CountingCache>,
    pub cache: Arc<MultiLevelCache>,
}

pub fn in_memory_tiers(name: &str, local_ttl: u64, default_ttl: u64) -> TestTiers {
    let local = Arc::new(LocalCache::new(format!("{}_local", name), 1000, 0));
    let shared = Arc::new(CountingCache::new(Arc::new(LocalCache::new(
        format!("{}_shared", name),
        1000,
        0,
    ))));
    let config = MultiLevelConfig {
        local_ttl,
        default_ttl,
        ..Default::default()
    };
    let cache = Arc::new(MultiLevelCache::new(
        name,
        local.clone(),
        shared.clone(),
        config,
    ));
    TestTiers {
        local,
        shared,
        cache,
    }
}
