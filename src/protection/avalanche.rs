//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存雪崩防护：为写入的TTL加入随机抖动，避免同一批键同时过期。

use crate::client::{CacheOps, Loader, Lookup, OptionalLoader};
use crate::config::AvalancheConfig;
use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use rand::Rng;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// 计算带抖动的TTL
///
/// 抖动范围 `R = base * percent / 100`（整数除法），偏移在 `[-R, R]` 内均匀分布，
/// 结果至少为 1。`percent <= 0` 时原样返回。
pub fn jittered_ttl(base: u64, percent: i64) -> u64 {
    if percent <= 0 {
        return base;
    }
    let base_signed = i64::try_from(base).unwrap_or(i64::MAX);
    let range = base_signed.saturating_mul(percent) / 100;
    if range == 0 {
        return base.max(1);
    }
    let offset = rand::thread_rng().gen_range(-range..=range);
    base_signed.saturating_add(offset).max(1) as u64
}

/// 雪崩防护装饰器
pub struct AvalancheProtection {
    inner: Arc<dyn CacheOps>,
    config: AvalancheConfig,
}

impl AvalancheProtection {
    pub fn new(inner: Arc<dyn CacheOps>, config: AvalancheConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &Arc<dyn CacheOps> {
        &self.inner
    }

    /// 对请求的TTL加抖动；未指定时以 `base_ttl` 为基准，两者都没有时交给下一层默认值
    fn jitter(&self, ttl: Option<u64>) -> Option<u64> {
        ttl.or(self.config.base_ttl)
            .map(|base| jittered_ttl(base, self.config.jitter_percent))
    }
}

#[async_trait]
impl CacheOps for AvalancheProtection {
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
        self.inner.get_bytes(key).await
    }

    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: Loader<'_>,
    ) -> Result<Vec<u8>> {
        self.inner
            .get_or_load_bytes(key, self.jitter(ttl), loader)
            .await
    }

    async fn load_optional_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: OptionalLoader<'_>,
    ) -> Result<Lookup<Vec<u8>>> {
        self.inner
            .load_optional_bytes(key, self.jitter(ttl), loader)
            .await
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.inner.name()))]
    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let ttl = self.jitter(ttl);
        debug!("avalanche: key={}, ttl={:?}", key, ttl);
        self.inner.put_bytes(key, value, ttl).await
    }

    async fn put_if_absent_bytes(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
    ) -> Result<bool> {
        self.inner
            .put_if_absent_bytes(key, value, self.jitter(ttl))
            .await
    }

    async fn evict(&self, key: &str) -> Result<()> {
        self.inner.evict(key).await
    }

    async fn evict_many(&self, keys: &[String]) -> Result<()> {
        self.inner.evict_many(keys).await
    }

    async fn clear(&self) -> Result<()> {
        self.inner.clear().await
    }

    async fn multi_get_bytes(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        self.inner.multi_get_bytes(keys).await
    }

    /// 每个键独立抽取TTL，相同TTL的键合并为一次批量写入
    #[instrument(skip(self, items), level = "debug", fields(cache = %self.inner.name(), item_count = items.len()))]
    async fn multi_put_bytes(
        &self,
        items: HashMap<String, Vec<u8>>,
        ttl: Option<u64>,
    ) -> Result<()> {
        let mut groups: HashMap<Option<u64>, HashMap<String, Vec<u8>>> = HashMap::new();
        for (key, value) in items {
            groups
                .entry(self.jitter(ttl))
                .or_default()
                .insert(key, value);
        }
        debug!("avalanche multi_put: groups={}", groups.len());
        for (group_ttl, group) in groups {
            self.inner.multi_put_bytes(group, group_ttl).await?;
        }
        Ok(())
    }

    async fn get_expire(&self, key: &str) -> Result<Option<Duration>> {
        self.inner.get_expire(key).await
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        let ttl = jittered_ttl(ttl, self.config.jitter_percent);
        self.inner.expire(key, ttl).await
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        self.inner.has_key(key).await
    }

    async fn size(&self) -> Result<u64> {
        self.inner.size().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.inner.shutdown().await
    }

    fn metrics(&self) -> Option<Arc<CacheMetrics>> {
        self.inner.metrics()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CacheExt, LocalCache};

    #[test]
    fn test_jitter_stays_in_range() {
        for _ in 0..1000 {
            let ttl = jittered_ttl(100, 10);
            assert!((90..=110).contains(&ttl), "ttl {} out of range", ttl);
        }
    }

    #[test]
    fn test_jitter_spreads_values() {
        let distinct: std::collections::HashSet<u64> =
            (0..200).map(|_| jittered_ttl(1000, 20)).collect();
        assert!(distinct.len() > 10);
    }

    #[test]
    fn test_non_positive_percent_passes_through() {
        assert_eq!(jittered_ttl(100, 0), 100);
        assert_eq!(jittered_ttl(100, -5), 100);
    }

    #[test]
    fn test_result_is_at_least_one() {
        for _ in 0..200 {
            assert!(jittered_ttl(1, 100) >= 1);
            assert!(jittered_ttl(2, 100) >= 1);
        }
    }

    #[test]
    fn test_small_base_rounds_range_to_zero() {
        assert_eq!(jittered_ttl(5, 10), 5);
    }

    #[tokio::test]
    async fn test_put_applies_jitter() {
        let local = Arc::new(LocalCache::new("aval", 100, 0));
        let cache = AvalancheProtection::new(
            local.clone(),
            AvalancheConfig {
                enabled: true,
                jitter_percent: 50,
                base_ttl: None,
            },
        );
        cache.put("k", &1u32, Some(100)).await.unwrap();
        let left = local.get_expire("k").await.unwrap().unwrap();
        assert!(left <= Duration::from_secs(150));
        assert!(left >= Duration::from_secs(49));
    }

    #[tokio::test]
    async fn test_multi_put_writes_every_key() {
        let local = Arc::new(LocalCache::new("aval_multi", 100, 0));
        let cache = AvalancheProtection::new(
            local.clone(),
            AvalancheConfig {
                enabled: true,
                jitter_percent: 10,
                base_ttl: Some(600),
            },
        );
        let items: HashMap<String, u32> = (0..20).map(|i| (format!("k{}", i), i)).collect();
        cache.multi_put(&items, None).await.unwrap();

        for i in 0..20 {
            let key = format!("k{}", i);
            let left = local.get_expire(&key).await.unwrap().unwrap();
            assert!(left <= Duration::from_secs(660));
            assert!(left >= Duration::from_secs(539));
        }
    }
}
