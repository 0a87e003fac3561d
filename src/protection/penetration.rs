//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存穿透防护：把“数据源中不存在”也缓存一段时间，避免不存在的键反复打到数据源。

use crate::client::{is_null_marker, CacheOps, Loader, Lookup, OptionalLoader, NULL_MARKER};
use crate::config::PenetrationConfig;
use crate::error::{CacheError, Result};
use crate::metrics::CacheMetrics;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use futures::FutureExt;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument};

/// 穿透防护装饰器
///
/// 空值标记使用独立的 `null_ttl`，到期后下一次访问会重新查询数据源
pub struct PenetrationProtection {
    inner: Arc<dyn CacheOps>,
    config: PenetrationConfig,
}

impl PenetrationProtection {
    pub fn new(inner: Arc<dyn CacheOps>, config: PenetrationConfig) -> Self {
        Self { inner, config }
    }

    pub fn inner(&self) -> &Arc<dyn CacheOps> {
        &self.inner
    }

    async fn mark_absent(&self, key: &str) -> Result<()> {
        debug!("penetration: 写入空值标记 key={}, ttl={}", key, self.config.null_ttl);
        self.inner
            .put_bytes(key, NULL_MARKER.to_vec(), Some(self.config.null_ttl))
            .await
    }
}

#[async_trait]
impl CacheOps for PenetrationProtection {
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

    /// 未命中时写入空值标记并返回 `None`；已有的空值标记原样返回，由类型化接口解释
    #[instrument(skip(self), level = "debug", fields(cache = %self.inner.name()))]
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.inner.get_bytes(key).await? {
            Some(bytes) => Ok(Some(bytes)),
            None => {
                self.mark_absent(key).await?;
                Ok(None)
            }
        }
    }

    /// 键被标记为不存在时直接返回 [`CacheError::CachedAbsent`]，不调用加载器
    #[instrument(skip(self, loader), level = "debug", fields(cache = %self.inner.name()))]
    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: Loader<'_>,
    ) -> Result<Vec<u8>> {
        match self.inner.get_bytes(key).await? {
            Some(bytes) if is_null_marker(&bytes) => {
                Err(CacheError::CachedAbsent(key.to_string()))
            }
            Some(bytes) => Ok(bytes),
            None => self.inner.get_or_load_bytes(key, ttl, loader).await,
        }
    }

    /// 加载器返回 `None` 时写入空值标记（使用 `null_ttl`），结果为 [`Lookup::Absent`]
    #[instrument(skip(self, loader), level = "debug", fields(cache = %self.inner.name()))]
    async fn load_optional_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: OptionalLoader<'_>,
    ) -> Result<Lookup<Vec<u8>>> {
        let marking = loader
            .map(|loaded| loaded.map(|value| Some(value.unwrap_or_else(|| NULL_MARKER.to_vec()))))
            .boxed();
        match self.inner.load_optional_bytes(key, ttl, marking).await? {
            Lookup::Present(bytes) if is_null_marker(&bytes) => {
                // 标记是本次写入的，把TTL从值的TTL改成 null_ttl
                self.inner.expire(key, self.config.null_ttl).await?;
                debug!("penetration: 数据源中不存在 key={}", key);
                Ok(Lookup::Absent)
            }
            other => Ok(other),
        }
    }

    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        self.inner.put_bytes(key, value, ttl).await
    }

    /// 空值标记视为不存在，可以被真实值覆盖
    async fn put_if_absent_bytes(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
    ) -> Result<bool> {
        if self
            .inner
            .put_if_absent_bytes(key, value.clone(), ttl)
            .await?
        {
            return Ok(true);
        }
        match self.inner.get_bytes(key).await? {
            Some(existing) if is_null_marker(&existing) => {
                self.inner.put_bytes(key, value, ttl).await?;
                Ok(true)
            }
            _ => Ok(false),
        }
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

    async fn multi_put_bytes(
        &self,
        items: HashMap<String, Vec<u8>>,
        ttl: Option<u64>,
    ) -> Result<()> {
        self.inner.multi_put_bytes(items, ttl).await
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
    use crate::error::BoxError;
    use std::sync::atomic::{AtomicUsize, Ordering};

    fn protected(null_ttl: u64) -> (Arc<LocalCache>, PenetrationProtection) {
        let local = Arc::new(LocalCache::new("pen", 100, 0));
        let cache = PenetrationProtection::new(
            local.clone(),
            PenetrationConfig {
                enabled: true,
                null_ttl,
            },
        );
        (local, cache)
    }

    #[tokio::test]
    async fn test_get_miss_writes_marker() {
        let (local, cache) = protected(60);
        assert_eq!(cache.get::<u32>("ghost").await.unwrap(), None);
        assert_eq!(cache.lookup::<u32>("ghost").await.unwrap(), Lookup::CachedAbsent);

        let left = local.get_expire("ghost").await.unwrap().unwrap();
        assert!(left <= Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_marked_key_skips_loader() {
        let (_local, cache) = protected(60);
        let _ = cache.get::<u32>("ghost").await.unwrap();

        let calls = AtomicUsize::new(0);
        let result = cache
            .get_or_load("ghost", Some(300), || async {
                calls.fetch_add(1, Ordering::SeqCst);
                Ok::<_, BoxError>(1u32)
            })
            .await;
        assert!(matches!(result, Err(CacheError::CachedAbsent(_))));
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn test_load_optional_caches_absence_once() {
        let (local, cache) = protected(30);
        let calls = AtomicUsize::new(0);

        for _ in 0..5 {
            let result: Lookup<u32> = cache
                .load_optional("missing", Some(3600), || async {
                    calls.fetch_add(1, Ordering::SeqCst);
                    Ok::<_, BoxError>(None)
                })
                .await
                .unwrap();
            assert!(!result.is_present());
        }
        assert_eq!(calls.load(Ordering::SeqCst), 1);

        let left = local.get_expire("missing").await.unwrap().unwrap();
        assert!(left <= Duration::from_secs(30));
    }

    #[tokio::test]
    async fn test_load_optional_present_value() {
        let (_local, cache) = protected(30);
        let result: Lookup<String> = cache
            .load_optional("user:1", None, || async {
                Ok::<_, BoxError>(Some("alice".to_string()))
            })
            .await
            .unwrap();
        assert_eq!(result, Lookup::Present("alice".to_string()));
        assert_eq!(
            cache.get::<String>("user:1").await.unwrap().as_deref(),
            Some("alice")
        );
    }

    #[tokio::test]
    async fn test_put_if_absent_replaces_marker() {
        let (_local, cache) = protected(60);
        let _ = cache.get::<u32>("k").await.unwrap();
        assert!(cache.put_if_absent("k", &7u32, None).await.unwrap());
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(7));
        assert!(!cache.put_if_absent("k", &8u32, None).await.unwrap());
    }

    #[tokio::test]
    async fn test_marker_expires() {
        let (_local, cache) = protected(1);
        let _ = cache.get::<u32>("k").await.unwrap();
        tokio::time::sleep(Duration::from_millis(1200)).await;

        let value = cache
            .get_or_load("k", None, || async { Ok::<_, BoxError>(5u32) })
            .await
            .unwrap();
        assert_eq!(value, 5);
    }
}
