//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了多级缓存的实现，组合本地层（快、容量有限）与共享层（慢、跨实例）。

use super::CacheOps;
use crate::config::MultiLevelConfig;
use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::serialization::SerializerEnum;
use crate::sync::{NoopSync, SyncDirection, TierSync};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

/// 多级缓存
///
/// 读取先查本地层，未命中再查共享层，共享层命中后把值提升到本地层。
/// 写入先写本地层再写共享层；两层之间不提供原子性，部分失败会直接以错误返回。
///
/// 本地层写入的TTL永远不超过 `local_ttl`，也不超过本次请求的共享层TTL，
/// 因此本地副本不会比共享层活得更久。
pub struct MultiLevelCache {
    name: String,
    local: Arc<dyn CacheOps>,
    shared: Arc<dyn CacheOps>,
    config: MultiLevelConfig,
    sync: Arc<dyn TierSync>,
    metrics: Arc<CacheMetrics>,
}

impl MultiLevelCache {
    /// 创建新的多级缓存
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `local` - 本地层
    /// * `shared` - 共享层，类型化接口使用它的序列化器
    /// * `config` - 多级缓存配置
    pub fn new(
        name: impl Into<String>,
        local: Arc<dyn CacheOps>,
        shared: Arc<dyn CacheOps>,
        config: MultiLevelConfig,
    ) -> Self {
        Self {
            name: name.into(),
            local,
            shared,
            config,
            sync: Arc::new(NoopSync),
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// 替换层间同步钩子
    pub fn with_sync(mut self, sync: Arc<dyn TierSync>) -> Self {
        self.sync = sync;
        self
    }

    pub fn local(&self) -> &Arc<dyn CacheOps> {
        &self.local
    }

    pub fn shared(&self) -> &Arc<dyn CacheOps> {
        &self.shared
    }

    pub fn config(&self) -> &MultiLevelConfig {
        &self.config
    }

    /// 本地层写入TTL：min(local_ttl, 请求TTL或共享层默认TTL)
    ///
    /// 0 对共享层表示不过期，本地层此时仍然使用 `local_ttl`
    fn local_ttl(&self, ttl: Option<u64>) -> u64 {
        match ttl.unwrap_or(self.config.default_ttl) {
            0 => self.config.local_ttl,
            requested => self.config.local_ttl.min(requested),
        }
    }

    /// 共享层写入TTL
    fn shared_ttl(&self, ttl: Option<u64>) -> u64 {
        ttl.unwrap_or(self.config.default_ttl)
    }

    /// 把共享层命中的值提升到本地层
    ///
    /// TTL取 min(local_ttl, 共享层剩余TTL)；剩余不足一秒时不提升。
    /// 提升失败只记录日志，不影响本次读取结果。
    async fn promote(&self, key: &str, bytes: &[u8]) {
        let remaining = match self.shared.get_expire(key).await {
            Ok(remaining) => remaining,
            Err(e) => {
                warn!("读取共享层剩余TTL失败，跳过提升: key={}, error={}", key, e);
                return;
            }
        };
        let ttl = match remaining {
            Some(left) if left.as_secs() == 0 => {
                debug!("共享层条目即将过期，跳过提升: key={}", key);
                return;
            }
            Some(left) => self.config.local_ttl.min(left.as_secs()),
            None => self.config.local_ttl,
        };
        match self.local.put_bytes(key, bytes.to_vec(), Some(ttl)).await {
            Ok(()) => {
                self.metrics.record_request("L1", "promote", "success");
                debug!("已提升到本地层: key={}, ttl={}", key, ttl);
            }
            Err(e) => {
                self.metrics.record_request("L1", "promote", "error");
                warn!("提升到本地层失败: key={}, error={}", key, e);
            }
        }
    }

    /// 按配置执行同步钩子，`sync_delay_ms` 大于0时在后台延迟执行
    async fn dispatch_sync(&self, direction: SyncDirection, key: &str) {
        let delay = self.config.sync.sync_delay_ms;
        if delay == 0 {
            if let Err(e) = self.sync.sync(direction, key).await {
                warn!("层间同步失败: direction={:?}, key={}, error={}", direction, key, e);
            }
            return;
        }
        let sync = self.sync.clone();
        let key = key.to_string();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(delay)).await;
            if let Err(e) = sync.sync(direction, &key).await {
                warn!("层间同步失败: direction={:?}, key={}, error={}", direction, key, e);
            }
        });
    }

    async fn after_write(&self, key: &str) {
        if self.config.sync.sync_on_write {
            self.dispatch_sync(SyncDirection::ToDistributed, key).await;
        }
    }

    async fn after_local_hit(&self, key: &str) {
        if self.config.sync.sync_on_read {
            self.dispatch_sync(SyncDirection::FromDistributed, key).await;
        }
    }

    /// 立即把本地变更同步到共享层/其他实例
    pub async fn sync_to_distributed(&self, key: &str) -> Result<()> {
        self.sync.sync_to_distributed(key).await
    }

    /// 立即从共享层刷新本地层
    pub async fn sync_from_distributed(&self, key: &str) -> Result<()> {
        self.sync.sync_from_distributed(key).await
    }
}

#[async_trait]
impl CacheOps for MultiLevelCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn serializer(&self) -> &SerializerEnum {
        self.shared.serializer()
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        if let Some(bytes) = self.local.get_bytes(key).await? {
            self.metrics.record_request("L1", "get", "hit");
            self.after_local_hit(key).await;
            return Ok(Some(bytes));
        }
        self.metrics.record_request("L1", "get", "miss");

        match self.shared.get_bytes(key).await? {
            Some(bytes) => {
                self.metrics.record_request("L2", "get", "hit");
                self.promote(key, &bytes).await;
                Ok(Some(bytes))
            }
            None => {
                self.metrics.record_request("L2", "get", "miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        self.local
            .put_bytes(key, value.clone(), Some(self.local_ttl(ttl)))
            .await?;
        self.shared
            .put_bytes(key, value, Some(self.shared_ttl(ttl)))
            .await?;
        self.after_write(key).await;
        Ok(())
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn put_if_absent_bytes(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
    ) -> Result<bool> {
        let local_written = self
            .local
            .put_if_absent_bytes(key, value.clone(), Some(self.local_ttl(ttl)))
            .await?;
        let shared_written = self
            .shared
            .put_if_absent_bytes(key, value, Some(self.shared_ttl(ttl)))
            .await?;
        if local_written != shared_written {
            warn!(
                "put_if_absent 两层结果不一致: key={}, local={}, shared={}",
                key, local_written, shared_written
            );
        }
        if shared_written {
            self.after_write(key).await;
        }
        Ok(local_written && shared_written)
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn evict(&self, key: &str) -> Result<()> {
        self.local.evict(key).await?;
        self.shared.evict(key).await?;
        self.after_write(key).await;
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn evict_many(&self, keys: &[String]) -> Result<()> {
        self.local.evict_many(keys).await?;
        self.shared.evict_many(keys).await?;
        for key in keys {
            self.after_write(key).await;
        }
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn clear(&self) -> Result<()> {
        self.local.clear().await?;
        self.shared.clear().await
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn multi_get_bytes(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = self.local.multi_get_bytes(keys).await?;
        let misses: Vec<String> = keys
            .iter()
            .filter(|key| !found.contains_key(*key))
            .cloned()
            .collect();
        if misses.is_empty() {
            return Ok(found);
        }

        let from_shared = self.shared.multi_get_bytes(&misses).await?;
        // 逐键回填，TTL与单键提升一致
        for (key, bytes) in &from_shared {
            self.promote(key, bytes).await;
        }
        debug!(
            "multi_get: local_hits={}, shared_hits={}",
            found.len(),
            from_shared.len()
        );
        found.extend(from_shared);
        Ok(found)
    }

    #[instrument(skip(self, items), level = "debug", fields(cache = %self.name, item_count = items.len()))]
    async fn multi_put_bytes(
        &self,
        items: HashMap<String, Vec<u8>>,
        ttl: Option<u64>,
    ) -> Result<()> {
        let keys: Vec<String> = items.keys().cloned().collect();
        self.local
            .multi_put_bytes(items.clone(), Some(self.local_ttl(ttl)))
            .await?;
        self.shared
            .multi_put_bytes(items, Some(self.shared_ttl(ttl)))
            .await?;
        for key in &keys {
            self.after_write(key).await;
        }
        Ok(())
    }

    /// 以共享层为准，共享层条目不过期时返回 `None`
    async fn get_expire(&self, key: &str) -> Result<Option<Duration>> {
        self.shared.get_expire(key).await
    }

    /// `ttl` 为0时移除共享层的过期时间，本地层改用 `local_ttl`
    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        let shared_updated = self.shared.expire(key, ttl).await?;
        self.local.expire(key, self.local_ttl(Some(ttl))).await?;
        Ok(shared_updated)
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        if self.local.has_key(key).await? {
            return Ok(true);
        }
        self.shared.has_key(key).await
    }

    async fn size(&self) -> Result<u64> {
        self.shared.size().await
    }

    async fn shutdown(&self) -> Result<()> {
        self.local.shutdown().await?;
        self.shared.shutdown().await
    }

    fn metrics(&self) -> Option<Arc<CacheMetrics>> {
        Some(self.metrics.clone())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::{CacheExt, LocalCache};
    use crate::config::SyncStrategy;
    use async_trait::async_trait;
    use std::sync::Mutex;

    fn config(local_ttl: u64, default_ttl: u64) -> MultiLevelConfig {
        MultiLevelConfig {
            local_ttl,
            default_ttl,
            ..Default::default()
        }
    }

    fn tiers() -> (Arc<LocalCache>, Arc<LocalCache>) {
        (
            Arc::new(LocalCache::new("l1", 100, 0)),
            Arc::new(LocalCache::new("l2", 100, 0)),
        )
    }

    #[tokio::test]
    async fn test_local_ttl_is_capped() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(10, 100));

        cache.put("k", &"v", Some(50)).await.unwrap();
        let local_left = local.get_expire("k").await.unwrap().unwrap();
        let shared_left = shared.get_expire("k").await.unwrap().unwrap();
        assert!(local_left <= Duration::from_secs(10));
        assert!(shared_left > Duration::from_secs(40));

        cache.put("short", &"v", Some(3)).await.unwrap();
        let local_left = local.get_expire("short").await.unwrap().unwrap();
        assert!(local_left <= Duration::from_secs(3));
    }

    #[tokio::test]
    async fn test_promotion_uses_remaining_shared_ttl() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(60, 100));

        shared.put("k", &1u32, Some(5)).await.unwrap();
        assert_eq!(cache.get::<u32>("k").await.unwrap(), Some(1));

        let local_left = local.get_expire("k").await.unwrap().unwrap();
        assert!(local_left <= Duration::from_secs(5));
    }

    #[tokio::test]
    async fn test_put_if_absent_is_conjunctive() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(10, 100));

        shared.put("k", &"old", None).await.unwrap();
        assert!(!cache.put_if_absent("k", &"new", None).await.unwrap());
        assert_eq!(shared.get::<String>("k").await.unwrap().as_deref(), Some("old"));
        // 本地层仍然被写入
        assert_eq!(local.get::<String>("k").await.unwrap().as_deref(), Some("new"));

        assert!(cache.put_if_absent("fresh", &"v", None).await.unwrap());
    }

    #[tokio::test]
    async fn test_multi_get_backfills_local() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(10, 100));

        local.put("a", &1u32, None).await.unwrap();
        shared.put("b", &2u32, None).await.unwrap();

        let keys = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let values: HashMap<String, u32> = cache.multi_get(&keys).await.unwrap();
        assert_eq!(values.len(), 2);
        assert_eq!(values["a"], 1);
        assert_eq!(values["b"], 2);
        assert!(local.has_key("b").await.unwrap());
    }

    #[tokio::test]
    async fn test_evict_and_size() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(10, 100));

        cache.put("a", &1u32, None).await.unwrap();
        cache.put("b", &2u32, None).await.unwrap();
        local.evict("b").await.unwrap();
        assert_eq!(cache.size().await.unwrap(), 2);

        cache.evict("a").await.unwrap();
        assert!(!local.has_key("a").await.unwrap());
        assert!(!shared.has_key("a").await.unwrap());
        assert_eq!(cache.size().await.unwrap(), 1);
    }

    #[tokio::test]
    async fn test_expire_applies_capped_ttl_locally() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(10, 100));

        cache.put("k", &1u32, None).await.unwrap();
        assert!(cache.expire("k", 50).await.unwrap());
        assert!(shared.get_expire("k").await.unwrap().unwrap() > Duration::from_secs(40));
        assert!(local.get_expire("k").await.unwrap().unwrap() <= Duration::from_secs(10));
        assert!(cache.get_expire("k").await.unwrap().unwrap() > Duration::from_secs(40));
    }

    #[tokio::test]
    async fn test_zero_ttl_keeps_local_copy_bounded() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(10, 100));

        cache.put("k", &1u32, Some(0)).await.unwrap();
        assert!(shared.get_expire("k").await.unwrap().is_none());
        assert!(local.get_expire("k").await.unwrap().unwrap() <= Duration::from_secs(10));
        assert!(cache.get_expire("k").await.unwrap().is_none());

        cache.put("p", &2u32, Some(50)).await.unwrap();
        assert!(cache.expire("p", 0).await.unwrap());
        assert!(shared.has_key("p").await.unwrap());
        assert!(shared.get_expire("p").await.unwrap().is_none());
        assert!(local.get_expire("p").await.unwrap().unwrap() <= Duration::from_secs(10));
    }

    #[tokio::test]
    async fn test_multi_get_backfill_uses_remaining_shared_ttl() {
        let (local, shared) = tiers();
        let cache = MultiLevelCache::new("ml", local.clone(), shared.clone(), config(60, 100));

        shared.put("b", &2u32, Some(5)).await.unwrap();
        let values: HashMap<String, u32> = cache.multi_get(&["b".to_string()]).await.unwrap();
        assert_eq!(values["b"], 2);

        let local_left = local.get_expire("b").await.unwrap().unwrap();
        let shared_left = shared.get_expire("b").await.unwrap().unwrap();
        assert!(local_left <= shared_left);
        assert!(local_left <= Duration::from_secs(5));
    }

    #[derive(Default)]
    struct RecordingSync {
        events: Mutex<Vec<(SyncDirection, String)>>,
    }

    #[async_trait]
    impl TierSync for RecordingSync {
        async fn sync_to_distributed(&self, key: &str) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push((SyncDirection::ToDistributed, key.to_string()));
            Ok(())
        }

        async fn sync_from_distributed(&self, key: &str) -> Result<()> {
            self.events
                .lock()
                .unwrap()
                .push((SyncDirection::FromDistributed, key.to_string()));
            Ok(())
        }
    }

    #[tokio::test]
    async fn test_sync_hooks_follow_strategy() {
        let (local, shared) = tiers();
        let recorder = Arc::new(RecordingSync::default());
        let mut cfg = config(10, 100);
        cfg.sync = SyncStrategy {
            sync_on_write: true,
            sync_on_read: true,
            sync_delay_ms: 0,
        };
        let cache =
            MultiLevelCache::new("ml", local, shared, cfg).with_sync(recorder.clone());

        cache.put("k", &1u32, None).await.unwrap();
        let _ = cache.get::<u32>("k").await.unwrap();
        cache.evict("k").await.unwrap();

        let events = recorder.events.lock().unwrap().clone();
        assert_eq!(
            events,
            vec![
                (SyncDirection::ToDistributed, "k".to_string()),
                (SyncDirection::FromDistributed, "k".to_string()),
                (SyncDirection::ToDistributed, "k".to_string()),
            ]
        );
    }

    #[tokio::test]
    async fn test_delayed_sync_runs_in_background() {
        let (local, shared) = tiers();
        let recorder = Arc::new(RecordingSync::default());
        let mut cfg = config(10, 100);
        cfg.sync = SyncStrategy {
            sync_on_write: true,
            sync_on_read: false,
            sync_delay_ms: 50,
        };
        let cache =
            MultiLevelCache::new("ml", local, shared, cfg).with_sync(recorder.clone());

        cache.put("k", &1u32, None).await.unwrap();
        assert!(recorder.events.lock().unwrap().is_empty());
        tokio::time::sleep(Duration::from_millis(200)).await;
        assert_eq!(recorder.events.lock().unwrap().len(), 1);
    }
}
