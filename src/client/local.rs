//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了本地（进程内）缓存的实现。

use super::{CacheOps, Loader};
use crate::backend::l1::L1Backend;
use crate::error::{CacheError, Result, SharedError};
use crate::metrics::CacheMetrics;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::instrument;

/// 本地缓存实现
///
/// 仅使用内存缓存，读写都在进程内完成。
/// 未命中加载是按键单飞的：同一个键的并发加载只执行一次加载器。
pub struct LocalCache {
    /// 缓存名称
    name: String,
    /// L1缓存后端
    l1: L1Backend,
    /// 序列化器
    serializer: SerializerEnum,
    metrics: Arc<CacheMetrics>,
}

impl LocalCache {
    /// 创建新的本地缓存
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `capacity` - 最大条目数
    /// * `default_ttl` - 默认过期时间（秒），0表示不过期
    pub fn new(name: impl Into<String>, capacity: u64, default_ttl: u64) -> Self {
        Self::with_backend(name, L1Backend::new(capacity, default_ttl), SerializerEnum::default())
    }

    /// 使用已有后端与序列化器创建本地缓存
    pub fn with_backend(
        name: impl Into<String>,
        l1: L1Backend,
        serializer: SerializerEnum,
    ) -> Self {
        Self {
            name: name.into(),
            l1,
            serializer,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }
}

#[async_trait]
impl CacheOps for LocalCache {
    fn name(&self) -> &str {
        &self.name
    }

    fn serializer(&self) -> &SerializerEnum {
        &self.serializer
    }

    fn as_any(&self) -> &dyn std::any::Any {
        self
    }

    fn into_any_arc(self: Arc<Self>) -> Arc<dyn std::any::Any + Send + Sync> {
        self
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        match self.l1.get_bytes(key).await {
            Some(bytes) => {
                self.metrics.record_request("L1", "get", "hit");
                Ok(Some(bytes))
            }
            None => {
                self.metrics.record_request("L1", "get", "miss");
                Ok(None)
            }
        }
    }

    #[instrument(skip(self, loader), level = "debug", fields(cache = %self.name))]
    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: Loader<'_>,
    ) -> Result<Vec<u8>> {
        let start = Instant::now();
        let result = self
            .l1
            .get_or_try_insert_with(key, ttl, async move {
                loader.await.map_err(SharedError::from)
            })
            .await
            .map_err(|source| CacheError::Loader {
                key: key.to_string(),
                source,
            });
        self.metrics
            .record_duration("L1", "get_or_load", start.elapsed());
        let outcome = if result.is_ok() { "success" } else { "error" };
        self.metrics.record_request("L1", "get_or_load", outcome);
        result
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let start = Instant::now();
        self.l1.set_bytes(key, value, ttl).await;
        self.metrics.record_duration("L1", "put", start.elapsed());
        Ok(())
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn put_if_absent_bytes(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
    ) -> Result<bool> {
        Ok(self.l1.set_if_absent(key, value, ttl).await)
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn evict(&self, key: &str) -> Result<()> {
        self.l1.delete(key).await;
        self.metrics.record_request("L1", "evict", "success");
        Ok(())
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn clear(&self) -> Result<()> {
        self.l1.clear();
        self.metrics.record_request("L1", "clear", "success");
        Ok(())
    }

    async fn multi_get_bytes(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.l1.get_bytes(key).await {
                found.insert(key.clone(), bytes);
            }
        }
        self.metrics.record_request("L1", "multi_get", "success");
        Ok(found)
    }

    async fn get_expire(&self, key: &str) -> Result<Option<Duration>> {
        Ok(self
            .l1
            .get_entry(key)
            .await
            .and_then(|entry| entry.remaining()))
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        Ok(self.l1.expire(key, ttl).await)
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        Ok(self.l1.get_entry(key).await.is_some())
    }

    async fn size(&self) -> Result<u64> {
        Ok(self.l1.entry_count().await)
    }

    fn metrics(&self) -> Option<Arc<CacheMetrics>> {
        Some(self.metrics.clone())
    }
}
