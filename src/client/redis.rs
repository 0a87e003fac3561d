//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的共享缓存实现。

use super::CacheOps;
use crate::backend::l2::L2Backend;
use crate::error::Result;
use crate::metrics::CacheMetrics;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument, warn};

/// 缓存名中需要转义的字符：分隔符、转义符本身与 glob 元字符
const NAME_ESCAPES: &[char] = &[':', '%', '*', '?', '[', ']', '\\'];

/// 由全局前缀与缓存名得到命名空间
///
/// 缓存名中的 `:` 等字符按百分号编码，保证 `users` 与 `users:archive`
/// 的键空间互不包含。
fn namespace_of(key_prefix: Option<&str>, name: &str) -> String {
    let mut encoded = String::with_capacity(name.len());
    for ch in name.chars() {
        if NAME_ESCAPES.contains(&ch) {
            encoded.push_str(&format!("%{:02X}", ch as u32));
        } else {
            encoded.push(ch);
        }
    }
    match key_prefix {
        Some(prefix) if !prefix.is_empty() => format!("{}:{}", prefix, encoded),
        _ => encoded,
    }
}

/// 转义 SCAN MATCH 模式中的 glob 元字符
fn escape_glob(literal: &str) -> String {
    let mut escaped = String::with_capacity(literal.len());
    for ch in literal.chars() {
        if matches!(ch, '*' | '?' | '[' | ']' | '\\') {
            escaped.push('\\');
        }
        escaped.push(ch);
    }
    escaped
}

/// Redis 共享缓存实现
///
/// 所有键都带有 `{namespace}:` 前缀，多个缓存可以共用同一个Redis连接而互不干扰
pub struct RedisCache {
    /// 缓存名称
    name: String,
    /// 键前缀，形如 `prefix:name`
    namespace: String,
    /// L2缓存后端
    l2: Arc<L2Backend>,
    /// 默认TTL（秒）
    default_ttl: u64,
    /// 序列化器
    serializer: SerializerEnum,
    metrics: Arc<CacheMetrics>,
}

impl RedisCache {
    /// 创建新的Redis缓存
    ///
    /// # 参数
    ///
    /// * `name` - 缓存名称
    /// * `l2` - 共享的Redis后端
    /// * `default_ttl` - 默认过期时间（秒），0表示不过期
    /// * `key_prefix` - 可选的全局键前缀
    pub fn new(
        name: impl Into<String>,
        l2: Arc<L2Backend>,
        default_ttl: u64,
        key_prefix: Option<&str>,
        serializer: SerializerEnum,
    ) -> Self {
        let name = name.into();
        let namespace = namespace_of(key_prefix, &name);
        Self {
            name,
            namespace,
            l2,
            default_ttl,
            serializer,
            metrics: Arc::new(CacheMetrics::new()),
        }
    }

    /// 带命名空间的完整键
    fn full_key(&self, key: &str) -> String {
        format!("{}:{}", self.namespace, key)
    }

    /// 匹配本缓存所有键的 SCAN 模式
    fn scan_pattern(&self) -> String {
        format!("{}:*", escape_glob(&self.namespace))
    }

    fn ttl_or_default(&self, ttl: Option<u64>) -> u64 {
        ttl.unwrap_or(self.default_ttl)
    }

    /// 获取底层后端
    pub fn backend(&self) -> &Arc<L2Backend> {
        &self.l2
    }

    /// 检查连接是否正常
    pub async fn ping(&self) -> Result<()> {
        self.l2.ping().await
    }
}

#[async_trait]
impl CacheOps for RedisCache {
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
        let start = Instant::now();
        let result = self.l2.get_bytes(&self.full_key(key)).await;
        self.metrics.record_duration("L2", "get", start.elapsed());
        match &result {
            Ok(Some(_)) => self.metrics.record_request("L2", "get", "hit"),
            Ok(None) => self.metrics.record_request("L2", "get", "miss"),
            Err(e) => {
                warn!("L2 get failed: key={}, error={}", key, e);
                self.metrics.record_request("L2", "get", "error");
            }
        }
        result
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()> {
        let start = Instant::now();
        let result = self
            .l2
            .set_bytes(&self.full_key(key), &value, self.ttl_or_default(ttl))
            .await;
        self.metrics.record_duration("L2", "put", start.elapsed());
        if let Err(e) = &result {
            warn!("L2 put failed: key={}, error={}", key, e);
            self.metrics.record_request("L2", "put", "error");
        }
        result
    }

    #[instrument(skip(self, value), level = "debug", fields(cache = %self.name))]
    async fn put_if_absent_bytes(
        &self,
        key: &str,
        value: Vec<u8>,
        ttl: Option<u64>,
    ) -> Result<bool> {
        self.l2
            .set_nx_bytes(&self.full_key(key), &value, self.ttl_or_default(ttl))
            .await
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn evict(&self, key: &str) -> Result<()> {
        self.l2.delete(&self.full_key(key)).await?;
        self.metrics.record_request("L2", "evict", "success");
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn evict_many(&self, keys: &[String]) -> Result<()> {
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        self.l2.delete_many(&full).await
    }

    #[instrument(skip(self), level = "debug", fields(cache = %self.name))]
    async fn clear(&self) -> Result<()> {
        self.l2.clear(&self.scan_pattern()).await?;
        debug!("Redis cache cleared: namespace={}", self.namespace);
        Ok(())
    }

    #[instrument(skip(self, keys), level = "debug", fields(cache = %self.name, key_count = keys.len()))]
    async fn multi_get_bytes(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let full: Vec<String> = keys.iter().map(|k| self.full_key(k)).collect();
        let values = self.l2.get_many(&full).await?;
        let found: HashMap<String, Vec<u8>> = keys
            .iter()
            .zip(values)
            .filter_map(|(key, value)| value.map(|bytes| (key.clone(), bytes)))
            .collect();
        self.metrics.record_request("L2", "multi_get", "success");
        Ok(found)
    }

    #[instrument(skip(self, items), level = "debug", fields(cache = %self.name, item_count = items.len()))]
    async fn multi_put_bytes(
        &self,
        items: HashMap<String, Vec<u8>>,
        ttl: Option<u64>,
    ) -> Result<()> {
        let ttl = self.ttl_or_default(ttl);
        let batch = items
            .into_iter()
            .map(|(key, value)| (self.full_key(&key), value, ttl))
            .collect();
        self.l2.set_many(batch).await
    }

    async fn get_expire(&self, key: &str) -> Result<Option<Duration>> {
        self.l2.pttl(&self.full_key(key)).await
    }

    async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        self.l2.expire(&self.full_key(key), ttl).await
    }

    async fn has_key(&self, key: &str) -> Result<bool> {
        self.l2.exists(&self.full_key(key)).await
    }

    async fn size(&self) -> Result<u64> {
        self.l2.count(&self.scan_pattern()).await
    }

    fn metrics(&self) -> Option<Arc<CacheMetrics>> {
        Some(self.metrics.clone())
    }
}
