//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存预热功能：按批次从数据源加载热点键并批量写入缓存。

use crate::client::CacheOps;
use crate::config::PreheatConfig;
use crate::error::{BoxError, CacheError, Result};
use crate::serialization::Serializer;
use serde::Serialize;
use std::collections::HashMap;
use std::future::Future;
use std::time::Duration;
use tracing::{debug, info, warn};

/// 预热结果
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct PreheatResult {
    /// 成功写入的键数量
    pub loaded: usize,
    /// 加载或写入失败的键数量
    pub failed: usize,
}

impl PreheatResult {
    pub fn is_complete(&self) -> bool {
        self.failed == 0
    }
}

/// 缓存预热器
pub struct Preheater {
    config: PreheatConfig,
}

impl Preheater {
    pub fn new(config: PreheatConfig) -> Self {
        Self { config }
    }

    /// 执行预热
    ///
    /// 键按 `batch_size` 分批交给 `load_fn`，返回的数据通过 `multi_put_bytes` 写入缓存。
    /// 数据源没有返回的键计为失败。
    ///
    /// # 错误
    ///
    /// 超过 `timeout_seconds`，或者有键需要加载但一个都没有成功时，返回 [`CacheError::Preheat`]
    pub async fn run<F, Fut>(
        &self,
        cache: &dyn CacheOps,
        keys: Vec<String>,
        load_fn: F,
    ) -> Result<PreheatResult>
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<HashMap<String, Vec<u8>>, BoxError>> + Send,
    {
        info!(
            "Starting cache preheat for cache: {}, keys: {}",
            cache.name(),
            keys.len()
        );
        let limit = Duration::from_secs(self.config.timeout_seconds);
        let result = tokio::time::timeout(limit, self.run_batches(cache, &keys, &load_fn))
            .await
            .map_err(|_| {
                warn!(
                    "Cache preheat timed out after {} seconds",
                    self.config.timeout_seconds
                );
                CacheError::Preheat(format!(
                    "timed out after {} seconds",
                    self.config.timeout_seconds
                ))
            })?;

        if result.loaded == 0 && result.failed > 0 {
            return Err(CacheError::Preheat(format!(
                "all {} keys failed to load",
                result.failed
            )));
        }
        info!(
            "Cache preheat completed: loaded={}, failed={}",
            result.loaded, result.failed
        );
        Ok(result)
    }

    /// 执行预热（类型化），值通过缓存自身的序列化器编码
    pub async fn run_typed<T, F, Fut>(
        &self,
        cache: &dyn CacheOps,
        keys: Vec<String>,
        load_fn: F,
    ) -> Result<PreheatResult>
    where
        T: Serialize + Send,
        F: Fn(Vec<String>) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<HashMap<String, T>, BoxError>> + Send,
    {
        let serializer = cache.serializer().clone();
        let load_fn = &load_fn;
        let serializer = &serializer;
        self.run(cache, keys, move |batch| async move {
            let values = load_fn(batch).await?;
            let mut encoded = HashMap::with_capacity(values.len());
            for (key, value) in values {
                let bytes = serializer
                    .serialize(&value)
                    .map_err(|e| -> BoxError { Box::new(e) })?;
                encoded.insert(key, bytes);
            }
            Ok::<_, BoxError>(encoded)
        })
        .await
    }

    async fn run_batches<F, Fut>(
        &self,
        cache: &dyn CacheOps,
        keys: &[String],
        load_fn: &F,
    ) -> PreheatResult
    where
        F: Fn(Vec<String>) -> Fut + Send + Sync,
        Fut: Future<Output = std::result::Result<HashMap<String, Vec<u8>>, BoxError>> + Send,
    {
        let mut result = PreheatResult::default();
        let batch_size = self.config.batch_size.max(1);

        for (index, chunk) in keys.chunks(batch_size).enumerate() {
            if index > 0 && self.config.batch_interval_ms > 0 {
                tokio::time::sleep(Duration::from_millis(self.config.batch_interval_ms)).await;
            }

            let data = match load_fn(chunk.to_vec()).await {
                Ok(data) => data,
                Err(e) => {
                    warn!("Failed to load preheat batch {}: {}", index, e);
                    result.failed += chunk.len();
                    continue;
                }
            };
            let loaded = data.len().min(chunk.len());
            if let Err(e) = cache.multi_put_bytes(data, self.config.ttl).await {
                warn!("Failed to write preheat batch {}: {}", index, e);
                result.failed += chunk.len();
                continue;
            }
            result.loaded += loaded;
            result.failed += chunk.len() - loaded;
            debug!("Preheat batch {} done: loaded={}", index, loaded);
        }
        result
    }
}
