//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存击穿防护：热点键失效时，只允许一个调用者回源，其他调用者等待后读取结果。

use crate::client::{CacheOps, Loader, Lookup, OptionalLoader};
use crate::config::BreakdownConfig;
use crate::error::{CacheError, Result};
use crate::lock::{lock_token, DistributedLock, LockProvider};
use crate::metrics::CacheMetrics;
use crate::serialization::SerializerEnum;
use async_trait::async_trait;
use std::cell::RefCell;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, instrument, warn};

tokio::task_local! {
    /// 当前任务已持有的键锁
    static HELD_LOCKS: RefCell<HashMap<String, Arc<dyn DistributedLock>>>;
}

/// 击穿防护装饰器
///
/// 流程：快速路径读取 → 获取 `cache:lock:{key}` 锁（有界等待、带租约）→ 再次检查 →
/// 回源并写入 → 释放锁。等待超时返回 [`CacheError::LockTimeout`]。
pub struct BreakdownProtection {
    inner: Arc<dyn CacheOps>,
    locks: Arc<dyn LockProvider>,
    config: BreakdownConfig,
}

impl BreakdownProtection {
    pub fn new(
        inner: Arc<dyn CacheOps>,
        locks: Arc<dyn LockProvider>,
        config: BreakdownConfig,
    ) -> Self {
        Self {
            inner,
            locks,
            config,
        }
    }

    pub fn inner(&self) -> &Arc<dyn CacheOps> {
        &self.inner
    }

    /// 在键锁内执行 `body`，无论结果如何都会释放锁
    ///
    /// 同一任务内的加载器再次进入同一个键时复用外层的锁句柄，依靠锁的重入计数通过，
    /// 不会等到 `LockTimeout`。
    async fn with_lock<T, F, Fut>(&self, key: &str, body: F) -> Result<T>
    where
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = Result<T>> + Send,
        T: Send,
    {
        let token = lock_token(key);
        let held = HELD_LOCKS
            .try_with(|held| held.borrow().get(&token).cloned())
            .ok()
            .flatten();
        let reentered = held.is_some();
        let lock: Arc<dyn DistributedLock> =
            held.unwrap_or_else(|| Arc::from(self.locks.get_lock(&token)));
        let wait = Duration::from_millis(self.config.wait_time_ms);
        let lease = Duration::from_millis(self.config.lease_time_ms);

        if !lock.try_lock(wait, lease).await? {
            warn!("breakdown: 等待锁超时 key={}, wait_ms={}", key, self.config.wait_time_ms);
            return Err(CacheError::LockTimeout {
                key: key.to_string(),
                wait_ms: self.config.wait_time_ms,
            });
        }

        let in_scope = HELD_LOCKS.try_with(|_| ()).is_ok();
        let result = if reentered {
            body().await
        } else if in_scope {
            HELD_LOCKS.with(|held| held.borrow_mut().insert(token.clone(), lock.clone()));
            let result = body().await;
            HELD_LOCKS.with(|held| held.borrow_mut().remove(&token));
            result
        } else {
            let held = HashMap::from([(token.clone(), lock.clone())]);
            HELD_LOCKS.scope(RefCell::new(held), body()).await
        };

        if let Err(e) = lock.unlock().await {
            warn!("breakdown: 释放锁失败（租约可能已过期） key={}, error={}", key, e);
        }
        result
    }
}

#[async_trait]
impl CacheOps for BreakdownProtection {
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

    #[instrument(skip(self, loader), level = "debug", fields(cache = %self.inner.name()))]
    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: Loader<'_>,
    ) -> Result<Vec<u8>> {
        if let Some(bytes) = self.inner.get_bytes(key).await? {
            return Ok(bytes);
        }

        self.with_lock(key, || async move {
            if let Some(bytes) = self.inner.get_bytes(key).await? {
                debug!("breakdown: 二次检查命中 key={}", key);
                return Ok(bytes);
            }
            let bytes = loader.await.map_err(|e| CacheError::loader(key, e))?;
            self.inner.put_bytes(key, bytes.clone(), ttl).await?;
            debug!("breakdown: 回源完成 key={}", key);
            Ok(bytes)
        })
        .await
    }

    #[instrument(skip(self, loader), level = "debug", fields(cache = %self.inner.name()))]
    async fn load_optional_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: OptionalLoader<'_>,
    ) -> Result<Lookup<Vec<u8>>> {
        if let Some(bytes) = self.inner.get_bytes(key).await? {
            if crate::client::is_null_marker(&bytes) {
                return Ok(Lookup::CachedAbsent);
            }
            return Ok(Lookup::Present(bytes));
        }

        self.with_lock(key, || async move {
            self.inner.load_optional_bytes(key, ttl, loader).await
        })
        .await
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
