//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L1缓存后端的实现，基于内存的高速缓存。

use crate::error::SharedError;
use moka::future::Cache;
use moka::ops::compute::{CompResult, Op};
use moka::Expiry;
use std::future::Future;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// L1缓存条目
///
/// 每个条目携带自己的TTL，由 [`EntryExpiry`] 交给 Moka 执行过期
#[derive(Clone, Debug)]
pub struct L1Entry {
    pub bytes: Vec<u8>,
    /// 过期时间，None表示不过期
    pub ttl: Option<Duration>,
    /// 写入时间
    pub written_at: Instant,
}

impl L1Entry {
    fn new(bytes: Vec<u8>, ttl: Option<Duration>) -> Self {
        Self {
            bytes,
            ttl,
            written_at: Instant::now(),
        }
    }

    /// 剩余存活时间
    pub fn remaining(&self) -> Option<Duration> {
        self.ttl
            .map(|ttl| ttl.saturating_sub(self.written_at.elapsed()))
    }
}

/// 按条目TTL过期的策略
struct EntryExpiry;

impl Expiry<String, L1Entry> for EntryExpiry {
    fn expire_after_create(
        &self,
        _key: &String,
        value: &L1Entry,
        _created_at: Instant,
    ) -> Option<Duration> {
        value.ttl
    }

    fn expire_after_update(
        &self,
        _key: &String,
        value: &L1Entry,
        _updated_at: Instant,
        _duration_until_expiry: Option<Duration>,
    ) -> Option<Duration> {
        value.ttl
    }
}

/// L1缓存后端实现
///
/// 基于内存的高速缓存实现，使用Moka作为底层缓存库。
/// 未命中加载通过 Moka 的 `try_get_with` 完成，同一个键在进程内只会加载一次。
#[derive(Clone)]
pub struct L1Backend {
    cache: Cache<String, L1Entry>,
    /// 默认TTL（秒），0表示不过期
    default_ttl: u64,
}

impl L1Backend {
    /// 创建新的L1缓存后端实例
    ///
    /// # 参数
    ///
    /// * `capacity` - 最大条目数
    /// * `default_ttl` - 默认过期时间（秒），0表示不过期
    pub fn new(capacity: u64, default_ttl: u64) -> Self {
        Self {
            cache: Cache::builder()
                .max_capacity(capacity)
                .expire_after(EntryExpiry)
                .build(),
            default_ttl,
        }
    }

    fn ttl_of(&self, ttl: Option<u64>) -> Option<Duration> {
        match ttl.unwrap_or(self.default_ttl) {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// 获取缓存条目
    #[instrument(skip(self), level = "debug")]
    pub async fn get_entry(&self, key: &str) -> Option<L1Entry> {
        let entry = self.cache.get(key).await;
        debug!("L1 get: key={}, found={}", key, entry.is_some());
        entry
    }

    /// 获取缓存值（字节形式）
    pub async fn get_bytes(&self, key: &str) -> Option<Vec<u8>> {
        self.get_entry(key).await.map(|entry| entry.bytes)
    }

    /// 设置缓存值（字节形式）
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值（字节数组）
    /// * `ttl` - 过期时间（秒），None表示使用默认值
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn set_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) {
        let entry = L1Entry::new(value, self.ttl_of(ttl));
        self.cache.insert(key.to_string(), entry).await;
    }

    /// 仅当键不存在时写入
    ///
    /// # 返回值
    ///
    /// 本次调用真正写入时返回 true
    #[instrument(skip(self, value), level = "debug")]
    pub async fn set_if_absent(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> bool {
        let entry = L1Entry::new(value, self.ttl_of(ttl));
        let result = self.cache.entry_by_ref(key).or_insert(entry).await;
        result.is_fresh()
    }

    /// 读取或加载缓存值
    ///
    /// 并发调用者对同一个缺失的键只会触发一次 `init`，其余调用者等待并共享结果
    #[instrument(skip(self, init), level = "debug")]
    pub async fn get_or_try_insert_with<F>(
        &self,
        key: &str,
        ttl: Option<u64>,
        init: F,
    ) -> std::result::Result<Vec<u8>, SharedError>
    where
        F: Future<Output = std::result::Result<Vec<u8>, SharedError>>,
    {
        let ttl = self.ttl_of(ttl);
        let entry = self
            .cache
            .try_get_with_by_ref(key, async move {
                init.await.map(|bytes| L1Entry::new(bytes, ttl))
            })
            .await
            .map_err(|e: std::sync::Arc<SharedError>| SharedError::clone(&e))?;
        Ok(entry.bytes)
    }

    /// 修改已存在键的过期时间
    ///
    /// # 返回值
    ///
    /// 键存在时返回 true
    ///
    /// 通过 Moka 的 `and_compute_with` 原地替换，不会覆盖并发写入的新值
    #[instrument(skip(self), level = "debug")]
    pub async fn expire(&self, key: &str, ttl: u64) -> bool {
        let ttl = self.ttl_of(Some(ttl));
        let result = self
            .cache
            .entry_by_ref(key)
            .and_compute_with(|current| {
                let op = match current {
                    Some(entry) => Op::Put(L1Entry::new(entry.into_value().bytes, ttl)),
                    None => Op::Nop,
                };
                std::future::ready(op)
            })
            .await;
        !matches!(result, CompResult::StillNone(_))
    }

    /// 删除缓存项
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &str) {
        self.cache.invalidate(key).await;
    }

    /// 清空 L1 缓存
    pub fn clear(&self) {
        debug!("L1 clear: 清空所有缓存项");
        self.cache.invalidate_all();
    }

    /// 当前条目数
    ///
    /// 先执行挂起的维护任务，使计数反映最近的写入与失效
    pub async fn entry_count(&self) -> u64 {
        self.cache.run_pending_tasks().await;
        self.cache.entry_count()
    }
}
