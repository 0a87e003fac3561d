//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了分布式锁的接口：按名称获取锁、有界等待、带租约自动过期、同一持有者可重入。

pub mod local;
pub mod redis;

use crate::error::Result;
use async_trait::async_trait;
use std::time::Duration;

pub use local::LocalLockProvider;
pub use redis::RedisLockProvider;

/// 击穿防护使用的锁名前缀
pub const LOCK_PREFIX: &str = "cache:lock:";

/// 由缓存键得到锁名
pub fn lock_token(key: &str) -> String {
    format!("{}{}", LOCK_PREFIX, key)
}

/// 分布式锁
///
/// 每个句柄有自己的持有者标识，同一句柄重复加锁会增加重入计数，
/// 需要相同次数的 `unlock` 才会真正释放。租约到期后锁自动失效，与持有者是否存活无关。
#[async_trait]
pub trait DistributedLock: Send + Sync {
    /// 锁名
    fn name(&self) -> &str;

    /// 在 `wait` 时间内尝试获取锁
    ///
    /// # 参数
    ///
    /// * `wait` - 最长等待时间
    /// * `lease` - 获取成功后的租约时长
    ///
    /// # 返回值
    ///
    /// 获取成功返回 true，等待超时返回 false
    async fn try_lock(&self, wait: Duration, lease: Duration) -> Result<bool>;

    /// 释放锁
    ///
    /// 当前句柄并不持有锁（例如租约已过期）时返回 [`crate::error::CacheError::Lock`]
    async fn unlock(&self) -> Result<()>;

    /// 是否有任何持有者持有该锁
    async fn is_locked(&self) -> Result<bool>;
}

/// 锁提供者
pub trait LockProvider: Send + Sync {
    /// 获取指定名称的锁句柄
    fn get_lock(&self, name: &str) -> Box<dyn DistributedLock>;
}
