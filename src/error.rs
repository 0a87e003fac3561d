//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的错误类型和处理机制。

use std::sync::Arc;
use thiserror::Error;

/// 加载器返回的原始错误类型
pub type BoxError = Box<dyn std::error::Error + Send + Sync>;

/// 可在多个等待者之间共享的错误类型
///
/// 单飞加载时，同一个失败会被所有等待同一键的调用者观察到
pub type SharedError = Arc<dyn std::error::Error + Send + Sync>;

/// 缓存系统错误类型枚举
///
/// 调用方应将任何错误视为“本次请求缓存未命中，回源处理”，而不是静默成功
#[derive(Error, Debug)]
pub enum CacheError {
    /// 序列化错误
    #[error("Serialization error: {0}")]
    Serialization(String),

    /// 分布式锁获取或释放失败
    #[error("Lock error: {0}")]
    Lock(String),

    /// 在等待时间内未能获取分布式锁
    #[error("Timed out after {wait_ms}ms waiting for lock on key '{key}'")]
    LockTimeout { key: String, wait_ms: u64 },

    /// 加载器执行失败，保留原始错误
    #[error("Loader failed for key '{key}': {source}")]
    Loader {
        key: String,
        #[source]
        source: SharedError,
    },

    /// 键已被确认在数据源中不存在（空值标记仍在有效期内）
    #[error("Key '{0}' is cached as absent")]
    CachedAbsent(String),

    /// 缓存预热失败
    #[error("Preheat failed: {0}")]
    Preheat(String),

    /// L1缓存操作失败
    #[error("L1 operation failed: {0}")]
    L1Error(String),

    /// L2缓存操作失败
    #[error("L2 operation failed: {0}")]
    L2Error(String),

    /// 配置错误
    #[error("Configuration error: {0}")]
    ConfigError(String),

    /// 操作不支持
    #[error("Operation not supported: {0}")]
    NotSupported(String),

    /// Redis错误
    #[error("Redis error: {0}")]
    RedisError(#[from] redis::RedisError),

    /// IO错误
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    /// 超时错误
    #[error("Timeout error: {0}")]
    Timeout(String),

    /// 关闭错误
    #[error("Shutdown error: {0}")]
    ShutdownError(String),
}

impl CacheError {
    /// 将加载器错误包装为缓存错误
    pub fn loader(key: &str, source: BoxError) -> Self {
        CacheError::Loader {
            key: key.to_string(),
            source: Arc::from(source),
        }
    }

    /// 是否为锁相关错误（包括等待超时）
    pub fn is_lock_error(&self) -> bool {
        matches!(self, CacheError::Lock(_) | CacheError::LockTimeout { .. })
    }
}

/// 缓存操作结果类型别名
///
/// 简化错误处理，所有缓存操作都返回此类型
pub type Result<T> = std::result::Result<T, CacheError>;
