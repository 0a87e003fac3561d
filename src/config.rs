//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的配置结构和解析逻辑。

use crate::error::{CacheError, Result};
use secrecy::SecretString;
use serde::Deserialize;
use std::path::Path;

pub const CONFIG_VERSION: u32 = 1;

/// 单个TTL允许的最大值（30天）
const MAX_TTL_SECS: u64 = 86400 * 30;

#[derive(Debug, Deserialize, Clone, Default)]
pub struct Config {
    #[serde(default)]
    pub config_version: Option<u32>,
    #[serde(default)]
    pub global: GlobalConfig,
    #[serde(default)]
    pub l1: L1Config,
    #[serde(default)]
    pub l2: Option<L2Config>,
    #[serde(default)]
    pub multi_level: MultiLevelConfig,
    #[serde(default)]
    pub protection: ProtectionConfig,
    #[serde(default)]
    pub preheat: PreheatConfig,
}

/// 全局配置
///
/// 定义适用于所有缓存实例的默认配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct GlobalConfig {
    /// 默认的缓存过期时间（秒），作用于共享层
    pub default_ttl: u64,
    /// 管理器创建的缓存类型
    pub cache_type: CacheType,
    /// 序列化类型
    pub serialization: SerializationType,
    /// 是否压缩序列化结果
    pub compress: bool,
}

impl Default for GlobalConfig {
    fn default() -> Self {
        Self {
            default_ttl: 3600,
            cache_type: CacheType::MultiLevel,
            serialization: SerializationType::Json,
            compress: false,
        }
    }
}

/// 序列化类型枚举
#[derive(Deserialize, Clone, Debug, PartialEq, Default)]
#[serde(rename_all = "lowercase")]
pub enum SerializationType {
    /// JSON序列化
    #[default]
    Json,
}

/// 缓存类型枚举
///
/// 定义支持的缓存架构类型
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq, Default)]
#[serde(rename_all = "snake_case")]
pub enum CacheType {
    /// 仅本地缓存
    Local,
    /// 仅Redis共享缓存
    Redis,
    /// 多级缓存（本地 + Redis）
    #[default]
    MultiLevel,
}

impl std::fmt::Display for CacheType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CacheType::Local => write!(f, "local"),
            CacheType::Redis => write!(f, "redis"),
            CacheType::MultiLevel => write!(f, "multi_level"),
        }
    }
}

/// L1缓存配置
///
/// 定义内存缓存的相关配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct L1Config {
    /// 最大缓存条目数
    pub max_capacity: u64,
    /// 默认过期时间（秒），0表示不过期
    pub default_ttl: u64,
}

impl Default for L1Config {
    fn default() -> Self {
        Self {
            max_capacity: 10000,
            default_ttl: 300,
        }
    }
}

/// L2缓存配置
///
/// 定义分布式缓存（Redis）的相关配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct L2Config {
    /// Redis模式
    pub mode: RedisMode,
    /// 连接字符串
    pub connection_string: SecretString,
    /// 连接超时时间（毫秒）
    pub connection_timeout_ms: u64,
    /// 命令执行超时时间（毫秒）
    pub command_timeout_ms: u64,
    /// Redis 密码（可选，使用 SecretString 保护）
    pub password: Option<SecretString>,
    /// 是否启用 TLS
    pub enable_tls: bool,
    /// 集群配置
    pub cluster: Option<ClusterConfig>,
    /// L2缓存默认TTL（可选）
    pub default_ttl: Option<u64>,
    /// 所有键的命名空间前缀
    pub key_prefix: Option<String>,
}

impl Default for L2Config {
    fn default() -> Self {
        Self {
            mode: RedisMode::Standalone,
            connection_string: SecretString::new("redis://localhost:6379".to_string().into()),
            connection_timeout_ms: 5000,
            command_timeout_ms: 3000,
            password: None,
            enable_tls: false,
            cluster: None,
            default_ttl: Some(3600),
            key_prefix: None,
        }
    }
}

/// 集群配置
#[derive(Deserialize, Clone, Debug)]
pub struct ClusterConfig {
    /// 初始节点列表
    pub nodes: Vec<String>,
}

/// Redis模式枚举
#[derive(Deserialize, Clone, Copy, Debug, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum RedisMode {
    /// 单机模式
    Standalone,
    /// 集群模式
    Cluster,
}

/// 多级缓存配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct MultiLevelConfig {
    /// 本地层TTL上限（秒）
    pub local_ttl: u64,
    /// 未指定TTL时共享层使用的默认值（秒）
    pub default_ttl: u64,
    /// 本地层与共享层之间的同步策略
    pub sync: SyncStrategy,
}

impl Default for MultiLevelConfig {
    fn default() -> Self {
        Self {
            local_ttl: 300,
            default_ttl: 3600,
            sync: SyncStrategy::default(),
        }
    }
}

/// 同步策略
///
/// 仅为建议性配置：只有注入了具体的 `TierSync` 实现时才会产生效果
#[derive(Deserialize, Clone, Debug, Default, PartialEq, Eq)]
#[serde(default)]
pub struct SyncStrategy {
    /// 写入后是否同步到分布式层
    pub sync_on_write: bool,
    /// 本地命中后是否从分布式层校准
    pub sync_on_read: bool,
    /// 同步延迟（毫秒），0表示立即执行
    pub sync_delay_ms: u64,
}

/// 防护装饰器配置
#[derive(Deserialize, Clone, Debug, Default)]
#[serde(default)]
pub struct ProtectionConfig {
    pub avalanche: AvalancheConfig,
    pub penetration: PenetrationConfig,
    pub breakdown: BreakdownConfig,
}

/// 缓存雪崩防护配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct AvalancheConfig {
    pub enabled: bool,
    /// 抖动百分比，<= 0 表示不抖动
    pub jitter_percent: i64,
    /// 写入未指定TTL时用作抖动基准的TTL（秒）
    pub base_ttl: Option<u64>,
}

impl Default for AvalancheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            jitter_percent: 10,
            base_ttl: None,
        }
    }
}

/// 缓存穿透防护配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PenetrationConfig {
    pub enabled: bool,
    /// 空值标记的TTL（秒）
    pub null_ttl: u64,
}

impl Default for PenetrationConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            null_ttl: 60,
        }
    }
}

/// 缓存击穿防护配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct BreakdownConfig {
    pub enabled: bool,
    /// 获取锁的最长等待时间（毫秒）
    pub wait_time_ms: u64,
    /// 锁租约时间（毫秒），持有者崩溃后锁自动过期
    pub lease_time_ms: u64,
}

impl Default for BreakdownConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            wait_time_ms: 3000,
            lease_time_ms: 30000,
        }
    }
}

/// 缓存预热配置
#[derive(Deserialize, Clone, Debug)]
#[serde(default)]
pub struct PreheatConfig {
    /// 预热超时时间（秒）
    pub timeout_seconds: u64,
    /// 预热批次大小
    pub batch_size: usize,
    /// 预热批次间隔（毫秒）
    pub batch_interval_ms: u64,
    /// 预热数据的TTL（秒），None表示使用缓存默认值
    pub ttl: Option<u64>,
}

impl Default for PreheatConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: 300,
            batch_size: 100,
            batch_interval_ms: 0,
            ttl: None,
        }
    }
}

impl Config {
    /// 从TOML字符串解析配置
    pub fn from_toml_str(content: &str) -> Result<Self> {
        toml::from_str(content).map_err(|e| CacheError::ConfigError(e.to_string()))
    }

    /// 从TOML文件加载配置
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml_str(&content)
    }

    /// 共享层实际使用的默认TTL
    pub fn shared_ttl(&self) -> u64 {
        self.l2
            .as_ref()
            .and_then(|l2| l2.default_ttl)
            .unwrap_or(self.multi_level.default_ttl)
    }

    /// 验证配置
    ///
    /// 检查配置的有效性，确保所有必需的字段都已设置，并且值在合理范围内
    pub fn validate(&self) -> std::result::Result<(), String> {
        if let Some(version) = &self.config_version {
            if *version > CONFIG_VERSION {
                return Err(format!(
                    "Configuration version {} is not supported. Current version is {}.",
                    version, CONFIG_VERSION
                ));
            }
        }

        if self.global.default_ttl == 0 {
            return Err("Global default_ttl cannot be zero".to_string());
        }
        if self.global.default_ttl > MAX_TTL_SECS {
            return Err("Global default_ttl cannot exceed 30 days (2592000 seconds)".to_string());
        }

        if self.l1.max_capacity == 0 {
            return Err("L1 max_capacity cannot be zero".to_string());
        }
        if self.l1.max_capacity > 10_000_000 {
            return Err("L1 max_capacity cannot exceed 10,000,000".to_string());
        }

        match self.global.cache_type {
            CacheType::Local => {}
            CacheType::Redis | CacheType::MultiLevel => {
                let l2 = self.l2.as_ref().ok_or_else(|| {
                    format!("cache_type '{}' requires an [l2] section", self.global.cache_type)
                })?;
                if !(100..=30000).contains(&l2.connection_timeout_ms) {
                    return Err("L2 connection_timeout_ms must be between 100 and 30000 ms".to_string());
                }
                if !(100..=60000).contains(&l2.command_timeout_ms) {
                    return Err("L2 command_timeout_ms must be between 100 and 60000 ms".to_string());
                }
                if l2.mode == RedisMode::Cluster
                    && l2.cluster.as_ref().map_or(true, |c| c.nodes.is_empty())
                {
                    return Err("L2 cluster mode requires at least one cluster node".to_string());
                }
                if l2.default_ttl == Some(0) {
                    return Err("L2 default_ttl cannot be zero".to_string());
                }
            }
        }

        // 本地层TTL必须 <= 共享层TTL
        if self.global.cache_type == CacheType::MultiLevel {
            let ml = &self.multi_level;
            if ml.local_ttl == 0 {
                return Err("multi_level local_ttl cannot be zero".to_string());
            }
            let shared_ttl = self.shared_ttl();
            if ml.local_ttl > shared_ttl {
                return Err(format!(
                    "multi_level configuration error: local TTL ({}) must be <= shared TTL ({})",
                    ml.local_ttl, shared_ttl
                ));
            }
        }

        let avalanche = &self.protection.avalanche;
        if avalanche.jitter_percent > 100 {
            return Err("avalanche jitter_percent cannot exceed 100".to_string());
        }
        if avalanche.base_ttl == Some(0) {
            return Err("avalanche base_ttl cannot be zero".to_string());
        }

        let penetration = &self.protection.penetration;
        if penetration.enabled && penetration.null_ttl == 0 {
            return Err("penetration null_ttl cannot be zero when enabled".to_string());
        }

        let breakdown = &self.protection.breakdown;
        if breakdown.enabled {
            if breakdown.lease_time_ms == 0 {
                return Err("breakdown lease_time_ms cannot be zero when enabled".to_string());
            }
            if breakdown.wait_time_ms > 60_000 {
                return Err("breakdown wait_time_ms cannot exceed 60000 ms".to_string());
            }
        }

        if self.preheat.batch_size == 0 || self.preheat.batch_size > 10000 {
            return Err("preheat batch_size must be between 1 and 10000".to_string());
        }
        if self.preheat.timeout_seconds == 0 || self.preheat.timeout_seconds > 3600 {
            return Err("preheat timeout_seconds must be between 1 and 3600".to_string());
        }

        Ok(())
    }
}
