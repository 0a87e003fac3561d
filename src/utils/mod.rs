//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 统一工具模块
//!
//! 提供测试、基准与命令行共用的工具函数，包括：
//! - 日志设置工具
//! - 配置创建工具
//! - Redis连接检查工具
//! - 缓存名称生成工具

use crate::config::{CacheType, ClusterConfig, Config, L2Config, RedisMode};
use secrecy::SecretString;
use std::sync::Once;
use std::time::Duration;
use tracing_subscriber::fmt::format::FmtSpan;
use tracing_subscriber::EnvFilter;

static INIT: Once = Once::new();

/// 默认的本地 Redis 地址
pub const DEFAULT_REDIS_URL: &str = "redis://127.0.0.1:6379";

/// 初始化控制台日志，重复调用无副作用
pub fn setup_logging() {
    INIT.call_once(|| {
        tracing_subscriber::fmt()
            .with_span_events(FmtSpan::CLOSE)
            .with_env_filter(
                EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("debug")),
            )
            .try_init()
            .ok();
    });
}

/// 创建独立的Redis配置
pub fn create_standalone_config(url: &str) -> L2Config {
    L2Config {
        mode: RedisMode::Standalone,
        connection_string: SecretString::from(url.to_string()),
        ..Default::default()
    }
}

/// 创建Redis集群配置
pub fn create_cluster_config(nodes: &[&str]) -> L2Config {
    L2Config {
        mode: RedisMode::Cluster,
        cluster: Some(ClusterConfig {
            nodes: nodes.iter().map(|n| n.to_string()).collect(),
        }),
        ..Default::default()
    }
}

/// 创建默认的多级缓存配置
pub fn create_multi_level_config(url: &str) -> Config {
    let mut config = Config::default();
    config.global.cache_type = CacheType::MultiLevel;
    config.l2 = Some(create_standalone_config(url));
    config
}

/// 检查指定URL的Redis是否可用
pub async fn is_redis_available_url(url: &str) -> bool {
    let client = match redis::Client::open(url) {
        Ok(c) => c,
        Err(_) => return false,
    };

    match tokio::time::timeout(
        Duration::from_secs(1),
        client.get_multiplexed_async_connection(),
    )
    .await
    {
        Ok(Ok(_)) => true,
        Ok(Err(_)) | Err(_) => false,
    }
}

/// 生成唯一的缓存名称
pub fn generate_unique_name(base: &str) -> String {
    format!("{}_{}", base, uuid::Uuid::new_v4().simple())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_unique_names_differ() {
        let a = generate_unique_name("users");
        let b = generate_unique_name("users");
        assert!(a.starts_with("users_"));
        assert_ne!(a, b);
    }

    #[test]
    fn test_multi_level_config_is_valid() {
        let config = create_multi_level_config(DEFAULT_REDIS_URL);
        assert_eq!(config.global.cache_type, CacheType::MultiLevel);
        assert!(config.validate().is_ok());
    }
}
