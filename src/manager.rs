//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存管理器，负责按名称创建、注册和销毁缓存实例。

use crate::backend::{l1::L1Backend, l2::L2Backend};
use crate::client::{CacheOps, LocalCache, MultiLevelCache, RedisCache};
use crate::config::{CacheType, Config, L1Config, MultiLevelConfig, ProtectionConfig};
use crate::error::{CacheError, Result};
use crate::lock::{LocalLockProvider, LockProvider, RedisLockProvider};
use crate::protection::protect;
use crate::serialization::SerializerEnum;
use dashmap::DashMap;
use std::sync::Arc;
use tracing::{debug, info, instrument, warn};

/// 缓存工厂
///
/// 管理器通过工厂构造新的缓存实例，工厂决定缓存的类型和防护层
pub trait CacheFactory: Send + Sync {
    fn cache_type(&self) -> CacheType;

    fn create(&self, name: &str) -> Result<Arc<dyn CacheOps>>;
}

/// 本地缓存工厂
pub struct LocalCacheFactory {
    l1: L1Config,
    serializer: SerializerEnum,
    protection: ProtectionConfig,
    locks: Arc<dyn LockProvider>,
}

impl LocalCacheFactory {
    pub fn new(l1: L1Config, serializer: SerializerEnum, protection: ProtectionConfig) -> Self {
        Self {
            l1,
            serializer,
            protection,
            locks: Arc::new(LocalLockProvider::new()),
        }
    }
}

impl CacheFactory for LocalCacheFactory {
    fn cache_type(&self) -> CacheType {
        CacheType::Local
    }

    fn create(&self, name: &str) -> Result<Arc<dyn CacheOps>> {
        let backend = L1Backend::new(self.l1.max_capacity, self.l1.default_ttl);
        let cache: Arc<dyn CacheOps> = Arc::new(LocalCache::with_backend(
            name,
            backend,
            self.serializer.clone(),
        ));
        Ok(protect(cache, &self.protection, Some(self.locks.clone())))
    }
}

/// Redis缓存工厂，所有实例共用同一个连接
pub struct RedisCacheFactory {
    l2: Arc<L2Backend>,
    default_ttl: u64,
    key_prefix: Option<String>,
    serializer: SerializerEnum,
    protection: ProtectionConfig,
    locks: Arc<dyn LockProvider>,
}

impl RedisCacheFactory {
    pub fn new(
        l2: Arc<L2Backend>,
        default_ttl: u64,
        key_prefix: Option<String>,
        serializer: SerializerEnum,
        protection: ProtectionConfig,
    ) -> Self {
        let locks: Arc<dyn LockProvider> = Arc::new(RedisLockProvider::new(l2.clone()));
        Self {
            l2,
            default_ttl,
            key_prefix,
            serializer,
            protection,
            locks,
        }
    }

    fn build(&self, name: &str) -> Arc<dyn CacheOps> {
        Arc::new(RedisCache::new(
            name,
            self.l2.clone(),
            self.default_ttl,
            self.key_prefix.as_deref(),
            self.serializer.clone(),
        ))
    }
}

impl CacheFactory for RedisCacheFactory {
    fn cache_type(&self) -> CacheType {
        CacheType::Redis
    }

    fn create(&self, name: &str) -> Result<Arc<dyn CacheOps>> {
        Ok(protect(
            self.build(name),
            &self.protection,
            Some(self.locks.clone()),
        ))
    }
}

/// 多级缓存工厂
///
/// 本地层不加防护，防护层包在组合后的多级缓存外面
pub struct MultiLevelCacheFactory {
    l1: L1Config,
    shared: RedisCacheFactory,
    multi_level: MultiLevelConfig,
}

impl MultiLevelCacheFactory {
    pub fn new(l1: L1Config, shared: RedisCacheFactory, multi_level: MultiLevelConfig) -> Self {
        Self {
            l1,
            shared,
            multi_level,
        }
    }
}

impl CacheFactory for MultiLevelCacheFactory {
    fn cache_type(&self) -> CacheType {
        CacheType::MultiLevel
    }

    fn create(&self, name: &str) -> Result<Arc<dyn CacheOps>> {
        let local: Arc<dyn CacheOps> = Arc::new(LocalCache::with_backend(
            name,
            L1Backend::new(self.l1.max_capacity, self.multi_level.local_ttl),
            self.shared.serializer.clone(),
        ));
        let cache: Arc<dyn CacheOps> = Arc::new(MultiLevelCache::new(
            name,
            local,
            self.shared.build(name),
            self.multi_level.clone(),
        ));
        Ok(protect(
            cache,
            &self.shared.protection,
            Some(self.shared.locks.clone()),
        ))
    }
}

/// 缓存管理器
///
/// 名称到缓存实例的注册表。同一个名称的并发首次访问只会构造一个实例。
pub struct CacheManager {
    caches: DashMap<String, Arc<dyn CacheOps>>,
    factory: Arc<dyn CacheFactory>,
}

impl CacheManager {
    pub fn new(factory: Arc<dyn CacheFactory>) -> Self {
        Self {
            caches: DashMap::new(),
            factory,
        }
    }

    /// 根据配置构建管理器
    ///
    /// 先校验配置，需要Redis时只建立一次连接，所有缓存共用
    #[instrument(skip(config), level = "info", fields(cache_type = %config.global.cache_type))]
    pub async fn from_config(config: &Config) -> Result<Self> {
        config.validate().map_err(CacheError::ConfigError)?;

        let serializer = SerializerEnum::from_config(&config.global);
        let cache_type = config.global.cache_type;

        let factory: Arc<dyn CacheFactory> = match cache_type {
            CacheType::Local => Arc::new(LocalCacheFactory::new(
                config.l1.clone(),
                serializer,
                config.protection.clone(),
            )),
            CacheType::Redis | CacheType::MultiLevel => {
                let l2_config = config.l2.as_ref().ok_or_else(|| {
                    CacheError::ConfigError(format!("缺少{}所需的L2配置", cache_type))
                })?;
                let l2 = Arc::new(L2Backend::new(l2_config).await?);
                let shared_ttl = if cache_type == CacheType::MultiLevel {
                    config.shared_ttl()
                } else {
                    l2_config.default_ttl.unwrap_or(config.global.default_ttl)
                };
                let redis = RedisCacheFactory::new(
                    l2,
                    shared_ttl,
                    l2_config.key_prefix.clone(),
                    serializer,
                    config.protection.clone(),
                );
                if cache_type == CacheType::Redis {
                    Arc::new(redis)
                } else {
                    Arc::new(MultiLevelCacheFactory::new(
                        config.l1.clone(),
                        redis,
                        config.multi_level.clone(),
                    ))
                }
            }
        };

        info!("CacheManager initialized, cache_type={}", cache_type);
        Ok(Self::new(factory))
    }

    /// 获取缓存，不存在时原子地创建并注册
    pub fn get_cache(&self, name: &str) -> Result<Arc<dyn CacheOps>> {
        if let Some(cache) = self.caches.get(name) {
            return Ok(cache.value().clone());
        }
        let entry = self
            .caches
            .entry(name.to_string())
            .or_try_insert_with(|| {
                debug!("创建缓存: {}", name);
                self.factory.create(name)
            })?;
        Ok(entry.value().clone())
    }

    /// 无条件重新创建缓存，替换同名的旧实例
    pub fn create_cache(&self, name: &str) -> Result<Arc<dyn CacheOps>> {
        let cache = self.factory.create(name)?;
        if self
            .caches
            .insert(name.to_string(), cache.clone())
            .is_some()
        {
            debug!("缓存已替换: {}", name);
        }
        Ok(cache)
    }

    /// 移除缓存并清空其内容，名称不存在时什么也不做
    #[instrument(skip(self), level = "info")]
    pub async fn destroy_cache(&self, name: &str) -> Result<()> {
        let Some((_, cache)) = self.caches.remove(name) else {
            return Ok(());
        };
        cache.clear().await?;
        info!("缓存已销毁: {}", name);
        Ok(())
    }

    pub fn get_cache_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self.caches.iter().map(|e| e.key().clone()).collect();
        names.sort();
        names
    }

    /// 已注册缓存的类型，名称不存在时返回 `None`
    pub fn get_cache_type(&self, name: &str) -> Option<CacheType> {
        self.caches
            .contains_key(name)
            .then(|| self.factory.cache_type())
    }

    /// 新建缓存使用的类型
    pub fn cache_type(&self) -> CacheType {
        self.factory.cache_type()
    }

    /// 汇总所有缓存的指标文本
    pub fn metrics_report(&self) -> String {
        let mut caches: Vec<(String, Arc<dyn CacheOps>)> = self
            .caches
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        caches.sort_by(|a, b| a.0.cmp(&b.0));

        caches
            .into_iter()
            .filter_map(|(name, cache)| cache.metrics().map(|m| m.render(&name)))
            .collect()
    }

    /// 关闭所有缓存并清空注册表
    #[instrument(skip(self), level = "info")]
    pub async fn shutdown(&self) -> Result<()> {
        info!("开始关闭所有缓存...");
        let caches: Vec<(String, Arc<dyn CacheOps>)> = self
            .caches
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();
        self.caches.clear();

        let mut errors = Vec::new();
        for (name, cache) in caches {
            if let Err(e) = cache.shutdown().await {
                warn!("关闭缓存 {} 时出错: {}", name, e);
                errors.push(format!("{}: {}", name, e));
            }
        }

        if errors.is_empty() {
            info!("所有缓存已成功关闭");
            Ok(())
        } else {
            Err(CacheError::ShutdownError(format!(
                "部分缓存关闭失败: {}",
                errors.join(", ")
            )))
        }
    }
}
