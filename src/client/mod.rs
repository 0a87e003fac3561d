//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了统一的缓存契约：原始字节接口 [`CacheOps`] 与类型化扩展 [`CacheExt`]。
//! 本地缓存、Redis 缓存、多级缓存以及各类防护装饰器都实现同一个 [`CacheOps`]，
//! 因此可以任意嵌套组合。

pub mod local;
pub mod multi_level;
pub mod redis;

use crate::error::{BoxError, CacheError, Result};
use crate::metrics::CacheMetrics;
use crate::serialization::{Serializer, SerializerEnum};
use async_trait::async_trait;
use futures::future::BoxFuture;
use serde::{de::DeserializeOwned, Serialize};
use std::any::Any;
use std::collections::HashMap;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tracing::instrument;

pub use local::LocalCache;
pub use multi_level::MultiLevelCache;
pub use redis::RedisCache;

/// 空值标记
///
/// 表示“数据源确认该键不存在”。包含 NUL 字节，JSON 序列化器不可能产生相同的输出。
pub const NULL_MARKER: &[u8] = b"\x00oxtier:null\x00";

/// 判断字节是否为空值标记
pub fn is_null_marker(bytes: &[u8]) -> bool {
    bytes == NULL_MARKER
}

/// 缓存未命中时执行的加载器
///
/// 加载器是惰性的 future，只有在确实未命中时才会被 poll
pub type Loader<'a> = BoxFuture<'a, std::result::Result<Vec<u8>, BoxError>>;

/// 可能返回“数据源中不存在”的加载器
pub type OptionalLoader<'a> = BoxFuture<'a, std::result::Result<Option<Vec<u8>>, BoxError>>;

/// 三态查询结果
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<T> {
    /// 缓存中存在真实值
    Present(T),
    /// 缓存中没有任何记录
    Absent,
    /// 缓存中记录了“数据源不存在该键”
    CachedAbsent,
}

impl<T> Lookup<T> {
    pub fn is_present(&self) -> bool {
        matches!(self, Lookup::Present(_))
    }

    /// 丢弃“不存在”的区分，只保留值
    pub fn into_option(self) -> Option<T> {
        match self {
            Lookup::Present(value) => Some(value),
            Lookup::Absent | Lookup::CachedAbsent => None,
        }
    }

    pub fn map<U, F: FnOnce(T) -> U>(self, f: F) -> Lookup<U> {
        match self {
            Lookup::Present(value) => Lookup::Present(f(value)),
            Lookup::Absent => Lookup::Absent,
            Lookup::CachedAbsent => Lookup::CachedAbsent,
        }
    }
}

/// 缓存操作特征
///
/// 定义缓存系统的基本操作接口。所有值以字节形式传递，未命中返回 `Ok(None)` 而不是错误。
///
/// TTL 以秒为单位，`None` 表示使用该层的默认值。
#[async_trait]
pub trait CacheOps: Send + Sync + Any {
    /// 缓存名称
    fn name(&self) -> &str;

    /// 获取序列化器
    ///
    /// 返回当前缓存使用的序列化器，类型化接口通过它完成编解码
    fn serializer(&self) -> &SerializerEnum;

    /// 将 trait object 转换为 Any，用于向下转型
    fn as_any(&self) -> &dyn Any;

    /// 将 `Arc<Trait>` 转换为 `Arc<dyn Any>`，支持 Arc 下的向下转型
    fn into_any_arc(self: Arc<Self>) -> Arc<dyn Any + Send + Sync>;

    /// 获取缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    ///
    /// # 返回值
    ///
    /// 返回缓存值，如果不存在则返回None。空值标记按原样返回，由类型化接口解释。
    async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>>;

    /// 读取或加载
    ///
    /// 命中时直接返回；未命中时执行加载器并写回缓存。
    /// 加载失败时返回 [`CacheError::Loader`]，不写入任何内容。
    async fn get_or_load_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: Loader<'_>,
    ) -> Result<Vec<u8>> {
        if let Some(bytes) = self.get_bytes(key).await? {
            return Ok(bytes);
        }
        let bytes = loader.await.map_err(|e| CacheError::loader(key, e))?;
        self.put_bytes(key, bytes.clone(), ttl).await?;
        Ok(bytes)
    }

    /// 读取或加载，加载器可以报告“数据源中不存在”
    ///
    /// 加载器返回 `None` 时本层不写入任何内容，结果为 [`Lookup::Absent`]
    async fn load_optional_bytes(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: OptionalLoader<'_>,
    ) -> Result<Lookup<Vec<u8>>> {
        match self.get_bytes(key).await? {
            Some(bytes) if is_null_marker(&bytes) => return Ok(Lookup::CachedAbsent),
            Some(bytes) => return Ok(Lookup::Present(bytes)),
            None => {}
        }
        match loader.await.map_err(|e| CacheError::loader(key, e))? {
            Some(bytes) => {
                self.put_bytes(key, bytes.clone(), ttl).await?;
                Ok(Lookup::Present(bytes))
            }
            None => Ok(Lookup::Absent),
        }
    }

    /// 设置缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 缓存值
    /// * `ttl` - 过期时间（秒），None表示使用默认值
    async fn put_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>) -> Result<()>;

    /// 仅当键不存在时写入
    ///
    /// # 返回值
    ///
    /// 本次调用写入成功返回 true
    async fn put_if_absent_bytes(&self, key: &str, value: Vec<u8>, ttl: Option<u64>)
        -> Result<bool>;

    /// 删除缓存项
    async fn evict(&self, key: &str) -> Result<()>;

    /// 批量删除缓存项
    async fn evict_many(&self, keys: &[String]) -> Result<()> {
        for key in keys {
            self.evict(key).await?;
        }
        Ok(())
    }

    /// 清空缓存
    async fn clear(&self) -> Result<()>;

    /// 批量读取
    ///
    /// 返回的映射只包含命中的键
    async fn multi_get_bytes(&self, keys: &[String]) -> Result<HashMap<String, Vec<u8>>> {
        let mut found = HashMap::with_capacity(keys.len());
        for key in keys {
            if let Some(bytes) = self.get_bytes(key).await? {
                found.insert(key.clone(), bytes);
            }
        }
        Ok(found)
    }

    /// 批量写入
    async fn multi_put_bytes(&self, items: HashMap<String, Vec<u8>>, ttl: Option<u64>) -> Result<()> {
        for (key, value) in items {
            self.put_bytes(&key, value, ttl).await?;
        }
        Ok(())
    }

    /// 获取剩余过期时间
    ///
    /// 键不存在或永不过期时返回None
    async fn get_expire(&self, key: &str) -> Result<Option<Duration>>;

    /// 修改过期时间
    ///
    /// # 返回值
    ///
    /// 键存在且修改成功时返回 true
    async fn expire(&self, key: &str, ttl: u64) -> Result<bool>;

    /// 检查键是否存在
    async fn has_key(&self, key: &str) -> Result<bool>;

    /// 条目数量
    async fn size(&self) -> Result<u64>;

    /// 优雅关闭缓存
    ///
    /// 关闭所有后台任务，释放资源
    async fn shutdown(&self) -> Result<()> {
        Ok(())
    }

    /// 该缓存的指标，未启用时返回None
    fn metrics(&self) -> Option<Arc<CacheMetrics>> {
        None
    }
}

fn serialization_error(err: CacheError) -> BoxError {
    Box::new(err)
}

/// 缓存扩展特征
///
/// 提供类型安全的缓存操作接口，所有编解码都通过缓存自身的序列化器完成
#[async_trait]
pub trait CacheExt: CacheOps {
    /// 获取缓存值（反序列化）
    ///
    /// 空值标记与未命中都返回 `None`，需要区分时使用 [`CacheExt::lookup`]
    #[instrument(skip(self), level = "debug")]
    async fn get<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Option<T>> {
        Ok(self.lookup(key).await?.into_option())
    }

    /// 三态读取
    #[instrument(skip(self), level = "debug")]
    async fn lookup<T: DeserializeOwned + Send>(&self, key: &str) -> Result<Lookup<T>> {
        match self.get_bytes(key).await? {
            Some(bytes) if is_null_marker(&bytes) => Ok(Lookup::CachedAbsent),
            Some(bytes) => Ok(Lookup::Present(self.serializer().deserialize(&bytes)?)),
            None => Ok(Lookup::Absent),
        }
    }

    /// 读取或加载（类型化）
    ///
    /// 键被标记为不存在时返回 [`CacheError::CachedAbsent`]，加载器不会执行
    #[instrument(skip(self, loader), level = "debug")]
    async fn get_or_load<T, F, Fut, E>(&self, key: &str, ttl: Option<u64>, loader: F) -> Result<T>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<T, E>> + Send,
        E: Into<BoxError> + Send,
    {
        let serializer = self.serializer().clone();
        let load: Loader<'_> = Box::pin(async move {
            let value = loader().await.map_err(|e| -> BoxError { e.into() })?;
            serializer.serialize(&value).map_err(serialization_error)
        });
        let bytes = self.get_or_load_bytes(key, ttl, load).await?;
        if is_null_marker(&bytes) {
            return Err(CacheError::CachedAbsent(key.to_string()));
        }
        self.serializer().deserialize(&bytes)
    }

    /// 读取或加载（类型化），加载器可以报告“数据源中不存在”
    #[instrument(skip(self, loader), level = "debug")]
    async fn load_optional<T, F, Fut, E>(
        &self,
        key: &str,
        ttl: Option<u64>,
        loader: F,
    ) -> Result<Lookup<T>>
    where
        T: Serialize + DeserializeOwned + Send,
        F: FnOnce() -> Fut + Send,
        Fut: Future<Output = std::result::Result<Option<T>, E>> + Send,
        E: Into<BoxError> + Send,
    {
        let serializer = self.serializer().clone();
        let load: OptionalLoader<'_> = Box::pin(async move {
            match loader().await.map_err(|e| -> BoxError { e.into() })? {
                Some(value) => serializer
                    .serialize(&value)
                    .map(Some)
                    .map_err(serialization_error),
                None => Ok(None),
            }
        });
        match self.load_optional_bytes(key, ttl, load).await? {
            Lookup::Present(bytes) if is_null_marker(&bytes) => Ok(Lookup::CachedAbsent),
            Lookup::Present(bytes) => Ok(Lookup::Present(self.serializer().deserialize(&bytes)?)),
            Lookup::Absent => Ok(Lookup::Absent),
            Lookup::CachedAbsent => Ok(Lookup::CachedAbsent),
        }
    }

    /// 设置缓存值（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn put<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<()> {
        let bytes = self.serializer().serialize(value)?;
        self.put_bytes(key, bytes, ttl).await
    }

    /// 仅当键不存在时写入（序列化）
    #[instrument(skip(self, value), level = "debug")]
    async fn put_if_absent<T: Serialize + Sync + ?Sized>(
        &self,
        key: &str,
        value: &T,
        ttl: Option<u64>,
    ) -> Result<bool> {
        let bytes = self.serializer().serialize(value)?;
        self.put_if_absent_bytes(key, bytes, ttl).await
    }

    /// 批量读取（反序列化），空值标记被视为未命中
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    async fn multi_get<T: DeserializeOwned + Send>(
        &self,
        keys: &[String],
    ) -> Result<HashMap<String, T>> {
        let raw = self.multi_get_bytes(keys).await?;
        let mut values = HashMap::with_capacity(raw.len());
        for (key, bytes) in raw {
            if is_null_marker(&bytes) {
                continue;
            }
            let value = self.serializer().deserialize(&bytes)?;
            values.insert(key, value);
        }
        Ok(values)
    }

    /// 批量写入（序列化）
    #[instrument(skip(self, items), level = "debug", fields(item_count = items.len()))]
    async fn multi_put<T: Serialize + Sync>(
        &self,
        items: &HashMap<String, T>,
        ttl: Option<u64>,
    ) -> Result<()> {
        let mut encoded = HashMap::with_capacity(items.len());
        for (key, value) in items {
            encoded.insert(key.clone(), self.serializer().serialize(value)?);
        }
        self.multi_put_bytes(encoded, ttl).await
    }
}

impl<T: CacheOps + ?Sized> CacheExt for T {}
