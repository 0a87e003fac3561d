//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了L2缓存后端的实现，基于Redis的分布式缓存。

use crate::config::{L2Config, RedisMode};
use crate::error::{CacheError, Result};
use redis::aio::{ConnectionLike, ConnectionManager};
use redis::cluster_async::ClusterConnection;
use redis::{Client, FromRedisValue};
use secrecy::ExposeSecret;
use std::future::Future;
use std::time::Duration;
use tokio::time::timeout;
use tracing::{debug, instrument};

/// SCAN 每批返回的键数量
const SCAN_BATCH: usize = 1000;

/// L2缓存后端实现
///
/// 基于Redis的分布式缓存实现，支持单机与集群两种模式。
/// 所有命令都受 `command_timeout_ms` 约束。
#[derive(Clone)]
pub enum L2Backend {
    Standalone {
        client: Client,
        manager: ConnectionManager,
        command_timeout_ms: u64,
    },
    Cluster {
        connection: ClusterConnection,
        command_timeout_ms: u64,
    },
}

impl std::fmt::Debug for L2Backend {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Standalone { .. } => write!(f, "L2Backend::Standalone"),
            Self::Cluster { .. } => write!(f, "L2Backend::Cluster"),
        }
    }
}

impl L2Backend {
    /// 创建新的L2缓存后端实例
    ///
    /// # 参数
    ///
    /// * `config` - L2缓存配置
    ///
    /// # 返回值
    ///
    /// 返回新的L2Backend实例或错误，连接在 `connection_timeout_ms` 内未建立时返回错误
    #[instrument(skip(config), level = "info", name = "init_l2_backend", fields(mode = ?config.mode))]
    pub async fn new(config: &L2Config) -> Result<Self> {
        let connect_timeout = Duration::from_millis(config.connection_timeout_ms);
        match config.mode {
            RedisMode::Standalone => {
                let client = Client::open(Self::connection_url(config).as_str())?;
                let manager = timeout(connect_timeout, client.get_connection_manager())
                    .await
                    .map_err(|_| {
                        CacheError::L2Error(format!(
                            "Connection timed out after {}ms",
                            config.connection_timeout_ms
                        ))
                    })??;
                debug!("L2Backend 单机模式连接已建立");
                Ok(L2Backend::Standalone {
                    client,
                    manager,
                    command_timeout_ms: config.command_timeout_ms,
                })
            }
            RedisMode::Cluster => {
                let cluster = config.cluster.as_ref().ok_or_else(|| {
                    CacheError::ConfigError("Cluster configuration is missing".to_string())
                })?;
                let mut builder = redis::cluster::ClusterClient::builder(cluster.nodes.clone());
                if let Some(password) = &config.password {
                    builder = builder.password(password.expose_secret().to_string());
                }
                let client = builder.build()?;
                let connection = timeout(connect_timeout, client.get_async_connection())
                    .await
                    .map_err(|_| {
                        CacheError::L2Error(format!(
                            "Connection timed out after {}ms",
                            config.connection_timeout_ms
                        ))
                    })??;
                debug!("L2Backend 集群模式连接已建立: nodes={}", cluster.nodes.len());
                Ok(L2Backend::Cluster {
                    connection,
                    command_timeout_ms: config.command_timeout_ms,
                })
            }
        }
    }

    /// 根据TLS设置调整连接串
    fn connection_url(config: &L2Config) -> String {
        let raw = config.connection_string.expose_secret();
        if config.enable_tls && raw.starts_with("redis://") {
            raw.replacen("redis://", "rediss://", 1)
        } else {
            raw.to_string()
        }
    }

    /// 获取命令超时时间（毫秒）
    pub fn command_timeout_ms(&self) -> u64 {
        match self {
            L2Backend::Standalone {
                command_timeout_ms, ..
            }
            | L2Backend::Cluster {
                command_timeout_ms, ..
            } => *command_timeout_ms,
        }
    }

    /// 获取原始Redis客户端（发布订阅需要独立连接）
    pub fn get_raw_client(&self) -> Result<Client> {
        match self {
            L2Backend::Standalone { client, .. } => Ok(client.clone()),
            L2Backend::Cluster { .. } => Err(CacheError::NotSupported(
                "get_raw_client is not supported in Cluster mode".to_string(),
            )),
        }
    }

    /// 在命令超时约束下执行一次 Redis 交互
    async fn with_timeout<T, F>(&self, op: &str, fut: F) -> Result<T>
    where
        F: Future<Output = redis::RedisResult<T>>,
    {
        let limit = self.command_timeout_ms();
        match timeout(Duration::from_millis(limit), fut).await {
            Ok(result) => result.map_err(CacheError::from),
            Err(_) => Err(CacheError::Timeout(format!(
                "Redis {} exceeded {}ms",
                op, limit
            ))),
        }
    }

    /// 执行单条命令
    pub async fn query<T: FromRedisValue>(&self, cmd: &redis::Cmd) -> Result<T> {
        match self {
            L2Backend::Standalone { manager, .. } => {
                let mut conn = manager.clone();
                self.with_timeout("command", cmd.query_async(&mut conn)).await
            }
            L2Backend::Cluster { connection, .. } => {
                let mut conn = connection.clone();
                self.with_timeout("command", cmd.query_async(&mut conn)).await
            }
        }
    }

    /// 执行管道
    pub async fn query_pipe<T: FromRedisValue>(&self, pipe: &redis::Pipeline) -> Result<T> {
        match self {
            L2Backend::Standalone { manager, .. } => {
                let mut conn = manager.clone();
                self.with_timeout("pipeline", pipe.query_async(&mut conn))
                    .await
            }
            L2Backend::Cluster { connection, .. } => {
                let mut conn = connection.clone();
                self.with_timeout("pipeline", pipe.query_async(&mut conn))
                    .await
            }
        }
    }

    /// 执行 Lua 脚本
    pub async fn invoke_script<T: FromRedisValue>(
        &self,
        invocation: &redis::ScriptInvocation<'_>,
    ) -> Result<T> {
        match self {
            L2Backend::Standalone { manager, .. } => {
                let mut conn = manager.clone();
                self.with_timeout("script", Self::invoke_on(invocation, &mut conn))
                    .await
            }
            L2Backend::Cluster { connection, .. } => {
                let mut conn = connection.clone();
                self.with_timeout("script", Self::invoke_on(invocation, &mut conn))
                    .await
            }
        }
    }

    async fn invoke_on<T, C>(
        invocation: &redis::ScriptInvocation<'_>,
        conn: &mut C,
    ) -> redis::RedisResult<T>
    where
        T: FromRedisValue,
        C: ConnectionLike + Send,
    {
        invocation.invoke_async(conn).await
    }

    /// 检查连接是否正常
    #[instrument(skip(self), level = "debug")]
    pub async fn ping(&self) -> Result<()> {
        let response: String = self.query(&redis::cmd("PING")).await?;
        debug!("L2Backend ping: Redis响应成功: {}", response);
        Ok(())
    }

    /// 获取字节数组缓存值
    #[instrument(skip(self), level = "debug")]
    pub async fn get_bytes(&self, key: &str) -> Result<Option<Vec<u8>>> {
        self.query(redis::cmd("GET").arg(key)).await
    }

    /// 设置字节数组缓存值
    ///
    /// # 参数
    ///
    /// * `key` - 缓存键
    /// * `value` - 字节数组值
    /// * `ttl` - 过期时间（秒），0表示不过期
    #[instrument(skip(self, value), level = "debug", fields(value_len = value.len()))]
    pub async fn set_bytes(&self, key: &str, value: &[u8], ttl: u64) -> Result<()> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value);
        if ttl > 0 {
            cmd.arg("EX").arg(ttl);
        }
        let _: () = self.query(&cmd).await?;
        Ok(())
    }

    /// 仅当键不存在时设置值
    ///
    /// # 返回值
    ///
    /// 返回是否设置成功
    #[instrument(skip(self, value), level = "debug")]
    pub async fn set_nx_bytes(&self, key: &str, value: &[u8], ttl: u64) -> Result<bool> {
        let mut cmd = redis::cmd("SET");
        cmd.arg(key).arg(value).arg("NX");
        if ttl > 0 {
            cmd.arg("EX").arg(ttl);
        }
        let result: Option<String> = self.query(&cmd).await?;
        Ok(result.is_some())
    }

    /// 批量读取，结果与输入键一一对应
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    pub async fn get_many(&self, keys: &[String]) -> Result<Vec<Option<Vec<u8>>>> {
        if keys.is_empty() {
            return Ok(Vec::new());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.get(key);
        }
        self.query_pipe(&pipe).await
    }

    /// 批量设置缓存项
    ///
    /// # 参数
    ///
    /// * `items` - (键, 值, 过期秒数) 列表，过期秒数为0表示不过期
    #[instrument(skip(self, items), level = "debug", fields(item_count = items.len()))]
    pub async fn set_many(&self, items: Vec<(String, Vec<u8>, u64)>) -> Result<()> {
        if items.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for (key, value, ttl) in items {
            if ttl > 0 {
                pipe.set_ex(key, value, ttl).ignore();
            } else {
                pipe.set(key, value).ignore();
            }
        }
        let _: () = self.query_pipe(&pipe).await?;
        Ok(())
    }

    /// 删除缓存项
    #[instrument(skip(self), level = "debug")]
    pub async fn delete(&self, key: &str) -> Result<()> {
        let _: i64 = self.query(redis::cmd("DEL").arg(key)).await?;
        Ok(())
    }

    /// 批量删除缓存项
    #[instrument(skip(self, keys), level = "debug", fields(key_count = keys.len()))]
    pub async fn delete_many(&self, keys: &[String]) -> Result<()> {
        if keys.is_empty() {
            return Ok(());
        }
        let mut pipe = redis::pipe();
        for key in keys {
            pipe.del(key).ignore();
        }
        let _: () = self.query_pipe(&pipe).await?;
        Ok(())
    }

    /// 获取缓存项的剩余生存时间
    ///
    /// # 返回值
    ///
    /// 键不存在或未设置过期时间时返回None
    #[instrument(skip(self), level = "debug")]
    pub async fn pttl(&self, key: &str) -> Result<Option<Duration>> {
        let ms: i64 = self.query(redis::cmd("PTTL").arg(key)).await?;
        if ms > 0 {
            Ok(Some(Duration::from_millis(ms as u64)))
        } else {
            Ok(None)
        }
    }

    /// 设置键的过期时间
    ///
    /// `ttl` 为0时执行 PERSIST 移除过期时间，与写入时0表示不过期保持一致，
    /// 而不是像 `EXPIRE key 0` 那样删除键。
    ///
    /// # 返回值
    ///
    /// 键存在时返回 true
    #[instrument(skip(self), level = "debug")]
    pub async fn expire(&self, key: &str, ttl: u64) -> Result<bool> {
        if ttl > 0 {
            return self.query(redis::cmd("EXPIRE").arg(key).arg(ttl)).await;
        }
        let mut pipe = redis::pipe();
        pipe.cmd("PERSIST").arg(key).ignore();
        pipe.cmd("EXISTS").arg(key);
        let (exists,): (bool,) = self.query_pipe(&pipe).await?;
        Ok(exists)
    }

    /// 检查键是否存在
    #[instrument(skip(self), level = "debug")]
    pub async fn exists(&self, key: &str) -> Result<bool> {
        self.query(redis::cmd("EXISTS").arg(key)).await
    }

    /// 发布消息
    #[instrument(skip(self, message), level = "debug")]
    pub async fn publish(&self, channel: &str, message: &str) -> Result<()> {
        let _: i64 = self
            .query(redis::cmd("PUBLISH").arg(channel).arg(message))
            .await?;
        Ok(())
    }

    /// 遍历匹配模式的所有键
    ///
    /// 集群模式下 SCAN 只会落在单个节点上，结果不是全量
    async fn scan_each<F>(&self, pattern: &str, mut on_batch: F) -> Result<()>
    where
        F: FnMut(Vec<String>) -> Option<redis::Pipeline>,
    {
        let mut cursor = 0u64;
        loop {
            let (next_cursor, keys): (u64, Vec<String>) = self
                .query(
                    redis::cmd("SCAN")
                        .arg(cursor)
                        .arg("MATCH")
                        .arg(pattern)
                        .arg("COUNT")
                        .arg(SCAN_BATCH),
                )
                .await?;
            if !keys.is_empty() {
                if let Some(pipe) = on_batch(keys) {
                    let _: () = self.query_pipe(&pipe).await?;
                }
            }
            cursor = next_cursor;
            if cursor == 0 {
                return Ok(());
            }
        }
    }

    /// 统计匹配模式的键数量
    #[instrument(skip(self), level = "debug")]
    pub async fn count(&self, pattern: &str) -> Result<u64> {
        let mut total = 0u64;
        self.scan_each(pattern, |keys| {
            total += keys.len() as u64;
            None
        })
        .await?;
        Ok(total)
    }

    /// 删除匹配模式的所有键
    ///
    /// # 参数
    ///
    /// * `pattern` - 键模式，例如 `users:*`
    #[instrument(skip(self), level = "debug")]
    pub async fn clear(&self, pattern: &str) -> Result<()> {
        debug!("L2 clear: 清空模式 {} 的所有缓存项", pattern);
        self.scan_each(pattern, |keys| {
            let mut pipe = redis::pipe();
            for key in &keys {
                pipe.del(key).ignore();
            }
            Some(pipe)
        })
        .await?;
        debug!("L2 clear: 缓存已清空");
        Ok(())
    }
}
