//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存失效机制，用于处理跨实例的本地缓存失效。

use super::TierSync;
use crate::backend::l2::L2Backend;
use crate::client::CacheOps;
use crate::error::Result;
use async_trait::async_trait;
use futures::stream::StreamExt;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, instrument, warn};

/// 基于 Redis 发布订阅的层间同步
///
/// 本实例写入或删除某个键后，向频道发布 `origin|key`；
/// 其他实例收到消息后删除自己本地层中的该键，自己发出的消息会被忽略。
pub struct InvalidationSync {
    /// 本实例标识
    origin: String,
    /// 频道名称
    channel: String,
    l2: Arc<L2Backend>,
    cancel: CancellationToken,
}

impl InvalidationSync {
    /// 默认频道名称
    pub fn default_channel(cache_name: &str) -> String {
        format!("cache:invalidate:{}", cache_name)
    }

    /// 订阅频道并启动后台失效任务
    ///
    /// # 参数
    ///
    /// * `l2` - Redis后端，单机模式
    /// * `local` - 收到失效消息时需要删除的本地层
    /// * `channel` - 频道名称
    #[instrument(skip(l2, local), level = "debug")]
    pub async fn start(
        l2: Arc<L2Backend>,
        local: Arc<dyn CacheOps>,
        channel: String,
    ) -> Result<Arc<Self>> {
        let mut pubsub = l2.get_raw_client()?.get_async_pubsub().await?;
        pubsub.subscribe(&channel).await?;

        let origin = uuid::Uuid::new_v4().simple().to_string();
        let cancel = CancellationToken::new();
        let sync = Arc::new(Self {
            origin: origin.clone(),
            channel: channel.clone(),
            l2,
            cancel: cancel.clone(),
        });

        debug!("InvalidationSync: 启动订阅者，频道={}", channel);
        tokio::spawn(async move {
            let mut stream = pubsub.on_message();
            loop {
                let msg = tokio::select! {
                    _ = cancel.cancelled() => break,
                    msg = stream.next() => match msg {
                        Some(msg) => msg,
                        None => break,
                    },
                };
                let payload: String = match msg.get_payload() {
                    Ok(payload) => payload,
                    Err(e) => {
                        debug!("InvalidationSync: 解析消息失败: {}", e);
                        continue;
                    }
                };
                let Some((sender, key)) = payload.split_once('|') else {
                    debug!("InvalidationSync: 忽略格式错误的消息: {}", payload);
                    continue;
                };
                if sender == origin {
                    continue;
                }
                if let Err(e) = local.evict(key).await {
                    warn!("InvalidationSync: 本地失效失败 key={}, error={}", key, e);
                } else {
                    debug!("本地键已失效: {}", key);
                }
            }
            debug!("InvalidationSync: 订阅者已退出，频道={}", channel);
        });

        Ok(sync)
    }

    /// 本实例标识
    pub fn origin(&self) -> &str {
        &self.origin
    }

    /// 停止后台订阅任务
    pub fn stop(&self) {
        self.cancel.cancel();
    }
}

impl Drop for InvalidationSync {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}

#[async_trait]
impl TierSync for InvalidationSync {
    #[instrument(skip(self), level = "debug")]
    async fn sync_to_distributed(&self, key: &str) -> Result<()> {
        let message = format!("{}|{}", self.origin, key);
        self.l2.publish(&self.channel, &message).await
    }
}
