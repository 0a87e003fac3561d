//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存层之间的同步机制，包括同步钩子、跨实例失效和批量预热。

pub mod invalidation;
pub mod preheat;

use crate::error::Result;
use async_trait::async_trait;

pub use invalidation::InvalidationSync;
pub use preheat::{PreheatResult, Preheater};

/// 同步方向
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncDirection {
    /// 本地写入后通知共享层/其他实例
    ToDistributed,
    /// 本地命中后从共享层刷新
    FromDistributed,
}

/// 层间同步钩子
///
/// 多级缓存在写入、删除和本地命中时调用；默认实现什么都不做
#[async_trait]
pub trait TierSync: Send + Sync {
    /// 本地写入或删除之后调用
    async fn sync_to_distributed(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// 本地命中之后调用
    async fn sync_from_distributed(&self, _key: &str) -> Result<()> {
        Ok(())
    }

    /// 按方向分发
    async fn sync(&self, direction: SyncDirection, key: &str) -> Result<()> {
        match direction {
            SyncDirection::ToDistributed => self.sync_to_distributed(key).await,
            SyncDirection::FromDistributed => self.sync_from_distributed(key).await,
        }
    }
}

/// 不做任何同步
#[derive(Debug, Default, Clone, Copy)]
pub struct NoopSync;

impl TierSync for NoopSync {}
