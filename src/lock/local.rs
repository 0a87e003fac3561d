//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了进程内的锁提供者，适用于单实例部署与测试。

use super::{DistributedLock, LockProvider};
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use dashmap::mapref::entry::Entry;
use dashmap::DashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::Notify;
use tracing::{debug, instrument};

/// 等待者在没有收到释放通知时的重试间隔，用于发现过期的租约
const RETRY_INTERVAL: Duration = Duration::from_millis(10);

#[derive(Debug)]
struct Holder {
    owner: String,
    count: u32,
    expires_at: Instant,
}

impl Holder {
    fn new(owner: &str, lease: Duration, now: Instant) -> Self {
        Self {
            owner: owner.to_string(),
            count: 1,
            expires_at: now + lease,
        }
    }

    fn is_live(&self, now: Instant) -> bool {
        self.expires_at > now
    }
}

/// 进程内锁提供者
///
/// 所有从同一个提供者（及其克隆）取得的同名锁互斥。租约在下一次访问时惰性检查。
#[derive(Clone, Default)]
pub struct LocalLockProvider {
    holders: Arc<DashMap<String, Holder>>,
    released: Arc<Notify>,
}

impl LocalLockProvider {
    pub fn new() -> Self {
        Self::default()
    }
}

impl LockProvider for LocalLockProvider {
    fn get_lock(&self, name: &str) -> Box<dyn DistributedLock> {
        Box::new(LocalLock {
            name: name.to_string(),
            owner: uuid::Uuid::new_v4().to_string(),
            holders: self.holders.clone(),
            released: self.released.clone(),
        })
    }
}

struct LocalLock {
    name: String,
    owner: String,
    holders: Arc<DashMap<String, Holder>>,
    released: Arc<Notify>,
}

impl LocalLock {
    fn try_acquire(&self, lease: Duration) -> bool {
        let now = Instant::now();
        match self.holders.entry(self.name.clone()) {
            Entry::Vacant(slot) => {
                slot.insert(Holder::new(&self.owner, lease, now));
                true
            }
            Entry::Occupied(mut slot) => {
                let holder = slot.get_mut();
                if !holder.is_live(now) {
                    *holder = Holder::new(&self.owner, lease, now);
                    true
                } else if holder.owner == self.owner {
                    holder.count += 1;
                    holder.expires_at = now + lease;
                    true
                } else {
                    false
                }
            }
        }
    }
}

#[async_trait]
impl DistributedLock for LocalLock {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), level = "debug", fields(lock = %self.name))]
    async fn try_lock(&self, wait: Duration, lease: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            let notified = self.released.notified();
            tokio::pin!(notified);
            notified.as_mut().enable();

            if self.try_acquire(lease) {
                debug!("本地锁已获取: {}", self.name);
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("本地锁等待超时: {}", self.name);
                return Ok(false);
            }
            let _ = tokio::time::timeout((deadline - now).min(RETRY_INTERVAL), notified).await;
        }
    }

    #[instrument(skip(self), level = "debug", fields(lock = %self.name))]
    async fn unlock(&self) -> Result<()> {
        let now = Instant::now();
        match self.holders.entry(self.name.clone()) {
            Entry::Occupied(mut slot)
                if slot.get().owner == self.owner && slot.get().is_live(now) =>
            {
                slot.get_mut().count -= 1;
                if slot.get().count == 0 {
                    slot.remove();
                    self.released.notify_waiters();
                }
                Ok(())
            }
            _ => Err(CacheError::Lock(format!(
                "lock '{}' is not held by this owner",
                self.name
            ))),
        }
    }

    async fn is_locked(&self) -> Result<bool> {
        let now = Instant::now();
        Ok(self
            .holders
            .get(&self.name)
            .map(|holder| holder.is_live(now))
            .unwrap_or(false))
    }
}
