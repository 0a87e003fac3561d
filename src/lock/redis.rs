//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了基于Redis的分布式锁，使用 Lua 脚本保证原子性。

use super::{DistributedLock, LockProvider};
use crate::backend::l2::L2Backend;
use crate::error::{CacheError, Result};
use async_trait::async_trait;
use redis::Script;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tracing::{debug, instrument};

/// 获取锁失败后的轮询间隔
const POLL_INTERVAL: Duration = Duration::from_millis(50);

/// 加锁：锁不存在或由自己持有时重入计数加一并刷新租约
fn acquire_script() -> Script {
    Script::new(
        r#"
        if (redis.call('exists', KEYS[1]) == 0) or (redis.call('hexists', KEYS[1], ARGV[1]) == 1) then
            redis.call('hincrby', KEYS[1], ARGV[1], 1)
            redis.call('pexpire', KEYS[1], ARGV[2])
            return 1
        end
        return 0
        "#,
    )
}

/// 解锁：不是持有者返回 -1；计数归零时删除并返回 0；否则返回 1
fn release_script() -> Script {
    Script::new(
        r#"
        if redis.call('hexists', KEYS[1], ARGV[1]) == 0 then
            return -1
        end
        local count = redis.call('hincrby', KEYS[1], ARGV[1], -1)
        if count > 0 then
            return 1
        end
        redis.call('del', KEYS[1])
        return 0
        "#,
    )
}

/// Redis 锁提供者
#[derive(Clone)]
pub struct RedisLockProvider {
    l2: Arc<L2Backend>,
}

impl RedisLockProvider {
    pub fn new(l2: Arc<L2Backend>) -> Self {
        Self { l2 }
    }
}

impl LockProvider for RedisLockProvider {
    fn get_lock(&self, name: &str) -> Box<dyn DistributedLock> {
        Box::new(RedisLock {
            name: name.to_string(),
            owner: uuid::Uuid::new_v4().to_string(),
            l2: self.l2.clone(),
        })
    }
}

struct RedisLock {
    name: String,
    owner: String,
    l2: Arc<L2Backend>,
}

impl RedisLock {
    async fn try_acquire(&self, lease: Duration) -> Result<bool> {
        let lease_ms = lease.as_millis().max(1) as u64;
        let script = acquire_script();
        let mut invocation = script.prepare_invoke();
        invocation.key(&self.name).arg(&self.owner).arg(lease_ms);
        let acquired: i64 = self.l2.invoke_script(&invocation).await?;
        Ok(acquired == 1)
    }
}

#[async_trait]
impl DistributedLock for RedisLock {
    fn name(&self) -> &str {
        &self.name
    }

    #[instrument(skip(self), level = "debug", fields(lock = %self.name))]
    async fn try_lock(&self, wait: Duration, lease: Duration) -> Result<bool> {
        let deadline = Instant::now() + wait;
        loop {
            if self.try_acquire(lease).await? {
                debug!("Redis锁已获取: {}", self.name);
                return Ok(true);
            }
            let now = Instant::now();
            if now >= deadline {
                debug!("Redis锁等待超时: {}", self.name);
                return Ok(false);
            }
            tokio::time::sleep((deadline - now).min(POLL_INTERVAL)).await;
        }
    }

    #[instrument(skip(self), level = "debug", fields(lock = %self.name))]
    async fn unlock(&self) -> Result<()> {
        let script = release_script();
        let mut invocation = script.prepare_invoke();
        invocation.key(&self.name).arg(&self.owner);
        let released: i64 = self.l2.invoke_script(&invocation).await?;
        if released < 0 {
            return Err(CacheError::Lock(format!(
                "lock '{}' is not held by this owner",
                self.name
            )));
        }
        Ok(())
    }

    async fn is_locked(&self) -> Result<bool> {
        self.l2.exists(&self.name).await
    }
}
