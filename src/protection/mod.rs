//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了三种缓存防护装饰器（雪崩、穿透、击穿）以及按配置组合它们的辅助函数。
//! 每个装饰器都实现 [`CacheOps`]，包装任意一个缓存。

pub mod avalanche;
pub mod breakdown;
pub mod penetration;

use crate::client::CacheOps;
use crate::config::ProtectionConfig;
use crate::lock::LockProvider;
use std::sync::Arc;
use tracing::{debug, warn};

pub use avalanche::{jittered_ttl, AvalancheProtection};
pub use breakdown::BreakdownProtection;
pub use penetration::PenetrationProtection;

/// 按配置为缓存叠加防护
///
/// 组合顺序为 `Penetration(Breakdown(Avalanche(cache)))`：
/// 穿透防护必须在最外层，否则它在读取未命中时写入的空值标记会让击穿防护的二次检查误判为命中。
/// 击穿防护启用但未提供锁时跳过该层。
pub fn protect(
    cache: Arc<dyn CacheOps>,
    config: &ProtectionConfig,
    locks: Option<Arc<dyn LockProvider>>,
) -> Arc<dyn CacheOps> {
    let mut layered = cache;

    if config.avalanche.enabled {
        debug!("启用雪崩防护: cache={}", layered.name());
        layered = Arc::new(AvalancheProtection::new(layered, config.avalanche.clone()));
    }

    if config.breakdown.enabled {
        match locks {
            Some(locks) => {
                debug!("启用击穿防护: cache={}", layered.name());
                layered = Arc::new(BreakdownProtection::new(
                    layered,
                    locks,
                    config.breakdown.clone(),
                ));
            }
            None => warn!(
                "击穿防护已启用但没有可用的锁提供者，跳过: cache={}",
                layered.name()
            ),
        }
    }

    if config.penetration.enabled {
        debug!("启用穿透防护: cache={}", layered.name());
        layered = Arc::new(PenetrationProtection::new(
            layered,
            config.penetration.clone(),
        ));
    }

    layered
}
