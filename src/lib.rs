//! oxtier - 带防护层的多级缓存库
//!
//! 提供统一的缓存接口、本地层与Redis共享层的组合，
//! 以及雪崩、击穿、穿透三种防护装饰器。

#![doc(html_root_url = "https://docs.rs/oxtier/0.1.0")]

pub use serde;
pub use serde::{Deserialize, Serialize};
pub use serde_json;
pub use tokio;

pub mod backend;
pub mod cli;
pub mod client;
pub mod config;
pub mod error;
pub mod key;
pub mod lock;
pub mod manager;
pub mod metrics;
pub mod protection;
pub mod serialization;
pub mod sync;
pub mod telemetry;
pub mod utils;

// Re-export commonly used items
pub use client::{CacheExt, CacheOps, LocalCache, Lookup, MultiLevelCache, RedisCache};
pub use config::{CacheType, Config};
pub use error::{CacheError, Result};
pub use key::{DefaultKeyGenerator, KeyGenerator, KeyTemplate};
pub use lock::{DistributedLock, LocalLockProvider, LockProvider, RedisLockProvider};
pub use manager::{CacheFactory, CacheManager};
pub use protection::{
    protect, AvalancheProtection, BreakdownProtection, PenetrationProtection,
};
pub use sync::{InvalidationSync, PreheatResult, Preheater, TierSync};

/// oxtier 版本号
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
