//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的存储引擎，包括L1（Moka）和L2（Redis）后端。

pub mod l1;
pub mod l2;
