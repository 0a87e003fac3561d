//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的指标收集和监控功能。

use dashmap::DashMap;
use std::fmt::Write as _;
use std::time::Duration;
use tracing::trace;

/// 单个缓存实例的指标收集器
///
/// 每个缓存持有自己的一份，由管理器在汇总时统一渲染
#[derive(Debug, Default)]
pub struct CacheMetrics {
    /// 请求总数统计
    /// key: "layer:op:result"
    requests_total: DashMap<String, u64>,
    /// 操作耗时（累积时间和计数）
    /// key: "layer:op" -> (total_duration_secs, count)
    operation_duration: DashMap<String, (f64, u64)>,
}

impl CacheMetrics {
    pub fn new() -> Self {
        Self::default()
    }

    /// 记录请求指标
    ///
    /// # 参数
    ///
    /// * `layer` - 缓存层（L1/L2）
    /// * `op` - 操作类型（get/put/evict）
    /// * `result` - 操作结果（hit/miss/success/error）
    pub fn record_request(&self, layer: &str, op: &str, result: &str) {
        trace!(layer, op, result, "cache_request");
        let key = format!("{}:{}:{}", layer, op, result);
        *self.requests_total.entry(key).or_insert(0) += 1;
    }

    /// 记录操作耗时
    pub fn record_duration(&self, layer: &str, op: &str, duration: Duration) {
        let key = format!("{}:{}", layer, op);
        let mut entry = self.operation_duration.entry(key).or_insert((0.0, 0));
        entry.0 += duration.as_secs_f64();
        entry.1 += 1;
    }

    /// 读取某个计数器的当前值
    pub fn request_count(&self, layer: &str, op: &str, result: &str) -> u64 {
        let key = format!("{}:{}:{}", layer, op, result);
        self.requests_total.get(&key).map(|v| *v).unwrap_or(0)
    }

    /// 将指标格式化为文本，用于监控系统采集
    ///
    /// # 参数
    ///
    /// * `cache` - 缓存名称，作为 `cache` 标签输出
    pub fn render(&self, cache: &str) -> String {
        let mut output = String::new();

        let mut requests: Vec<(String, u64)> = self
            .requests_total
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        requests.sort();
        for (key, count) in requests {
            let mut parts = key.splitn(3, ':');
            if let (Some(layer), Some(op), Some(result)) = (parts.next(), parts.next(), parts.next())
            {
                let _ = writeln!(
                    output,
                    "cache_requests_total{{cache=\"{}\", layer=\"{}\", operation=\"{}\", result=\"{}\"}} {}",
                    cache, layer, op, result, count
                );
            }
        }

        let mut durations: Vec<(String, (f64, u64))> = self
            .operation_duration
            .iter()
            .map(|e| (e.key().clone(), *e.value()))
            .collect();
        durations.sort_by(|a, b| a.0.cmp(&b.0));
        for (key, (total, count)) in durations {
            if let Some((layer, op)) = key.split_once(':') {
                let _ = writeln!(
                    output,
                    "cache_operation_duration_seconds_sum{{cache=\"{}\", layer=\"{}\", operation=\"{}\"}} {}",
                    cache, layer, op, total
                );
                let _ = writeln!(
                    output,
                    "cache_operation_duration_seconds_count{{cache=\"{}\", layer=\"{}\", operation=\"{}\"}} {}",
                    cache, layer, op, count
                );
            }
        }
        output
    }
}
