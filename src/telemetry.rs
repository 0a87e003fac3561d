//! Copyright (c) 2025-2026, Kirky.X
//!
//! MIT License
//!
//! 该模块定义了缓存系统的遥测和链路追踪功能。

use opentelemetry::global;
use opentelemetry::trace::TracerProvider;
use opentelemetry_sdk::trace::TracerProvider as SdkTracerProvider;
use tracing_subscriber::{layer::SubscriberExt, EnvFilter, Registry};

/// 初始化 OpenTelemetry Tracing
///
/// 此函数应该在应用程序启动时调用一次。
/// 它配置全局 tracer provider，并把 fmt 输出与 OpenTelemetry layer 组合成全局 subscriber。
/// 未配置 exporter 时 span 只在本地输出。
///
/// # 参数
///
/// * `service_name` - 服务名称
/// * `filter` - 日志过滤表达式，None 时读取 `RUST_LOG`，缺省为 `info`
///
/// # 返回值
///
/// 已存在全局 subscriber 时返回 false
pub fn init_tracing(service_name: &str, filter: Option<&str>) -> bool {
    let env_filter = match filter {
        Some(directives) => EnvFilter::new(directives),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
    };

    let provider = SdkTracerProvider::builder().build();
    global::set_tracer_provider(provider.clone());
    let tracer = provider.tracer(service_name.to_string());

    let subscriber = Registry::default()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_opentelemetry::layer().with_tracer(tracer));

    tracing::subscriber::set_global_default(subscriber).is_ok()
}
