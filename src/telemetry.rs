//! 日志初始化
//!
//! 库本身只产生 `tracing` 事件；需要输出时由应用调用 [`init_tracing`]

use tracing_subscriber::EnvFilter;

/// 默认过滤规则（`RUST_LOG` 未设置时生效）
pub const DEFAULT_FILTER: &str = "info,flare_service_registrar=debug";

/// 日志输出格式
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TelemetryFormat {
    #[default]
    Pretty,
    Json,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// 安装全局 tracing subscriber
///
/// 已经安装过时返回错误，不会覆盖已有 subscriber
pub fn init_tracing(
    format: TelemetryFormat,
) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    let builder = tracing_subscriber::fmt().with_env_filter(env_filter());
    match format {
        TelemetryFormat::Pretty => builder.try_init(),
        TelemetryFormat::Json => builder.json().try_init(),
    }
}
