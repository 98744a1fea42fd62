//! 日志初始化
//!
//! 安装 `tracing-subscriber` 的 fmt 订阅者，级别由 `RUST_LOG` 控制（默认 `info`），
//! 并把 `log` crate 的记录桥接到 `tracing`。

use thiserror::Error;
use tracing_subscriber::EnvFilter;

/// 默认日志级别
const DEFAULT_FILTER: &str = "info";

#[derive(Error, Debug)]
pub enum LoggerError {
    #[error("Global tracing subscriber already set: {0}")]
    Subscriber(#[from] tracing::subscriber::SetGlobalDefaultError),

    #[error("Failed to bridge log records: {0}")]
    LogBridge(#[from] tracing_log::log_tracer::SetLoggerError),
}

/// 安装全局日志订阅者
///
/// 只能成功一次；已安装时返回 [`LoggerError::Subscriber`]。
pub fn try_init_logger() -> Result<(), LoggerError> {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));
    let subscriber = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_thread_names(true)
        .finish();
    tracing::subscriber::set_global_default(subscriber)?;
    tracing_log::LogTracer::init()?;
    Ok(())
}

/// 安装全局日志订阅者（已安装时什么也不做）
pub fn init_logger() {
    if try_init_logger().is_ok() {
        tracing::debug!("Logger initialized");
    }
}
