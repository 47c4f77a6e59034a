use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::errors::{SimResult, SimulationError};

/// 初始化日志系统
///
/// `RUST_LOG` 环境变量优先于传入的默认级别；重复初始化静默忽略，
/// 便于在测试中多次调用。
pub fn init_logging(log_level: &str, log_format: &str) -> SimResult<()> {
    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(log_level));

    let registry = tracing_subscriber::registry().with(env_filter);

    let result = match log_format {
        "json" => registry
            .with(tracing_subscriber::fmt::layer().json())
            .try_init(),
        "pretty" => registry
            .with(tracing_subscriber::fmt::layer().pretty())
            .try_init(),
        "compact" => registry
            .with(tracing_subscriber::fmt::layer().compact())
            .try_init(),
        other => {
            return Err(SimulationError::Configuration(format!(
                "不支持的日志格式: {other}"
            )))
        }
    };

    // 已经有全局 subscriber 时不报错
    let _ = result;
    Ok(())
}
