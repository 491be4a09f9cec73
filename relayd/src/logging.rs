//! Logging setup.
//!
//! Console output always; when a log directory is configured, a second
//! daily-rolling file layer is added.

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

/// Default log filter directive.
pub const DEFAULT_LOG_FILTER: &str = "relayd=info,bollard=warn,tower_http=warn,hyper=warn";

/// Initialize logging. Keep the returned guard alive for the process
/// lifetime when file logging is enabled.
pub fn init_logging(log_dir: Option<&str>) -> crate::Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));

    let registry = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer());

    match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, "relayd.log");
            let (non_blocking, guard) = tracing_appender::non_blocking(appender);
            registry
                .with(fmt::layer().with_writer(non_blocking).with_ansi(false))
                .try_init()
                .map_err(|e| crate::Error::config(format!("failed to initialize logging: {e}")))?;
            Ok(Some(guard))
        }
        None => {
            registry
                .try_init()
                .map_err(|e| crate::Error::config(format!("failed to initialize logging: {e}")))?;
            Ok(None)
        }
    }
}
