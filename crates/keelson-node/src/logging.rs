//! Logging glue.
//!
//! The node itself logs through `tracing`. Engines report through a
//! [`LogFn`] sink, which defaults to a no-op; the daemon installs
//! [`tracing_log_fn`] so engine messages end up in the same subscriber.

use std::fmt;
use std::sync::Arc;

use tracing::{debug, error, info, warn};
use tracing_subscriber::EnvFilter;

/// Severity of an engine log message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum LogLevel {
    Debug,
    Info,
    Warn,
    Error,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            LogLevel::Debug => "DEBUG",
            LogLevel::Info => "INFO",
            LogLevel::Warn => "WARN",
            LogLevel::Error => "ERROR",
        };
        f.write_str(s)
    }
}

/// Engine log sink.
pub type LogFn = Arc<dyn Fn(LogLevel, &str) + Send + Sync>;

/// A sink that discards everything.
pub fn noop_log_fn() -> LogFn {
    Arc::new(|_: LogLevel, _: &str| {})
}

/// A sink that forwards engine messages to `tracing`.
pub fn tracing_log_fn() -> LogFn {
    Arc::new(|level: LogLevel, msg: &str| match level {
        LogLevel::Debug => debug!("engine: {}", msg),
        LogLevel::Info => info!("engine: {}", msg),
        LogLevel::Warn => warn!("engine: {}", msg),
        LogLevel::Error => error!("engine: {}", msg),
    })
}

/// Install the global `tracing` subscriber.
///
/// `RUST_LOG` takes precedence over `default_level`.
pub fn init_tracing(default_level: &str) {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();
}
