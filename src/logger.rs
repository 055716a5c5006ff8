//! Logging system using tracing
//!
//! Diagnostics go to stderr and to a daily log file; stdout is reserved for
//! progress dots and results.

use anyhow::Result;
use std::path::PathBuf;
use tracing::Level;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Verbosity;

/// Get the log directory path
pub fn get_log_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os("STARTUP_TIME_LOG_DIR") {
        return PathBuf::from(dir);
    }
    let data = dirs::data_local_dir().unwrap_or_else(std::env::temp_dir);
    data.join("startup-time").join("logs")
}

/// Console log level for a verbosity
pub fn log_level(verbosity: Verbosity) -> Level {
    match verbosity {
        Verbosity::Verbose => Level::DEBUG,
        Verbosity::Quiet => Level::ERROR,
        Verbosity::Default => Level::INFO,
    }
}

/// Setup logging for the given verbosity.
///
/// The returned guard flushes the file log when dropped.
pub fn setup_logging(verbosity: Verbosity) -> Result<Option<WorkerGuard>> {
    let log_dir = get_log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let level = log_level(verbosity);

    // Create file appender
    let file_appender = tracing_appender::rolling::daily(&log_dir, "startup-time.log");
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let env_filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level.to_string()));

    let subscriber = tracing_subscriber::registry()
        .with(env_filter)
        .with(fmt::layer().with_writer(non_blocking).with_ansi(false));

    // Add console output if not quiet
    if verbosity != Verbosity::Quiet {
        let console_layer = fmt::layer()
            .with_writer(std::io::stderr)
            .with_ansi(true)
            .with_target(false)
            .with_level(true)
            .compact();

        subscriber.with(console_layer).try_init()?;
    } else {
        subscriber.try_init()?;
    }

    Ok(Some(guard))
}
