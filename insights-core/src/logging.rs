//! Logging infrastructure for insights
//!
//! Logs are written to `~/.local/state/insights/insights.log.YYYY-MM-DD`
//! following XDG standards. The appender rotates daily on the UTC date.

use crate::config::{Config, LoggingConfig};
use chrono::{NaiveDate, Utc};
use std::path::PathBuf;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{
    fmt::{self, format::FmtSpan},
    layer::SubscriberExt,
    util::SubscriberInitExt,
    EnvFilter,
};

/// Initialize the logging system
///
/// Sets up tracing with:
/// - File output to XDG state directory
/// - Daily log rotation
/// - Configurable log level via config or RUST_LOG env var
pub fn init(config: &LoggingConfig) -> crate::error::Result<LoggingGuard> {
    let log_dir = Config::state_dir();

    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);

    // Non-blocking so a slow disk never stalls track()
    let (non_blocking, guard) = tracing_appender::non_blocking(file_appender);

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.level));

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true);

    tracing_subscriber::registry()
        .with(filter)
        .with(file_layer)
        .try_init()
        .map_err(|e| crate::error::Error::Config(format!("failed to install logger: {}", e)))?;

    tracing::info!(
        log_dir = %log_dir.display(),
        level = %config.level,
        "Logging initialized"
    );

    Ok(LoggingGuard { _guard: guard })
}

/// Initialize logging for tests (logs to stdout)
pub fn init_test() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_test_writer()
        .with_span_events(FmtSpan::CLOSE)
        .try_init();
}

/// Guard that keeps the logging system alive
///
/// When dropped, flushes any pending log writes.
pub struct LoggingGuard {
    _guard: tracing_appender::non_blocking::WorkerGuard,
}

/// File name prefix; the appender adds `.YYYY-MM-DD`
pub const LOG_FILE_PREFIX: &str = "insights.log";

/// Path of the log file being written today
pub fn log_file_path() -> PathBuf {
    log_file_path_for(Utc::now().date_naive())
}

/// Path of the log file for `date` (UTC)
pub fn log_file_path_for(date: NaiveDate) -> PathBuf {
    Config::state_dir().join(format!("{}.{}", LOG_FILE_PREFIX, date.format("%Y-%m-%d")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_log_file_path_carries_rotation_date() {
        let date = NaiveDate::from_ymd_opt(2024, 3, 7).unwrap();
        let path = log_file_path_for(date);
        assert!(path.ends_with("insights.log.2024-03-07"));
        assert_eq!(path.parent().unwrap(), Config::state_dir());
    }

    #[test]
    fn test_log_file_path_is_todays_file() {
        let name = log_file_path().file_name().unwrap().to_string_lossy().into_owned();
        let today = Utc::now().date_naive().format("%Y-%m-%d").to_string();
        assert!(name.starts_with("insights.log."));
        // tolerate a date rollover between the two clock reads
        assert_eq!(name.len(), "insights.log.".len() + today.len());
    }
}
