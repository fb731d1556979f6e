//! Structured logging setup with tracing

use std::path::Path;
use std::time::{Duration, SystemTime};
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Prefix of the daily log files (`shellmeta.log.YYYY-MM-DD`)
const LOG_FILE_PREFIX: &str = "shellmeta.log";

/// Logging switches chosen by the binary
#[derive(Debug, Clone)]
pub struct LogOptions {
    /// Filter used when `RUST_LOG` is unset
    pub default_filter: String,
    /// Mirror events to stderr; stdout is left to command output
    pub console: bool,
}

impl Default for LogOptions {
    fn default() -> Self {
        Self {
            default_filter: "info".to_string(),
            console: cfg!(debug_assertions),
        }
    }
}

/// Flushes the file writer when dropped
pub struct LogGuard {
    _worker: WorkerGuard,
}

/// Initialize the logging system
pub fn init_logging(options: LogOptions) -> anyhow::Result<LogGuard> {
    let log_dir = super::log_dir();
    std::fs::create_dir_all(&log_dir)?;

    let file_appender = RollingFileAppender::new(Rotation::DAILY, &log_dir, LOG_FILE_PREFIX);
    let (non_blocking, worker) = tracing_appender::non_blocking(file_appender);

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&options.default_filter));

    let file_layer = fmt::layer().json().with_writer(non_blocking);

    #[cfg(debug_assertions)]
    let console_layer = options
        .console
        .then(|| fmt::layer().pretty().with_writer(std::io::stderr));

    #[cfg(not(debug_assertions))]
    let console_layer = options
        .console
        .then(|| fmt::layer().compact().with_writer(std::io::stderr));

    tracing_subscriber::registry()
        .with(env_filter)
        .with(console_layer)
        .with(file_layer)
        .try_init()?;

    tracing::info!("Logging initialized in {:?}", log_dir);
    Ok(LogGuard { _worker: worker })
}

/// Clean up log files older than specified days
pub fn cleanup_old_logs(days: u32) -> anyhow::Result<usize> {
    cleanup_old_logs_in(&super::log_dir(), days)
}

/// Remove log files in `log_dir` last modified more than `days` days ago
pub fn cleanup_old_logs_in(log_dir: &Path, days: u32) -> anyhow::Result<usize> {
    if !log_dir.exists() {
        return Ok(0);
    }

    let threshold = SystemTime::now() - Duration::from_secs(days as u64 * 24 * 60 * 60);
    let mut deleted = 0;

    for entry in std::fs::read_dir(log_dir)? {
        let entry = entry?;
        let path = entry.path();

        let is_log = path
            .file_name()
            .and_then(|n| n.to_str())
            .is_some_and(|n| n.starts_with(LOG_FILE_PREFIX) || n.ends_with(".log"));
        if !is_log {
            continue;
        }

        let modified = entry.metadata().and_then(|m| m.modified());
        if matches!(modified, Ok(modified) if modified < threshold)
            && std::fs::remove_file(&path).is_ok()
        {
            deleted += 1;
            tracing::debug!("Deleted old log: {:?}", path);
        }
    }

    tracing::info!("Cleaned up {} old log files", deleted);
    Ok(deleted)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn age(path: &Path, days: u64) {
        let file = std::fs::OpenOptions::new().write(true).open(path).unwrap();
        file.set_modified(SystemTime::now() - Duration::from_secs(days * 24 * 60 * 60))
            .unwrap();
    }

    #[test]
    fn test_cleanup_removes_only_stale_logs() {
        let dir = tempfile::tempdir().unwrap();
        let stale = dir.path().join("shellmeta.log.2020-01-01");
        let fresh = dir.path().join("shellmeta.log.2026-10-14");
        let other = dir.path().join("notes.txt");
        for path in [&stale, &fresh, &other] {
            std::fs::write(path, b"x").unwrap();
        }
        age(&stale, 40);
        age(&other, 40);

        assert_eq!(cleanup_old_logs_in(dir.path(), 30).unwrap(), 1);
        assert!(!stale.exists());
        assert!(fresh.exists());
        assert!(other.exists());
    }

    #[test]
    fn test_cleanup_missing_dir() {
        let dir = tempfile::tempdir().unwrap();
        assert_eq!(cleanup_old_logs_in(&dir.path().join("none"), 1).unwrap(), 0);
    }
}
