//! ShellMeta Logging & Observability Module
//!
//! Provides structured logging, panic handling, crash reports, and deadlock detection.
//! Library crates only emit `tracing` events; the binary calls [`init`].

mod logging;
mod panic_hook;

pub use logging::{cleanup_old_logs, cleanup_old_logs_in, init_logging, LogGuard, LogOptions};
pub use panic_hook::{crash_report, init_panic_hook};

use directories::ProjectDirs;
use std::path::PathBuf;

/// Get the application log directory
pub fn log_dir() -> PathBuf {
    ProjectDirs::from("com", "ShellMeta", "ShellMeta")
        .map(|dirs| dirs.data_dir().join("logs"))
        .unwrap_or_else(|| PathBuf::from("./logs"))
}

/// Initialize all observability features. Keep the returned guard alive
/// until exit so buffered log lines are flushed.
pub fn init(options: LogOptions) -> anyhow::Result<LogGuard> {
    let guard = init_logging(options)?;
    init_panic_hook();

    #[cfg(debug_assertions)]
    init_deadlock_detector();

    Ok(guard)
}

#[cfg(debug_assertions)]
fn init_deadlock_detector() {
    use std::thread;
    use std::time::Duration;

    thread::spawn(|| loop {
        thread::sleep(Duration::from_secs(10));
        let deadlocks = parking_lot::deadlock::check_deadlock();
        if !deadlocks.is_empty() {
            tracing::error!("Deadlock detected!");
            for (i, threads) in deadlocks.iter().enumerate() {
                tracing::error!("Deadlock #{}", i);
                for t in threads {
                    tracing::error!("Thread Id {:#?}", t.thread_id());
                    tracing::error!("{:#?}", t.backtrace());
                }
            }
        }
    });
}
