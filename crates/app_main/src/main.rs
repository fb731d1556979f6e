//! ShellMeta - file metadata and shell icon inspector for Windows
//!
//! Command-line front end over `app_fs` and `app_core`.

mod app;

use anyhow::Result;
use app_core::ShellMetaConfig;
use clap::Parser;

fn main() -> Result<()> {
    let args = app::Args::parse();

    // Initialize logging and panic hook first
    let _log_guard = app_log::init(app_log::LogOptions {
        default_filter: if args.verbose { "debug" } else { "info" }.to_string(),
        console: args.verbose,
    })?;

    // Clean up old logs (7 days)
    if let Err(e) = app_log::cleanup_old_logs(7) {
        tracing::warn!("Failed to cleanup old logs: {}", e);
    }

    tracing::info!("ShellMeta starting...");

    // Load configuration
    let config = match &args.config {
        Some(path) => ShellMetaConfig::load_from(path)?,
        None => ShellMetaConfig::load().unwrap_or_default(),
    };

    app::run(args.command, &config)
}
