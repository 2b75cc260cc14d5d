//! Tracing setup for the two ways the binary runs.
//!
//! The long-running service writes JSON to a daily-rotated file under the
//! configured logs directory and mirrors human-readable output to stderr.
//! One-shot subcommands skip the file entirely. Filtering follows
//! `RUST_LOG` in both modes, falling back to `info`.

use std::io;
use std::path::Path;

use anyhow::Context;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

const LOG_FILE_PREFIX: &str = "otpgate.log";

/// Keeps the background log writer alive.
///
/// Dropping the guard flushes buffered records, so the caller holds it
/// until the process exits.
pub struct LoggingGuard {
    _writer: WorkerGuard,
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Full setup for the `start` subcommand: a daily-rotated JSON file under
/// `logs_dir` plus a plain-text stderr mirror.
///
/// # Errors
///
/// Returns an error when `logs_dir` cannot be created.
pub fn init_production(logs_dir: &Path) -> anyhow::Result<LoggingGuard> {
    std::fs::create_dir_all(logs_dir)
        .with_context(|| format!("failed to create logs directory {}", logs_dir.display()))?;

    let appender = tracing_appender::rolling::daily(logs_dir, LOG_FILE_PREFIX);
    let (file_writer, guard) = tracing_appender::non_blocking(appender);

    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            tracing_subscriber::fmt::layer()
                .json()
                .with_writer(file_writer),
        )
        .with(tracing_subscriber::fmt::layer().with_writer(io::stderr))
        .init();

    Ok(LoggingGuard { _writer: guard })
}

/// Stderr-only setup for one-shot subcommands.
pub fn init_cli() {
    tracing_subscriber::fmt()
        .with_env_filter(env_filter())
        .with_writer(io::stderr)
        .init();
}
