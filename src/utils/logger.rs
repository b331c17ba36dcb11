//! Logging initialization and configuration.
//!
//! Diagnostics go to a daily-rotated file under the trace directory so they
//! never mix with the JSON lines written to stdout. When the directory cannot
//! be created, logs fall back to stderr.
//!
//! # Configuration
//!
//! The log level can be controlled via the `RUST_LOG` environment variable:
//! - `RUST_LOG=debug` - Show debug and higher level logs
//! - `RUST_LOG=info` - Show info and higher level logs (default)
//! - `RUST_LOG=warn` - Show warnings and errors only

use std::fs;
use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// File name prefix of the rotated trace files.
pub const LOG_FILE_PREFIX: &str = "cmd-gateway.log";

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"))
}

/// Initialize the logging system.
///
/// Files are named `cmd-gateway.log.YYYY-MM-DD` inside `trace_dir`. The
/// returned guard flushes the background writer on drop and must be held
/// for the lifetime of the process.
pub fn init_logging(trace_dir: &Path) -> Option<WorkerGuard> {
    if let Err(e) = fs::create_dir_all(trace_dir) {
        eprintln!(
            "Warning: Failed to create trace directory {}: {}; logging to stderr",
            trace_dir.display(),
            e
        );
        init_stderr();
        return None;
    }

    let appender = tracing_appender::rolling::daily(trace_dir, LOG_FILE_PREFIX);
    let (non_blocking, guard) = tracing_appender::non_blocking(appender);

    let file_layer = fmt::layer()
        .with_writer(non_blocking)
        .with_ansi(false)
        .with_target(true)
        .with_thread_ids(true)
        .with_line_number(true);

    // Fails only if a global subscriber is already set.
    if tracing_subscriber::registry()
        .with(env_filter())
        .with(file_layer)
        .try_init()
        .is_err()
    {
        return None;
    }

    tracing::info!("Logging initialized - writing to {}", trace_dir.display());
    Some(guard)
}

fn init_stderr() {
    let layer = fmt::layer().with_writer(std::io::stderr).with_ansi(false);
    if tracing_subscriber::registry()
        .with(env_filter())
        .with(layer)
        .try_init()
        .is_err()
    {
        eprintln!("Warning: a tracing subscriber was already installed");
    }
}
