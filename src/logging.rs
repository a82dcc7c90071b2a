//! Tracing setup.
//!
//! - stderr: compact, human-readable, filtered by `RUST_LOG` (default
//!   `garden=info`, or `garden=debug` with `--verbose`)
//! - `.garden/logs/garden.log.<date>`: JSON lines through a non-blocking
//!   daily-rolling writer, when a log directory is available

use std::path::Path;

use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{EnvFilter, fmt, layer::SubscriberExt, util::SubscriberInitExt};

fn default_directive(verbose: bool) -> &'static str {
    if verbose { "garden=debug" } else { "garden=info" }
}

/// Install the global subscriber. Keep the returned guard alive for the life
/// of the process so buffered file output is flushed on exit.
///
/// Calling this twice is harmless; the second call leaves the first
/// subscriber in place.
pub fn init(log_dir: Option<&Path>, verbose: bool) -> Option<WorkerGuard> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_directive(verbose)));

    let (file_layer, guard) = match log_dir {
        Some(dir) if dir.is_dir() => {
            let appender = tracing_appender::rolling::daily(dir, "garden.log");
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer()
                .json()
                .with_writer(writer)
                .with_ansi(false)
                .with_target(true);
            (Some(layer), Some(guard))
        }
        _ => (None, None),
    };

    let _ = tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(std::io::stderr).compact())
        .with(file_layer)
        .try_init();

    guard
}
