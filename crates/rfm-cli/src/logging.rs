//! Logging setup for the `rfm` binary

use anyhow::{Context, Result};
use std::path::Path;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

/// Base name of the rolling log file
pub const LOG_FILE_NAME: &str = "rfm.log";

/// Install the global subscriber.
///
/// `--debug` forces the `debug` level; otherwise `RUST_LOG` is honoured and
/// falls back to `info`. With a log directory, records are also written to a
/// daily-rolling file there. The returned guard must be held until exit so
/// buffered records get flushed.
pub fn init_logging(debug: bool, log_dir: Option<&Path>) -> Result<Option<WorkerGuard>> {
    let filter = if debug {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env()
            .or_else(|_| EnvFilter::try_new("info"))
            .context("Failed to parse log level")?
    };

    let (file_layer, guard) = match log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)
                .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
            let appender = tracing_appender::rolling::daily(dir, LOG_FILE_NAME);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = fmt::layer().with_ansi(false).with_writer(writer);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_target(false).compact())
        .with(file_layer)
        .try_init()
        .context("Failed to install tracing subscriber")?;

    Ok(guard)
}
