//! Tracing setup.
//!
//! The TUI owns the terminal, so logs go to `$PARLANCE_HOME/logs/parlance.log`
//! unless `--log-stderr` is given.

use std::fs;
use std::io;

use anyhow::{Context, Result};
use parlance_core::config::paths;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::layer::SubscriberExt as _;
use tracing_subscriber::util::SubscriberInitExt as _;
use tracing_subscriber::{EnvFilter, fmt};

const LOG_ENV: &str = "PARLANCE_LOG";
const DEFAULT_FILTER: &str = "parlance=info";
const LOG_FILE: &str = "parlance.log";

/// Installs the global subscriber.
///
/// Keep the returned guard alive until exit; dropping it flushes the file
/// writer.
pub fn init(to_stderr: bool) -> Result<Option<WorkerGuard>> {
    let filter =
        EnvFilter::try_from_env(LOG_ENV).unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER));

    if to_stderr {
        tracing_subscriber::registry()
            .with(filter)
            .with(fmt::layer().with_writer(io::stderr).with_target(false))
            .try_init()
            .context("Failed to install logger")?;
        return Ok(None);
    }

    let dir = paths::logs_dir();
    fs::create_dir_all(&dir)
        .with_context(|| format!("Failed to create log directory {}", dir.display()))?;
    let (writer, guard) = tracing_appender::non_blocking(tracing_appender::rolling::never(&dir, LOG_FILE));
    tracing_subscriber::registry()
        .with(filter)
        .with(fmt::layer().with_writer(writer).with_ansi(false))
        .try_init()
        .context("Failed to install logger")?;
    Ok(Some(guard))
}
