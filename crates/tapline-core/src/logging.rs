//! Tracing subscriber setup for harness binaries.
//!
//! The library itself only emits `tracing` events; installing a subscriber
//! is the harness's call. These helpers cover the two common setups. Both
//! honour `RUST_LOG` and fall back to [`DEFAULT_FILTER`].

use std::path::{Path, PathBuf};

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_appender::rolling::{InitError, RollingFileAppender, Rotation};
use tracing_subscriber::util::TryInitError;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

/// Info for this crate, warnings from everything else.
pub const DEFAULT_FILTER: &str = "tapline_core=info,warn";

/// Line format for file logs.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum LogFormat {
    #[default]
    Compact,
    /// One JSON object per event.
    Json,
}

/// Errors installing a subscriber.
#[derive(Error, Debug)]
pub enum LoggingError {
    /// The log file could not be created.
    #[error("Failed to open log file: {0}")]
    Appender(#[from] InitError),

    /// A global subscriber is already installed.
    #[error("Failed to install subscriber: {0}")]
    Subscriber(#[from] TryInitError),
}

fn env_filter() -> EnvFilter {
    EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_FILTER))
}

/// Directory for log files: `~/.tapline/logs`.
///
/// Falls back to `./.tapline/logs` when no home directory is known.
pub fn logs_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tapline")
        .join("logs")
}

/// Compact logging to stderr.
///
/// Fails if a global subscriber is already installed.
pub fn init_stderr() -> Result<(), LoggingError> {
    tracing_subscriber::registry()
        .with(env_filter())
        .with(
            fmt::layer()
                .with_writer(std::io::stderr)
                .with_target(true)
                .with_thread_ids(false)
                .compact(),
        )
        .try_init()?;
    Ok(())
}

/// Logging to `dir/file_name` through a background writer.
///
/// Keep the returned guard alive for as long as events should be flushed;
/// dropping it flushes and stops the writer.
pub fn init_file(
    dir: &Path,
    file_name: &str,
    format: LogFormat,
) -> Result<WorkerGuard, LoggingError> {
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::NEVER)
        .filename_prefix(file_name)
        .build(dir)?;
    let (writer, guard) = tracing_appender::non_blocking(appender);

    let registry = tracing_subscriber::registry().with(env_filter());
    match format {
        LogFormat::Compact => registry
            .with(fmt::layer().with_writer(writer).with_ansi(false).compact())
            .try_init()?,
        LogFormat::Json => registry
            .with(fmt::layer().with_writer(writer).with_ansi(false).json())
            .try_init()?,
    }
    Ok(guard)
}
