//! Tracing subscriber setup.
//!
//! Library code only emits `tracing` events; binaries call [`init_logging`]
//! once at startup to decide where they go.

use thiserror::Error;
use tracing_appender::non_blocking::WorkerGuard;
use tracing_subscriber::fmt::time::OffsetTime;
use tracing_subscriber::layer::SubscriberExt;
use tracing_subscriber::util::SubscriberInitExt;
use tracing_subscriber::EnvFilter;

use crate::config::LoggingConfig;

/// Errors installing the global subscriber.
#[derive(Debug, Error)]
pub enum LoggingError {
    #[error("Invalid log filter '{filter}': {message}")]
    InvalidFilter { filter: String, message: String },

    #[error("Failed to create log directory: {0}")]
    Io(#[from] std::io::Error),

    #[error("A global subscriber is already installed")]
    AlreadyInitialized,
}

/// Keeps the background log writer alive. Drop it only at shutdown;
/// buffered file output is flushed when it goes.
#[must_use = "dropping the guard stops file logging"]
pub struct LoggingGuard {
    _file: Option<WorkerGuard>,
}

/// Install the global subscriber.
///
/// `RUST_LOG` takes precedence over `config.level`. Console output goes to
/// stderr; if `config.log_dir` is set, output is also written to a
/// daily-rolling file there.
pub fn init_logging(config: &LoggingConfig) -> Result<LoggingGuard, LoggingError> {
    let filter = match EnvFilter::try_from_default_env() {
        Ok(filter) => filter,
        Err(_) => {
            EnvFilter::try_new(&config.level).map_err(|e| LoggingError::InvalidFilter {
                filter: config.level.clone(),
                message: e.to_string(),
            })?
        }
    };

    let console = tracing_subscriber::fmt::layer()
        .with_writer(std::io::stderr)
        .with_timer(local_timer())
        .with_target(false);

    let (file, guard) = match &config.log_dir {
        Some(dir) => {
            std::fs::create_dir_all(dir)?;
            let appender = tracing_appender::rolling::daily(dir, &config.file_prefix);
            let (writer, guard) = tracing_appender::non_blocking(appender);
            let layer = tracing_subscriber::fmt::layer()
                .with_writer(writer)
                .with_timer(local_timer())
                .with_ansi(false);
            (Some(layer), Some(guard))
        }
        None => (None, None),
    };

    tracing_subscriber::registry()
        .with(filter)
        .with(console)
        .with(file)
        .try_init()
        .map_err(|_| LoggingError::AlreadyInitialized)?;

    Ok(LoggingGuard { _file: guard })
}

fn local_timer() -> OffsetTime<time::format_description::well_known::Rfc3339> {
    OffsetTime::local_rfc_3339().unwrap_or_else(|_| {
        OffsetTime::new(
            time::UtcOffset::UTC,
            time::format_description::well_known::Rfc3339,
        )
    })
}
