//! CLI error types.

use std::fmt;
use std::path::PathBuf;

use tubeline::config::ConfigError;
use tubeline::logging::LoggingError;
use tubeline::persistence::StoreError;
use tubeline::SchedulerError;

/// Errors surfaced to the terminal.
#[derive(Debug)]
pub enum CliError {
    /// Configuration file could not be loaded or saved, or a value is invalid.
    Config(String),
    /// Logging could not be set up.
    Logging(LoggingError),
    /// State directory could not be opened.
    Storage(StoreError),
    /// A seed or facts file could not be read.
    SeedFile { path: PathBuf, message: String },
    /// Command-line input did not parse.
    InvalidArgument(String),
    /// The async runtime could not be started.
    Runtime(String),
    /// A scheduling operation failed.
    Scheduler(SchedulerError),
}

impl CliError {
    /// Process exit code. Contention errors get their own code so scripts
    /// can retry.
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Config(_) | CliError::InvalidArgument(_) => 2,
            CliError::Scheduler(e) if e.is_retryable() => 75,
            _ => 1,
        }
    }
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            CliError::Config(msg) => write!(f, "Configuration error: {}", msg),
            CliError::Logging(e) => write!(f, "Logging error: {}", e),
            CliError::Storage(e) => write!(f, "Storage error: {}", e),
            CliError::SeedFile { path, message } => {
                write!(f, "Could not read {}: {}", path.display(), message)
            }
            CliError::InvalidArgument(msg) => write!(f, "Invalid argument: {}", msg),
            CliError::Runtime(msg) => write!(f, "Runtime error: {}", msg),
            CliError::Scheduler(e) => write!(f, "[{}] {}", e.code(), e),
        }
    }
}

impl std::error::Error for CliError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            CliError::Logging(e) => Some(e),
            CliError::Storage(e) => Some(e),
            CliError::Scheduler(e) => Some(e),
            _ => None,
        }
    }
}

impl From<ConfigError> for CliError {
    fn from(e: ConfigError) -> Self {
        CliError::Config(e.to_string())
    }
}

impl From<LoggingError> for CliError {
    fn from(e: LoggingError) -> Self {
        CliError::Logging(e)
    }
}

impl From<StoreError> for CliError {
    fn from(e: StoreError) -> Self {
        CliError::Storage(e)
    }
}

impl From<SchedulerError> for CliError {
    fn from(e: SchedulerError) -> Self {
        CliError::Scheduler(e)
    }
}
