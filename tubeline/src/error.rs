//! Scheduler error types.
//!
//! Every fallible scheduler operation returns [`Result`]. Errors carry a
//! stable code string (see [`SchedulerError::code`]) for callers that report
//! failures across a process boundary, and a coarse [`ErrorKind`] that
//! tells the caller whether retrying after re-reading state makes sense.

use std::fmt;
use std::time::Duration;

use thiserror::Error;

use crate::model::{StitchId, TubeId, UserId};
use crate::persistence::StoreError;
use crate::preparation::ProcessId;

/// Result type for scheduler operations.
pub type Result<T> = std::result::Result<T, SchedulerError>;

/// Coarse error category.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Stale reference or caller error. Never retried automatically.
    NotFound,
    /// Rejected input. No partial effect occurred.
    Validation,
    /// Concurrent modification. Safe to retry after re-reading state.
    Contention,
    /// Domain boundary reached (e.g. a retired stitch).
    Terminal,
    /// Background content preparation failed.
    Preparation,
    /// Ready-content lookup failed.
    Cache,
    /// State store I/O or encoding failure.
    Storage,
    /// A structural invariant was found broken.
    Invariant,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::NotFound => "not-found",
            ErrorKind::Validation => "validation",
            ErrorKind::Contention => "contention",
            ErrorKind::Terminal => "terminal",
            ErrorKind::Preparation => "preparation",
            ErrorKind::Cache => "cache",
            ErrorKind::Storage => "storage",
            ErrorKind::Invariant => "invariant",
        };
        f.write_str(name)
    }
}

/// Errors raised by the scheduling engine.
#[derive(Debug, Error)]
pub enum SchedulerError {
    #[error("Stitch not found: {0}")]
    StitchNotFound(StitchId),

    #[error("Tube not found: {0}")]
    TubeNotFound(String),

    #[error("User not found: {0}")]
    UserNotFound(UserId),

    #[error("No stitch at position {position} in {tube}")]
    PositionNotFound { tube: TubeId, position: u32 },

    #[error("Invalid skip number {0} (expected one of 4, 8, 15, 30, 100, 1000)")]
    InvalidSkipNumber(u32),

    #[error("Invalid performance data: {0}")]
    InvalidPerformanceData(String),

    #[error("Invalid position range: {0}")]
    InvalidPositionRange(String),

    #[error("Invalid seed: {0}")]
    InvalidSeed(String),

    #[error("Repositioning failed on {tube}: {reason}")]
    RepositioningFailed { tube: TubeId, reason: String },

    #[error("Compression of {tube} would break ordering: {reason}")]
    CompressionWouldBreakOrdering { tube: TubeId, reason: String },

    #[error("Position {position} in {tube} is occupied by {occupant}")]
    PositionOccupied {
        tube: TubeId,
        position: u32,
        occupant: StitchId,
    },

    #[error("Stitch {0} is already retired")]
    StitchAlreadyRetired(StitchId),

    #[error("Rotation failed: {0}")]
    RotationFailed(String),

    #[error("Preparation failed: {0}")]
    PreparationFailed(String),

    #[error("Insufficient facts: {available} available, {requested} requested")]
    InsufficientFacts { available: usize, requested: usize },

    #[error("Preparation timed out after {0:?}")]
    PreparationTimeout(Duration),

    #[error("Preparation already in progress for {user}/{tube} (process {process_id})")]
    WarmingInProgress {
        user: UserId,
        tube: TubeId,
        process_id: ProcessId,
    },

    #[error("Preparation process not found: {0}")]
    ProcessNotFound(ProcessId),

    #[error("No ready content for {user}/{tube}")]
    CacheMiss { user: UserId, tube: TubeId },

    #[error("Content for {user}/{tube} is still being prepared (process {process_id})")]
    StitchNotReady {
        user: UserId,
        tube: TubeId,
        process_id: ProcessId,
    },

    #[error("Ready content for {user}/{tube} expired ({age:?} old)")]
    CacheExpired {
        user: UserId,
        tube: TubeId,
        age: Duration,
    },

    #[error("State store error: {0}")]
    Store(#[from] StoreError),
}

impl SchedulerError {
    /// Stable error code, suitable for reporting across a process boundary.
    pub fn code(&self) -> &'static str {
        match self {
            Self::StitchNotFound(_) => "STITCH_NOT_FOUND",
            Self::TubeNotFound(_) => "TUBE_NOT_FOUND",
            Self::UserNotFound(_) => "USER_NOT_FOUND",
            Self::PositionNotFound { .. } => "POSITION_NOT_FOUND",
            Self::InvalidSkipNumber(_) => "INVALID_SKIP_NUMBER",
            Self::InvalidPerformanceData(_) => "INVALID_PERFORMANCE_DATA",
            Self::InvalidPositionRange(_) => "INVALID_POSITION_RANGE",
            Self::InvalidSeed(_) => "INVALID_SEED",
            Self::RepositioningFailed { .. } => "REPOSITIONING_FAILED",
            Self::CompressionWouldBreakOrdering { .. } => "COMPRESSION_WOULD_BREAK_ORDERING",
            Self::PositionOccupied { .. } => "POSITION_OCCUPIED",
            Self::StitchAlreadyRetired(_) => "STITCH_ALREADY_RETIRED",
            Self::RotationFailed(_) => "ROTATION_FAILED",
            Self::PreparationFailed(_) => "PREPARATION_FAILED",
            Self::InsufficientFacts { .. } => "INSUFFICIENT_FACTS",
            Self::PreparationTimeout(_) => "PREPARATION_TIMEOUT",
            Self::WarmingInProgress { .. } => "WARMING_IN_PROGRESS",
            Self::ProcessNotFound(_) => "PROCESS_NOT_FOUND",
            Self::CacheMiss { .. } => "CACHE_MISS",
            Self::StitchNotReady { .. } => "STITCH_NOT_READY",
            Self::CacheExpired { .. } => "CACHE_EXPIRED",
            Self::Store(StoreError::VersionConflict { .. }) => "VERSION_CONFLICT",
            Self::Store(_) => "STORAGE_ERROR",
        }
    }

    /// Error category.
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::StitchNotFound(_)
            | Self::TubeNotFound(_)
            | Self::UserNotFound(_)
            | Self::PositionNotFound { .. }
            | Self::ProcessNotFound(_) => ErrorKind::NotFound,
            Self::InvalidSkipNumber(_)
            | Self::InvalidPerformanceData(_)
            | Self::InvalidPositionRange(_)
            | Self::InvalidSeed(_) => ErrorKind::Validation,
            Self::RepositioningFailed { .. }
            | Self::CompressionWouldBreakOrdering { .. }
            | Self::PositionOccupied { .. }
            | Self::WarmingInProgress { .. } => ErrorKind::Contention,
            Self::StitchAlreadyRetired(_) => ErrorKind::Terminal,
            Self::PreparationFailed(_)
            | Self::InsufficientFacts { .. }
            | Self::PreparationTimeout(_) => ErrorKind::Preparation,
            Self::CacheMiss { .. } | Self::StitchNotReady { .. } | Self::CacheExpired { .. } => {
                ErrorKind::Cache
            }
            Self::RotationFailed(_) => ErrorKind::Invariant,
            Self::Store(StoreError::VersionConflict { .. }) => ErrorKind::Contention,
            Self::Store(_) => ErrorKind::Storage,
        }
    }

    /// Returns true if the caller may retry after re-reading current state.
    pub fn is_retryable(&self) -> bool {
        self.kind() == ErrorKind::Contention
    }

    /// The store holds a newer version than the one this write was based on.
    pub fn is_version_conflict(&self) -> bool {
        matches!(self, Self::Store(StoreError::VersionConflict { .. }))
    }
}
