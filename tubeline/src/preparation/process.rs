//! Preparation process records.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{BoundaryLevel, Stitch, StitchId, TubeId, UserId};

/// Identifier of one preparation process. Unique per coordinator.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct ProcessId(u64);

impl ProcessId {
    pub fn new(id: u64) -> Self {
        Self(id)
    }

    pub fn get(self) -> u64 {
        self.0
    }
}

impl fmt::Display for ProcessId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "prep-{}", self.0)
    }
}

/// Scheduling priority of a preparation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationPriority {
    /// Opportunistic warming. Rejected if the tube already has work in flight.
    Background,
    /// Queued behind any in-flight work for the tube.
    Normal,
    /// Cancels in-flight work for the tube and runs immediately.
    Emergency,
}

impl fmt::Display for PreparationPriority {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreparationPriority::Background => "background",
            PreparationPriority::Normal => "normal",
            PreparationPriority::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// Lifecycle status. `Completed`, `Failed` and `Cancelled` are final.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStatus {
    Queued,
    InProgress,
    Completed,
    Failed,
    Cancelled,
}

impl PreparationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(
            self,
            PreparationStatus::Completed | PreparationStatus::Failed | PreparationStatus::Cancelled
        )
    }
}

impl fmt::Display for PreparationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            PreparationStatus::Queued => "queued",
            PreparationStatus::InProgress => "in_progress",
            PreparationStatus::Completed => "completed",
            PreparationStatus::Failed => "failed",
            PreparationStatus::Cancelled => "cancelled",
        };
        f.write_str(name)
    }
}

/// Finer-grained position within a running process.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PreparationStage {
    /// Waiting for earlier work on the same tube.
    Waiting,
    /// Building questions.
    Generating,
    /// Shuffling and packaging.
    Assembling,
    /// Writing to the ready cache.
    Committing,
    Finished,
}

impl PreparationStage {
    /// Nominal progress fraction at the start of the stage.
    pub fn progress(self) -> f32 {
        match self {
            PreparationStage::Waiting => 0.0,
            PreparationStage::Generating => 0.1,
            PreparationStage::Assembling => 0.7,
            PreparationStage::Committing => 0.9,
            PreparationStage::Finished => 1.0,
        }
    }
}

/// A request to prepare content for one tube.
#[derive(Debug, Clone)]
pub struct PreparationRequest {
    pub user: UserId,
    pub tube: TubeId,
    pub stitch: Arc<Stitch>,
    pub boundary_level: BoundaryLevel,
    pub priority: PreparationPriority,
    /// Overrides the configured question count.
    pub question_count: Option<usize>,
}

impl PreparationRequest {
    pub fn new(
        user: UserId,
        tube: TubeId,
        stitch: Arc<Stitch>,
        boundary_level: BoundaryLevel,
    ) -> Self {
        Self {
            user,
            tube,
            stitch,
            boundary_level,
            priority: PreparationPriority::Normal,
            question_count: None,
        }
    }

    pub fn with_priority(mut self, priority: PreparationPriority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_question_count(mut self, count: usize) -> Self {
        self.question_count = Some(count);
        self
    }
}

/// Snapshot of a preparation process.
#[derive(Debug, Clone, Serialize)]
pub struct PreparationProcess {
    pub id: ProcessId,
    pub user: UserId,
    pub tube: TubeId,
    pub stitch_id: StitchId,
    pub boundary_level: BoundaryLevel,
    pub priority: PreparationPriority,
    pub status: PreparationStatus,
    pub stage: PreparationStage,
    pub progress: f32,
    /// Error code of the failure, for `Failed` processes.
    pub error_code: Option<String>,
    /// Human-readable failure or cancellation reason.
    pub reason: Option<String>,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    #[serde(skip)]
    pub(crate) finished: Option<Instant>,
}

impl PreparationProcess {
    pub(crate) fn queued(id: ProcessId, request: &PreparationRequest) -> Self {
        let now = Utc::now();
        Self {
            id,
            user: request.user.clone(),
            tube: request.tube,
            stitch_id: request.stitch.id.clone(),
            boundary_level: request.boundary_level,
            priority: request.priority,
            status: PreparationStatus::Queued,
            stage: PreparationStage::Waiting,
            progress: 0.0,
            error_code: None,
            reason: None,
            created_at: now,
            updated_at: now,
            finished: None,
        }
    }

    pub fn is_terminal(&self) -> bool {
        self.status.is_terminal()
    }

    /// Time since the process reached a final status.
    pub fn finished_for(&self) -> Option<Duration> {
        self.finished.map(|at| at.elapsed())
    }

    pub(crate) fn advance(&mut self, status: PreparationStatus, stage: PreparationStage) {
        self.status = status;
        self.stage = stage;
        self.progress = stage.progress();
        self.updated_at = Utc::now();
    }

    pub(crate) fn finish(&mut self, status: PreparationStatus) {
        self.advance(status, PreparationStage::Finished);
        if status != PreparationStatus::Completed {
            self.progress = 0.0;
        }
        self.finished = Some(Instant::now());
    }
}

/// Progress notification broadcast by the coordinator.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PreparationEvent {
    pub process_id: ProcessId,
    pub user: UserId,
    pub tube: TubeId,
    pub status: PreparationStatus,
    pub stage: PreparationStage,
    pub progress: f32,
}

impl From<&PreparationProcess> for PreparationEvent {
    fn from(process: &PreparationProcess) -> Self {
        Self {
            process_id: process.id,
            user: process.user.clone(),
            tube: process.tube,
            status: process.status,
            stage: process.stage,
            progress: process.progress,
        }
    }
}
