//! Assembled content for one stitch.

use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::model::{BoundaryLevel, StitchId, TubeId, UserId};
use crate::preparation::{ProcessId, Question};

/// Fully assembled, shuffled questions for one stitch.
///
/// Built in one piece by a preparation process and never modified after;
/// a cache entry is either a whole `ReadyContent` or absent.
///
/// Age is measured on the monotonic clock. A deserialized value starts
/// with an age of zero until [`with_age_from_timestamp`](Self::with_age_from_timestamp)
/// derives it from `prepared_at`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReadyContent {
    pub user: UserId,
    pub tube: TubeId,
    pub stitch_id: StitchId,
    pub boundary_level: BoundaryLevel,
    pub questions: Vec<Question>,
    pub prepared_at: DateTime<Utc>,
    pub process_id: Option<ProcessId>,
    #[serde(skip, default = "Instant::now")]
    prepared_instant: Instant,
}

impl ReadyContent {
    pub fn new(
        user: UserId,
        tube: TubeId,
        stitch_id: StitchId,
        boundary_level: BoundaryLevel,
        questions: Vec<Question>,
    ) -> Self {
        Self {
            user,
            tube,
            stitch_id,
            boundary_level,
            questions,
            prepared_at: Utc::now(),
            process_id: None,
            prepared_instant: Instant::now(),
        }
    }

    pub fn with_process(mut self, id: ProcessId) -> Self {
        self.process_id = Some(id);
        self
    }

    /// Recompute the monotonic age from `prepared_at`, for content read
    /// back from disk. Returns `None` if that age cannot be represented on
    /// this host's monotonic clock.
    pub fn with_age_from_timestamp(mut self) -> Option<Self> {
        let age = (Utc::now() - self.prepared_at).to_std().unwrap_or_default();
        self.prepared_instant = Instant::now().checked_sub(age)?;
        Some(self)
    }

    /// Time since the content was assembled.
    pub fn age(&self) -> Duration {
        self.prepared_instant.elapsed()
    }

    pub fn len(&self) -> usize {
        self.questions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.questions.is_empty()
    }
}
