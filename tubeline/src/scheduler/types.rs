//! Inputs and outputs of the scheduler facade.

use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};

use crate::cache::ReadyContent;
use crate::error::SchedulerError;
use crate::model::{Stitch, StitchId, StitchProgress, TubeId};
use crate::position::{CompressionResult, LogicalPosition};
use crate::reposition::RepositionResult;
use crate::rotation::{RotationOutcome, TubeState};

/// Initial content for a new learner.
///
/// Stitches are grouped by the tube named in their id and placed at
/// positions `1..=n` in creation order.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct UserSeed {
    pub stitches: Vec<Stitch>,
}

impl UserSeed {
    pub fn new(stitches: Vec<Stitch>) -> Self {
        Self { stitches }
    }

    pub(crate) fn for_tube(&self, tube: TubeId) -> Vec<Stitch> {
        self.stitches
            .iter()
            .filter(|s| s.id.tube == tube)
            .cloned()
            .collect()
    }
}

/// Everything that happened as a result of one session completion.
#[derive(Debug)]
pub struct SessionOutcome {
    pub reposition: RepositionResult,
    /// Set if the tube crossed the gap threshold and was compressed.
    pub compression: Option<CompressionResult>,
    /// Set if the completion rotated the tubes.
    pub rotation: Option<RotationOutcome>,
    /// A rotation was due but failed. The session itself was still applied.
    pub rotation_error: Option<SchedulerError>,
}

/// Where served content came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ContentSource {
    /// Fresh from the ready cache.
    Ready,
    /// Past max age but still for the right stitch.
    Stale,
    /// Assembled on demand because nothing usable was cached.
    Emergency,
}

impl fmt::Display for ContentSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ContentSource::Ready => "ready",
            ContentSource::Stale => "stale",
            ContentSource::Emergency => "emergency",
        };
        f.write_str(name)
    }
}

/// Content handed to the learner for the LIVE tube.
#[derive(Debug, Clone)]
pub struct ServedContent {
    pub content: Arc<ReadyContent>,
    pub source: ContentSource,
}

/// Read-only view of one tube.
#[derive(Debug, Clone, Serialize)]
pub struct TubeView {
    pub tube: TubeId,
    pub state: TubeState,
    pub version: u64,
    pub active: Option<StitchId>,
    pub positions: Vec<(LogicalPosition, StitchId)>,
    pub gap_count: u32,
    pub progress: Vec<StitchProgress>,
}
