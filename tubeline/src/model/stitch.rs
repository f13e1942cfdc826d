//! Stitches and per-learner stitch progress.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::StitchId;
use super::skip::SkipNumber;
use crate::error::SchedulerError;

/// Distractor difficulty / mastery level, 1 through 5.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(try_from = "u8", into = "u8")]
pub struct BoundaryLevel(u8);

impl BoundaryLevel {
    pub const MIN: BoundaryLevel = BoundaryLevel(1);
    pub const MAX: BoundaryLevel = BoundaryLevel(5);

    pub fn new(level: u8) -> Result<Self, SchedulerError> {
        if (Self::MIN.0..=Self::MAX.0).contains(&level) {
            Ok(Self(level))
        } else {
            Err(SchedulerError::InvalidPerformanceData(format!(
                "boundary level {} outside 1..=5",
                level
            )))
        }
    }

    pub fn get(self) -> u8 {
        self.0
    }
}

impl Default for BoundaryLevel {
    fn default() -> Self {
        Self::MIN
    }
}

impl TryFrom<u8> for BoundaryLevel {
    type Error = SchedulerError;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        Self::new(value)
    }
}

impl From<BoundaryLevel> for u8 {
    fn from(level: BoundaryLevel) -> Self {
        level.0
    }
}

impl fmt::Display for BoundaryLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Immutable content specification for one learning unit.
///
/// A stitch does not hold questions; it names the facts questions are built
/// from. Stitches are never mutated once created, only referenced by
/// position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Stitch {
    pub id: StitchId,
    #[serde(default)]
    pub title: String,
    pub fact_ids: Vec<String>,
}

impl Stitch {
    pub fn new(id: StitchId, title: impl Into<String>, fact_ids: Vec<String>) -> Self {
        Self {
            id,
            title: title.into(),
            fact_ids,
        }
    }
}

/// Per-learner progress on one stitch.
///
/// Only the repositioning engine mutates progress. Entries are never
/// deleted; retired stitches stay queryable.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StitchProgress {
    pub stitch_id: StitchId,
    pub skip_number: SkipNumber,
    pub boundary_level: BoundaryLevel,
    pub completions: u32,
    pub consecutive_perfect: u32,
    #[serde(default)]
    pub last_session_at: Option<DateTime<Utc>>,
}

impl StitchProgress {
    /// Progress for a stitch on first encounter: skip 4, boundary level 1.
    pub fn new(stitch_id: StitchId) -> Self {
        Self {
            stitch_id,
            skip_number: SkipNumber::first(),
            boundary_level: BoundaryLevel::MIN,
            completions: 0,
            consecutive_perfect: 0,
            last_session_at: None,
        }
    }

    pub fn is_retired(&self) -> bool {
        self.skip_number.is_retired()
    }

    /// Raise the boundary level if `reported` is higher. Returns true if it changed.
    pub fn ratchet_boundary(&mut self, reported: BoundaryLevel) -> bool {
        if reported > self.boundary_level {
            self.boundary_level = reported;
            true
        } else {
            false
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TubeId;

    #[test]
    fn test_boundary_level_bounds() {
        assert!(BoundaryLevel::new(0).is_err());
        assert!(BoundaryLevel::new(6).is_err());
        assert_eq!(BoundaryLevel::new(3).unwrap().get(), 3);
    }

    #[test]
    fn test_new_progress_defaults() {
        let progress = StitchProgress::new(StitchId::new(TubeId::Tube1, "add", 1));
        assert_eq!(progress.skip_number, SkipNumber::Four);
        assert_eq!(progress.boundary_level, BoundaryLevel::MIN);
        assert_eq!(progress.completions, 0);
        assert!(!progress.is_retired());
    }

    #[test]
    fn test_boundary_ratchet_never_decreases() {
        let mut progress = StitchProgress::new(StitchId::new(TubeId::Tube1, "add", 1));
        assert!(progress.ratchet_boundary(BoundaryLevel::new(3).unwrap()));
        assert!(!progress.ratchet_boundary(BoundaryLevel::new(2).unwrap()));
        assert_eq!(progress.boundary_level.get(), 3);
        assert!(!progress.ratchet_boundary(BoundaryLevel::new(3).unwrap()));
    }
}
