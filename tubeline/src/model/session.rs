//! Session results as reported by the content layer.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::ids::{StitchId, UserId};
use super::stitch::BoundaryLevel;
use crate::error::{Result, SchedulerError};

/// Correct-answer count for one session.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionScore {
    pub correct: u32,
    pub total: u32,
}

impl SessionScore {
    /// Validated score. `total` must be positive and `correct <= total`.
    pub fn new(correct: u32, total: u32) -> Result<Self> {
        let score = Self { correct, total };
        score.validate()?;
        Ok(score)
    }

    pub fn validate(&self) -> Result<()> {
        if self.total == 0 {
            return Err(SchedulerError::InvalidPerformanceData(
                "session has no questions".to_string(),
            ));
        }
        if self.correct > self.total {
            return Err(SchedulerError::InvalidPerformanceData(format!(
                "{} correct out of {} questions",
                self.correct, self.total
            )));
        }
        Ok(())
    }

    /// Every question answered correctly. Independent of session size.
    pub fn is_perfect(&self) -> bool {
        self.total > 0 && self.correct == self.total
    }
}

/// A validated session outcome, ready for the repositioning engine.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionResult {
    pub score: SessionScore,
    pub completed_at: DateTime<Utc>,
    /// Highest boundary level the learner handled in this session, if reported.
    pub boundary_level: Option<BoundaryLevel>,
}

impl SessionResult {
    pub fn new(score: SessionScore, completed_at: DateTime<Utc>) -> Self {
        Self {
            score,
            completed_at,
            boundary_level: None,
        }
    }

    pub fn with_boundary_level(mut self, level: BoundaryLevel) -> Self {
        self.boundary_level = Some(level);
        self
    }

    pub fn is_perfect(&self) -> bool {
        self.score.is_perfect()
    }
}

/// Session-completion message accepted at the scheduler boundary.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCompletion {
    pub user_id: UserId,
    pub stitch_id: StitchId,
    pub correct_count: u32,
    pub total_count: u32,
    pub completed_at: DateTime<Utc>,
    #[serde(default)]
    pub boundary_level: Option<u8>,
}

impl SessionCompletion {
    pub fn new(
        user_id: UserId,
        stitch_id: StitchId,
        correct_count: u32,
        total_count: u32,
    ) -> Self {
        Self {
            user_id,
            stitch_id,
            correct_count,
            total_count,
            completed_at: Utc::now(),
            boundary_level: None,
        }
    }

    pub fn at(mut self, completed_at: DateTime<Utc>) -> Self {
        self.completed_at = completed_at;
        self
    }

    pub fn with_boundary_level(mut self, level: u8) -> Self {
        self.boundary_level = Some(level);
        self
    }

    /// Validate the raw message into a [`SessionResult`].
    pub fn to_result(&self) -> Result<SessionResult> {
        let score = SessionScore::new(self.correct_count, self.total_count)?;
        let mut result = SessionResult::new(score, self.completed_at);
        if let Some(level) = self.boundary_level {
            result = result.with_boundary_level(BoundaryLevel::new(level)?);
        }
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::TubeId;

    #[test]
    fn test_perfect_is_size_independent() {
        assert!(SessionScore::new(20, 20).unwrap().is_perfect());
        assert!(SessionScore::new(5, 5).unwrap().is_perfect());
        assert!(!SessionScore::new(18, 20).unwrap().is_perfect());
    }

    #[test]
    fn test_invalid_scores_rejected() {
        assert_eq!(
            SessionScore::new(0, 0).unwrap_err().code(),
            "INVALID_PERFORMANCE_DATA"
        );
        assert_eq!(
            SessionScore::new(21, 20).unwrap_err().code(),
            "INVALID_PERFORMANCE_DATA"
        );
    }

    #[test]
    fn test_completion_to_result() {
        let completion = SessionCompletion::new(
            UserId::new("alice"),
            StitchId::new(TubeId::Tube1, "add", 1),
            20,
            20,
        )
        .with_boundary_level(2);

        let result = completion.to_result().unwrap();
        assert!(result.is_perfect());
        assert_eq!(result.boundary_level.map(|l| l.get()), Some(2));
    }

    #[test]
    fn test_completion_rejects_bad_boundary_level() {
        let completion = SessionCompletion::new(
            UserId::new("alice"),
            StitchId::new(TubeId::Tube1, "add", 1),
            20,
            20,
        )
        .with_boundary_level(9);

        assert!(completion.to_result().is_err());
    }
}
