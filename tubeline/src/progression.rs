//! Skip-number progression.
//!
//! Pure calculation: given a stitch's current skip number, its run of
//! perfect sessions, and a new session score, decide the next skip number.
//! A perfect session advances one step along [`SKIP_SEQUENCE`]; anything
//! less resets to the first step.
//!
//! [`SKIP_SEQUENCE`]: crate::model::SKIP_SEQUENCE

use serde::Serialize;

use crate::error::Result;
use crate::model::{SessionScore, SkipNumber};

/// Result of one skip calculation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SkipCalculation {
    pub previous_skip_number: SkipNumber,
    pub next_skip_number: SkipNumber,
    /// The skip number moved up a step.
    pub is_advancement: bool,
    /// The session was imperfect and progress went back to the first step.
    pub is_reset: bool,
    pub consecutive_perfect: u32,
    pub reasoning: String,
}

impl SkipCalculation {
    /// A perfect session on an already-retired stitch.
    pub fn is_review(&self) -> bool {
        !self.is_reset && self.previous_skip_number.is_retired()
    }
}

/// Computes skip-number transitions.
#[derive(Debug, Clone, Copy, Default)]
pub struct SkipProgressionCalculator;

impl SkipProgressionCalculator {
    pub fn new() -> Self {
        Self
    }

    /// Next skip number from a raw integer, validating it is a sequence member.
    pub fn calculate_from_raw(
        &self,
        current: u32,
        consecutive_perfect: u32,
        score: SessionScore,
    ) -> Result<SkipCalculation> {
        let current = SkipNumber::try_from(current)?;
        self.calculate_skip_number(current, consecutive_perfect, score)
    }

    pub fn calculate_skip_number(
        &self,
        current: SkipNumber,
        consecutive_perfect: u32,
        score: SessionScore,
    ) -> Result<SkipCalculation> {
        score.validate()?;

        if !score.is_perfect() {
            return Ok(SkipCalculation {
                previous_skip_number: current,
                next_skip_number: SkipNumber::first(),
                is_advancement: false,
                is_reset: true,
                consecutive_perfect: 0,
                reasoning: format!(
                    "{}/{} correct, reset from {} to {}",
                    score.correct,
                    score.total,
                    current,
                    SkipNumber::first()
                ),
            });
        }

        let next = current.next();
        let is_advancement = next != current;
        let reasoning = if is_advancement {
            format!("perfect session, advanced from {} to {}", current, next)
        } else {
            format!("perfect session, already retired at {}", current)
        };

        Ok(SkipCalculation {
            previous_skip_number: current,
            next_skip_number: next,
            is_advancement,
            is_reset: false,
            consecutive_perfect: consecutive_perfect.saturating_add(1),
            reasoning,
        })
    }
}
