//! Repositioning engine.
//!
//! Applies one session result to a tube: updates the stitch's progress and,
//! on a perfect session, moves the stitch to the position named by the skip
//! number it held going in. The stored skip number then advances, so the
//! next perfect session sends it further.
//!
//! Writers never mutate a record in place. The engine locks the tube,
//! clones the record, applies the session to the clone, hands the clone to
//! a commit callback (normally a version-checked store write), and only then
//! swaps it in. Any failure along the way leaves the stored and in-memory
//! state exactly as it was.

use std::time::Duration;

use chrono::{DateTime, Utc};
use parking_lot::Mutex;
use serde::Serialize;
use tracing::{debug, info};

use crate::config::DEFAULT_LOCK_TIMEOUT;
use crate::error::{Result, SchedulerError};
use crate::model::{BoundaryLevel, SessionResult, SkipNumber, StitchId, TubeId};
use crate::position::LogicalPosition;
use crate::progression::{SkipCalculation, SkipProgressionCalculator};
use crate::tube::TubeRecord;

/// How to treat a perfect session on a retired stitch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum RepositionMode {
    /// Record it as a review: counters update, no movement.
    #[default]
    Standard,
    /// The caller expects the stitch to move; a retired stitch is an error.
    ExpectMovement,
}

/// Outcome of one repositioning.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RepositionResult {
    pub tube: TubeId,
    pub stitch_id: StitchId,
    pub previous_position: LogicalPosition,
    pub new_position: LogicalPosition,
    pub skip_number: SkipNumber,
    pub boundary_level: BoundaryLevel,
    pub boundary_level_changed: bool,
    pub timestamp: DateTime<Utc>,
    pub calculation: SkipCalculation,
    /// Record version after the write.
    pub version: u64,
}

impl RepositionResult {
    pub fn moved(&self) -> bool {
        self.previous_position != self.new_position
    }
}

/// Applies session results to tube records.
#[derive(Debug, Clone)]
pub struct RepositioningEngine {
    calculator: SkipProgressionCalculator,
    lock_timeout: Duration,
}

impl Default for RepositioningEngine {
    fn default() -> Self {
        Self::new(DEFAULT_LOCK_TIMEOUT)
    }
}

impl RepositioningEngine {
    pub fn new(lock_timeout: Duration) -> Self {
        Self {
            calculator: SkipProgressionCalculator::new(),
            lock_timeout,
        }
    }

    pub fn lock_timeout(&self) -> Duration {
        self.lock_timeout
    }

    /// Apply a session to the tube behind `slot`.
    ///
    /// `commit` receives the updated record and must persist it; if it
    /// fails, nothing changes. Repositionings on one tube are serialized by
    /// the slot lock. If the lock is not acquired within the configured
    /// timeout the call fails with `REPOSITIONING_FAILED`.
    pub fn reposition_stitch<C>(
        &self,
        slot: &Mutex<TubeRecord>,
        stitch_id: &StitchId,
        session: &SessionResult,
        mode: RepositionMode,
        commit: C,
    ) -> Result<RepositionResult>
    where
        C: FnOnce(&TubeRecord) -> Result<()>,
    {
        let mut guard =
            slot.try_lock_for(self.lock_timeout)
                .ok_or_else(|| SchedulerError::RepositioningFailed {
                    tube: stitch_id.tube,
                    reason: format!(
                        "tube busy, lock not acquired within {:?}",
                        self.lock_timeout
                    ),
                })?;

        let mut next = guard.clone();
        let mut result = self.apply(&mut next, stitch_id, session, mode)?;
        next.version = guard.version + 1;
        result.version = next.version;

        commit(&next)?;
        *guard = next;

        if result.moved() {
            info!(
                tube = %result.tube,
                stitch = %result.stitch_id,
                from = %result.previous_position,
                to = %result.new_position,
                skip = %result.skip_number,
                "Stitch repositioned"
            );
        } else {
            debug!(
                tube = %result.tube,
                stitch = %result.stitch_id,
                skip = %result.skip_number,
                reason = %result.calculation.reasoning,
                "Stitch progress updated in place"
            );
        }
        Ok(result)
    }

    /// Apply a session to a record the caller already holds exclusively.
    ///
    /// Mutates `record` only on success. The record version is left for the
    /// caller to bump.
    pub fn apply(
        &self,
        record: &mut TubeRecord,
        stitch_id: &StitchId,
        session: &SessionResult,
        mode: RepositionMode,
    ) -> Result<RepositionResult> {
        session.score.validate()?;

        let previous_position = record
            .positions
            .position_of(stitch_id)
            .ok_or_else(|| SchedulerError::StitchNotFound(stitch_id.clone()))?;

        if let Some(last) = record.last_session_at {
            if session.completed_at < last {
                return Err(SchedulerError::RepositioningFailed {
                    tube: record.tube,
                    reason: format!(
                        "session completed at {} precedes last applied session at {}",
                        session.completed_at, last
                    ),
                });
            }
        }

        let mut progress = record.progress(stitch_id)?;
        let calculation = self.calculator.calculate_skip_number(
            progress.skip_number,
            progress.consecutive_perfect,
            session.score,
        )?;

        if calculation.is_review() && mode == RepositionMode::ExpectMovement {
            return Err(SchedulerError::StitchAlreadyRetired(stitch_id.clone()));
        }

        let new_position = if calculation.is_advancement {
            let target = LogicalPosition::new(calculation.previous_skip_number.value())?;
            record.positions.relocate(stitch_id, target)?;
            target
        } else {
            previous_position
        };

        let boundary_level_changed = session
            .boundary_level
            .map(|reported| progress.ratchet_boundary(reported))
            .unwrap_or(false);

        progress.skip_number = calculation.next_skip_number;
        progress.consecutive_perfect = calculation.consecutive_perfect;
        progress.completions += 1;
        progress.last_session_at = Some(session.completed_at);

        let result = RepositionResult {
            tube: record.tube,
            stitch_id: stitch_id.clone(),
            previous_position,
            new_position,
            skip_number: progress.skip_number,
            boundary_level: progress.boundary_level,
            boundary_level_changed,
            timestamp: session.completed_at,
            calculation,
            version: record.version,
        };

        record.progress.insert(stitch_id.clone(), progress);
        record.last_session_at = Some(session.completed_at);
        Ok(result)
    }
}
