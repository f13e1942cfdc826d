//! Three-tube rotation state.

use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::model::{StitchId, TubeId};

/// Role of a tube in the rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TubeState {
    /// Being studied now.
    Live,
    /// Content assembled, next in line.
    Ready,
    /// Content being assembled in the background.
    Preparing,
}

impl TubeState {
    /// The role a tube takes after one rotation.
    pub fn rotated(self) -> Self {
        match self {
            TubeState::Live => TubeState::Preparing,
            TubeState::Ready => TubeState::Live,
            TubeState::Preparing => TubeState::Ready,
        }
    }
}

impl fmt::Display for TubeState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            TubeState::Live => "LIVE",
            TubeState::Ready => "READY",
            TubeState::Preparing => "PREPARING",
        };
        f.write_str(name)
    }
}

/// Why a rotation happened.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum RotationTrigger {
    SessionCompleted { stitch_id: StitchId },
    Manual,
    Administrative { reason: String },
}

impl fmt::Display for RotationTrigger {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RotationTrigger::SessionCompleted { stitch_id } => {
                write!(f, "session completed ({})", stitch_id)
            }
            RotationTrigger::Manual => f.write_str("manual"),
            RotationTrigger::Administrative { reason } => write!(f, "administrative: {}", reason),
        }
    }
}

/// One tube's role change during a rotation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct TubeTransition {
    pub tube: TubeId,
    pub from: TubeState,
    pub to: TubeState,
}

/// Outcome of a rotation.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LiveAidRotationResult {
    pub transitions: Vec<TubeTransition>,
    pub trigger: RotationTrigger,
    pub rotation_count: u64,
    pub rotated_at: DateTime<Utc>,
    pub live: TubeId,
    pub ready: TubeId,
    pub preparing: TubeId,
    /// Rotation state version after the rotation.
    pub version: u64,
}

/// Roles of a learner's three tubes.
///
/// The roles always form a permutation of LIVE, READY and PREPARING. State
/// loaded from elsewhere is checked with [`validate`](Self::validate)
/// before every rotation; an inconsistent state is reported and left alone,
/// never repaired.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiveAidState {
    states: [TubeState; 3],
    rotation_count: u64,
    version: u64,
    #[serde(default)]
    last_rotated_at: Option<DateTime<Utc>>,
    #[serde(default)]
    last_trigger: Option<RotationTrigger>,
}

impl Default for LiveAidState {
    fn default() -> Self {
        Self::initial()
    }
}

impl LiveAidState {
    /// Tube 1 live, tube 2 ready, tube 3 preparing.
    pub fn initial() -> Self {
        Self {
            states: [TubeState::Live, TubeState::Ready, TubeState::Preparing],
            rotation_count: 0,
            version: 0,
            last_rotated_at: None,
            last_trigger: None,
        }
    }

    /// Build a state from explicit roles without checking them.
    pub fn from_states(states: [TubeState; 3]) -> Self {
        Self {
            states,
            ..Self::initial()
        }
    }

    pub fn state_of(&self, tube: TubeId) -> TubeState {
        self.states[tube.index()]
    }

    pub fn rotation_count(&self) -> u64 {
        self.rotation_count
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn last_rotated_at(&self) -> Option<DateTime<Utc>> {
        self.last_rotated_at
    }

    pub fn last_trigger(&self) -> Option<&RotationTrigger> {
        self.last_trigger.as_ref()
    }

    /// All tubes with their roles, in tube order.
    pub fn tubes(&self) -> impl Iterator<Item = (TubeId, TubeState)> + '_ {
        TubeId::ALL.into_iter().map(|t| (t, self.state_of(t)))
    }

    /// The single tube holding `state`.
    pub fn tube_in(&self, state: TubeState) -> Result<TubeId> {
        let mut found = TubeId::ALL.into_iter().filter(|t| self.state_of(*t) == state);
        match (found.next(), found.next()) {
            (Some(tube), None) => Ok(tube),
            (None, _) => Err(SchedulerError::RotationFailed(format!(
                "no tube is {} ({})",
                state, self
            ))),
            (Some(_), Some(_)) => Err(SchedulerError::RotationFailed(format!(
                "more than one tube is {} ({})",
                state, self
            ))),
        }
    }

    pub fn live(&self) -> Result<TubeId> {
        self.tube_in(TubeState::Live)
    }

    pub fn ready(&self) -> Result<TubeId> {
        self.tube_in(TubeState::Ready)
    }

    pub fn preparing(&self) -> Result<TubeId> {
        self.tube_in(TubeState::Preparing)
    }

    /// Check that each role is held by exactly one tube.
    pub fn validate(&self) -> Result<()> {
        self.live()?;
        self.ready()?;
        self.preparing()?;
        Ok(())
    }

    /// Advance every tube one role: LIVE to PREPARING, READY to LIVE,
    /// PREPARING to READY. All three change together or none do.
    pub fn rotate(
        &mut self,
        trigger: RotationTrigger,
        now: DateTime<Utc>,
    ) -> Result<LiveAidRotationResult> {
        self.validate()?;

        let transitions: Vec<TubeTransition> = self
            .tubes()
            .map(|(tube, from)| TubeTransition {
                tube,
                from,
                to: from.rotated(),
            })
            .collect();

        for transition in &transitions {
            self.states[transition.tube.index()] = transition.to;
        }
        self.rotation_count += 1;
        self.version += 1;
        self.last_rotated_at = Some(now);
        self.last_trigger = Some(trigger.clone());

        Ok(LiveAidRotationResult {
            transitions,
            trigger,
            rotation_count: self.rotation_count,
            rotated_at: now,
            live: self.live()?,
            ready: self.ready()?,
            preparing: self.preparing()?,
            version: self.version,
        })
    }
}

impl fmt::Display for LiveAidState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "tube1={} tube2={} tube3={}",
            self.states[0], self.states[1], self.states[2]
        )
    }
}
