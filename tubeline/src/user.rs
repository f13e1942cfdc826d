//! In-memory state of one learner.

use chrono::{DateTime, Utc};
use parking_lot::Mutex;

use crate::error::{Result, SchedulerError};
use crate::model::{TubeId, UserId};
use crate::persistence::UserSnapshot;
use crate::rotation::LiveAidState;
use crate::tube::TubeRecord;

/// A learner's three tubes and their rotation state.
///
/// Each tube has its own lock, so work on different tubes never contends.
/// The rotation state has a separate lock, and no code path holds it
/// together with a tube lock.
#[derive(Debug)]
pub struct UserState {
    user_id: UserId,
    tubes: [Mutex<TubeRecord>; 3],
    rotation: Mutex<LiveAidState>,
    created_at: DateTime<Utc>,
}

impl UserState {
    /// A new learner in the initial rotation.
    pub fn new(user_id: UserId, records: [TubeRecord; 3]) -> Self {
        Self {
            user_id,
            tubes: records.map(Mutex::new),
            rotation: Mutex::new(LiveAidState::initial()),
            created_at: Utc::now(),
        }
    }

    pub fn user_id(&self) -> &UserId {
        &self.user_id
    }

    pub fn created_at(&self) -> DateTime<Utc> {
        self.created_at
    }

    pub fn tube(&self, tube: TubeId) -> &Mutex<TubeRecord> {
        &self.tubes[tube.index()]
    }

    pub fn rotation(&self) -> &Mutex<LiveAidState> {
        &self.rotation
    }

    pub fn live_aid_state(&self) -> LiveAidState {
        self.rotation.lock().clone()
    }

    pub fn snapshot(&self) -> UserSnapshot {
        UserSnapshot {
            user_id: self.user_id.clone(),
            tubes: self.tubes.iter().map(|t| t.lock().snapshot()).collect(),
            rotation: self.rotation.lock().clone(),
            created_at: self.created_at,
        }
    }

    /// Rebuild from stored state. The rotation state is restored as stored,
    /// without repair; an inconsistent one surfaces on the next rotation.
    pub fn from_snapshot(snapshot: UserSnapshot) -> Result<Self> {
        let UserSnapshot {
            user_id,
            tubes,
            rotation,
            created_at,
        } = snapshot;

        let mut slots: [Option<TubeRecord>; 3] = [None, None, None];
        for tube in tubes {
            let index = tube.tube.index();
            if slots[index].is_some() {
                return Err(SchedulerError::InvalidSeed(format!(
                    "{} stored twice for {}",
                    tube.tube, user_id
                )));
            }
            slots[index] = Some(TubeRecord::from_snapshot(tube)?);
        }

        let [t1, t2, t3] = slots;
        let missing = |tube: TubeId| {
            SchedulerError::InvalidSeed(format!("{} missing for {}", tube, user_id))
        };
        let records = [
            t1.ok_or_else(|| missing(TubeId::Tube1))?,
            t2.ok_or_else(|| missing(TubeId::Tube2))?,
            t3.ok_or_else(|| missing(TubeId::Tube3))?,
        ];

        Ok(Self {
            tubes: records.map(Mutex::new),
            rotation: Mutex::new(rotation),
            created_at,
            user_id,
        })
    }
}
