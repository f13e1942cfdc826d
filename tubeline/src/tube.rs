//! Per-user, per-tube scheduling record.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use crate::error::{Result, SchedulerError};
use crate::model::{BoundaryLevel, Stitch, StitchId, StitchProgress, TubeId};
use crate::persistence::TubeSnapshot;
use crate::position::{PositionStore, PositionStoreSnapshot};

/// One learner's state for one tube: the position map, the stitches it
/// references, and the learner's progress on each.
///
/// Records are mutated copy-on-write: writers clone, apply, persist, then
/// swap the clone in under the tube lock. A failed step leaves the
/// original untouched.
#[derive(Debug, Clone, PartialEq)]
pub struct TubeRecord {
    pub(crate) tube: TubeId,
    pub(crate) positions: PositionStore,
    pub(crate) stitches: HashMap<StitchId, Arc<Stitch>>,
    pub(crate) progress: HashMap<StitchId, StitchProgress>,
    pub(crate) last_session_at: Option<DateTime<Utc>>,
    pub(crate) version: u64,
}

impl TubeRecord {
    /// Build a record with stitches at positions `1..=n` in creation order.
    pub fn seeded(tube: TubeId, mut stitches: Vec<Stitch>) -> Result<Self> {
        stitches.sort_by_key(|s| s.id.order);

        let mut by_id = HashMap::with_capacity(stitches.len());
        for stitch in stitches.iter() {
            if stitch.id.tube != tube {
                return Err(SchedulerError::InvalidSeed(format!(
                    "{} listed under {}",
                    stitch.id, tube
                )));
            }
            if by_id
                .insert(stitch.id.clone(), Arc::new(stitch.clone()))
                .is_some()
            {
                return Err(SchedulerError::InvalidSeed(format!(
                    "duplicate stitch {}",
                    stitch.id
                )));
            }
        }

        let positions = PositionStore::seeded(tube, stitches.into_iter().map(|s| s.id))?;

        Ok(Self {
            tube,
            positions,
            stitches: by_id,
            progress: HashMap::new(),
            last_session_at: None,
            version: 0,
        })
    }

    pub fn tube(&self) -> TubeId {
        self.tube
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn positions(&self) -> &PositionStore {
        &self.positions
    }

    pub fn last_session_at(&self) -> Option<DateTime<Utc>> {
        self.last_session_at
    }

    pub fn stitch(&self, id: &StitchId) -> Option<&Arc<Stitch>> {
        self.stitches.get(id)
    }

    /// Stored progress, or first-encounter defaults for a stitch not yet seen.
    pub fn progress(&self, id: &StitchId) -> Result<StitchProgress> {
        if !self.stitches.contains_key(id) {
            return Err(SchedulerError::StitchNotFound(id.clone()));
        }
        Ok(self
            .progress
            .get(id)
            .cloned()
            .unwrap_or_else(|| StitchProgress::new(id.clone())))
    }

    /// Progress entries that exist, in position order.
    pub fn recorded_progress(&self) -> Vec<&StitchProgress> {
        self.positions
            .iter()
            .filter_map(|(_, id)| self.progress.get(id))
            .collect()
    }

    /// The stitch at the lowest occupied position.
    pub fn active_stitch(&self) -> Option<&Arc<Stitch>> {
        self.positions
            .active()
            .and_then(|(_, id)| self.stitches.get(id))
    }

    /// What a preparation for this tube should build: the active stitch and
    /// the learner's current boundary level on it.
    pub fn due_preparation(&self) -> Option<(Arc<Stitch>, BoundaryLevel)> {
        let stitch = self.active_stitch()?;
        let level = self
            .progress
            .get(&stitch.id)
            .map(|p| p.boundary_level)
            .unwrap_or_default();
        Some((Arc::clone(stitch), level))
    }

    pub fn snapshot(&self) -> TubeSnapshot {
        let mut stitches: Vec<Stitch> = self.stitches.values().map(|s| (**s).clone()).collect();
        stitches.sort_by_key(|s| s.id.order);
        let mut progress: Vec<StitchProgress> = self.progress.values().cloned().collect();
        progress.sort_by_key(|p| p.stitch_id.order);

        TubeSnapshot {
            tube: self.tube,
            version: self.version,
            positions: self.positions.snapshot(),
            stitches,
            progress,
            last_session_at: self.last_session_at,
        }
    }

    pub fn from_snapshot(snapshot: TubeSnapshot) -> Result<Self> {
        let TubeSnapshot {
            tube,
            version,
            positions,
            stitches,
            progress,
            last_session_at,
        } = snapshot;

        let positions = restore_positions(tube, positions)?;
        let stitches: HashMap<StitchId, Arc<Stitch>> = stitches
            .into_iter()
            .map(|s| (s.id.clone(), Arc::new(s)))
            .collect();
        for (_, id) in positions.iter() {
            if !stitches.contains_key(id) {
                return Err(SchedulerError::StitchNotFound(id.clone()));
            }
        }
        let progress = progress
            .into_iter()
            .map(|p| (p.stitch_id.clone(), p))
            .collect();

        Ok(Self {
            tube,
            positions,
            stitches,
            progress,
            last_session_at,
            version,
        })
    }
}

fn restore_positions(tube: TubeId, snapshot: PositionStoreSnapshot) -> Result<PositionStore> {
    if snapshot.tube != tube {
        return Err(SchedulerError::InvalidSeed(format!(
            "position map for {} stored under {}",
            snapshot.tube, tube
        )));
    }
    PositionStore::from_snapshot(snapshot)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn stitches(tube: TubeId, orders: &[u32]) -> Vec<Stitch> {
        orders
            .iter()
            .map(|o| Stitch::new(StitchId::new(tube, "sub", *o), "", vec![]))
            .collect()
    }

    #[test]
    fn test_seeded_sorts_by_creation_order() {
        let record = TubeRecord::seeded(TubeId::Tube2, stitches(TubeId::Tube2, &[3, 1, 2])).unwrap();
        let orders: Vec<u32> = record.positions().iter().map(|(_, s)| s.order).collect();
        assert_eq!(orders, vec![1, 2, 3]);
        assert_eq!(record.active_stitch().unwrap().id.order, 1);
    }

    #[test]
    fn test_seed_rejects_foreign_tube() {
        let err = TubeRecord::seeded(TubeId::Tube1, stitches(TubeId::Tube2, &[1])).unwrap_err();
        assert_eq!(err.code(), "INVALID_SEED");
    }

    #[test]
    fn test_seed_rejects_duplicates() {
        let err = TubeRecord::seeded(TubeId::Tube1, stitches(TubeId::Tube1, &[1, 1])).unwrap_err();
        assert_eq!(err.code(), "INVALID_SEED");
    }

    #[test]
    fn test_progress_defaults_on_first_encounter() {
        let record = TubeRecord::seeded(TubeId::Tube1, stitches(TubeId::Tube1, &[1])).unwrap();
        let id = StitchId::new(TubeId::Tube1, "sub", 1);
        let progress = record.progress(&id).unwrap();
        assert_eq!(progress.skip_number.value(), 4);
        assert!(record
            .progress(&StitchId::new(TubeId::Tube1, "sub", 9))
            .is_err());
    }

    #[test]
    fn test_due_preparation_uses_active_stitch() {
        let record = TubeRecord::seeded(TubeId::Tube3, stitches(TubeId::Tube3, &[1, 2])).unwrap();
        let (stitch, level) = record.due_preparation().unwrap();
        assert_eq!(stitch.id.order, 1);
        assert_eq!(level, BoundaryLevel::MIN);
    }

    #[test]
    fn test_empty_tube_has_nothing_due() {
        let record = TubeRecord::seeded(TubeId::Tube3, Vec::new()).unwrap();
        assert!(record.due_preparation().is_none());
    }

    #[test]
    fn test_snapshot_roundtrip() {
        let record = TubeRecord::seeded(TubeId::Tube1, stitches(TubeId::Tube1, &[1, 2, 3])).unwrap();
        let restored = TubeRecord::from_snapshot(record.snapshot()).unwrap();
        assert_eq!(restored, record);
    }
}
