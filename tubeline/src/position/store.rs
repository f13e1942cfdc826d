//! Sparse logical-position map for one tube.

use std::collections::{BTreeMap, HashMap};
use std::fmt;
use std::ops::Bound::{Excluded, Included};

use serde::{Deserialize, Serialize};

use crate::error::{Result, SchedulerError};
use crate::model::{StitchId, TubeId};

/// Ordering key within one tube. Always at least 1.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct LogicalPosition(u32);

impl LogicalPosition {
    pub const FIRST: LogicalPosition = LogicalPosition(1);

    pub fn new(position: u32) -> Result<Self> {
        if position == 0 {
            return Err(SchedulerError::InvalidPositionRange(
                "logical positions start at 1".to_string(),
            ));
        }
        Ok(Self(position))
    }

    pub fn get(self) -> u32 {
        self.0
    }
}

impl fmt::Display for LogicalPosition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Serialized form of one occupied position.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionEntry {
    pub position: LogicalPosition,
    pub stitch: StitchId,
}

/// Serialized form of a [`PositionStore`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PositionStoreSnapshot {
    pub tube: TubeId,
    pub version: u64,
    pub entries: Vec<PositionEntry>,
}

/// Sparse map from logical position to stitch for one tube.
///
/// Invariants:
/// - at most one stitch per position
/// - a stitch appears at most once
/// - the reverse index agrees with the forward map
///
/// `version` increases on every mutation so callers can detect that a map
/// they read earlier has since changed.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PositionStore {
    tube: TubeId,
    positions: BTreeMap<LogicalPosition, StitchId>,
    index: HashMap<StitchId, LogicalPosition>,
    version: u64,
}

impl PositionStore {
    pub fn new(tube: TubeId) -> Self {
        Self {
            tube,
            positions: BTreeMap::new(),
            index: HashMap::new(),
            version: 0,
        }
    }

    /// Seed a store with stitches at positions 1..=n in the given order.
    pub fn seeded<I>(tube: TubeId, stitches: I) -> Result<Self>
    where
        I: IntoIterator<Item = StitchId>,
    {
        let mut store = Self::new(tube);
        for (i, stitch) in stitches.into_iter().enumerate() {
            store.insert(LogicalPosition(i as u32 + 1), stitch)?;
        }
        Ok(store)
    }

    pub fn tube(&self) -> TubeId {
        self.tube
    }

    pub fn version(&self) -> u64 {
        self.version
    }

    pub fn len(&self) -> usize {
        self.positions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.positions.is_empty()
    }

    /// Place a stitch at an empty position.
    pub fn insert(&mut self, position: LogicalPosition, stitch: StitchId) -> Result<()> {
        if let Some(occupant) = self.positions.get(&position) {
            return Err(SchedulerError::PositionOccupied {
                tube: self.tube,
                position: position.get(),
                occupant: occupant.clone(),
            });
        }
        if let Some(existing) = self.index.get(&stitch) {
            return Err(SchedulerError::InvalidPositionRange(format!(
                "{} is already at position {} in {}",
                stitch, existing, self.tube
            )));
        }

        self.index.insert(stitch.clone(), position);
        self.positions.insert(position, stitch);
        self.version += 1;
        Ok(())
    }

    /// Remove a stitch, returning the position it occupied.
    pub fn remove(&mut self, stitch: &StitchId) -> Result<LogicalPosition> {
        let position = self
            .index
            .remove(stitch)
            .ok_or_else(|| SchedulerError::StitchNotFound(stitch.clone()))?;
        self.positions.remove(&position);
        self.version += 1;
        Ok(position)
    }

    pub fn position_of(&self, stitch: &StitchId) -> Option<LogicalPosition> {
        self.index.get(stitch).copied()
    }

    pub fn contains(&self, stitch: &StitchId) -> bool {
        self.index.contains_key(stitch)
    }

    pub fn stitch_at(&self, position: LogicalPosition) -> Result<&StitchId> {
        self.positions
            .get(&position)
            .ok_or(SchedulerError::PositionNotFound {
                tube: self.tube,
                position: position.get(),
            })
    }

    /// The active stitch: the one at the lowest occupied position.
    pub fn active(&self) -> Option<(LogicalPosition, &StitchId)> {
        self.positions.iter().next().map(|(p, s)| (*p, s))
    }

    /// Highest occupied position, or 0 for an empty map.
    pub fn span(&self) -> u32 {
        self.positions
            .keys()
            .next_back()
            .map(|p| p.get())
            .unwrap_or(0)
    }

    /// Number of unoccupied positions below the highest occupied one.
    pub fn gap_count(&self) -> u32 {
        self.span() - self.positions.len() as u32
    }

    /// Occupied positions in ascending order.
    pub fn iter(&self) -> impl Iterator<Item = (LogicalPosition, &StitchId)> {
        self.positions.iter().map(|(p, s)| (*p, s))
    }

    /// Stitches occupying positions `from..=to`, in order.
    pub fn range(
        &self,
        from: LogicalPosition,
        to: LogicalPosition,
    ) -> Result<Vec<(LogicalPosition, &StitchId)>> {
        if from > to {
            return Err(SchedulerError::InvalidPositionRange(format!(
                "{}..={} is empty",
                from, to
            )));
        }
        Ok(self
            .positions
            .range(from..=to)
            .map(|(p, s)| (*p, s))
            .collect())
    }

    /// Move a stitch to `target`, shifting the stitches between its old and
    /// new position by one toward the vacated slot.
    ///
    /// For a move back (old < target) stitches in `(old, target]` move from
    /// `k` to `k - 1`; for a move forward (old > target) stitches in
    /// `[target, old)` move from `k` to `k + 1`. Nothing outside that range
    /// changes. Returns the stitch's previous position.
    pub(crate) fn relocate(
        &mut self,
        stitch: &StitchId,
        target: LogicalPosition,
    ) -> Result<LogicalPosition> {
        let from = self
            .position_of(stitch)
            .ok_or_else(|| SchedulerError::StitchNotFound(stitch.clone()))?;
        if from == target {
            return Ok(from);
        }

        self.positions.remove(&from);

        if from < target {
            let moving: Vec<(LogicalPosition, StitchId)> = self
                .positions
                .range((Excluded(from), Included(target)))
                .map(|(p, s)| (*p, s.clone()))
                .collect();
            // Ascending: each destination was vacated by the previous move.
            for (position, id) in moving {
                let shifted = LogicalPosition(position.get() - 1);
                self.positions.remove(&position);
                self.positions.insert(shifted, id.clone());
                self.index.insert(id, shifted);
            }
        } else {
            let moving: Vec<(LogicalPosition, StitchId)> = self
                .positions
                .range(target..from)
                .rev()
                .map(|(p, s)| (*p, s.clone()))
                .collect();
            for (position, id) in moving {
                let shifted = LogicalPosition(position.get() + 1);
                self.positions.remove(&position);
                self.positions.insert(shifted, id.clone());
                self.index.insert(id, shifted);
            }
        }

        self.positions.insert(target, stitch.clone());
        self.index.insert(stitch.clone(), target);
        self.version += 1;
        Ok(from)
    }

    /// Replace every position according to `mapping` (old → new).
    ///
    /// The caller guarantees the mapping is order-preserving and covers
    /// every occupied position.
    pub(crate) fn apply_renumbering(&mut self, mapping: &[(LogicalPosition, LogicalPosition)]) {
        let mut renumbered = BTreeMap::new();
        for (old, new) in mapping {
            if let Some(stitch) = self.positions.get(old) {
                self.index.insert(stitch.clone(), *new);
                renumbered.insert(*new, stitch.clone());
            }
        }
        self.positions = renumbered;
        self.version += 1;
    }

    /// Verify the forward map and reverse index agree.
    pub fn check_invariants(&self) -> Result<()> {
        if self.positions.len() != self.index.len() {
            return Err(SchedulerError::InvalidPositionRange(format!(
                "{}: {} positions but {} indexed stitches",
                self.tube,
                self.positions.len(),
                self.index.len()
            )));
        }
        for (position, stitch) in &self.positions {
            if self.index.get(stitch) != Some(position) {
                return Err(SchedulerError::InvalidPositionRange(format!(
                    "{}: index disagrees for {} at {}",
                    self.tube, stitch, position
                )));
            }
        }
        Ok(())
    }

    pub fn snapshot(&self) -> PositionStoreSnapshot {
        PositionStoreSnapshot {
            tube: self.tube,
            version: self.version,
            entries: self
                .positions
                .iter()
                .map(|(position, stitch)| PositionEntry {
                    position: *position,
                    stitch: stitch.clone(),
                })
                .collect(),
        }
    }

    /// Rebuild a store from a snapshot, rejecting duplicate positions or stitches.
    pub fn from_snapshot(snapshot: PositionStoreSnapshot) -> Result<Self> {
        let mut store = Self::new(snapshot.tube);
        for entry in snapshot.entries {
            LogicalPosition::new(entry.position.get())?;
            store.insert(entry.position, entry.stitch)?;
        }
        store.version = snapshot.version;
        Ok(store)
    }
}
