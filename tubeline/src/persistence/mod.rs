//! State store boundary.
//!
//! The scheduler treats persistence as an opaque key-value store of
//! per-user snapshots. Every save is version-checked: the caller passes the
//! version it read, and the store rejects the write with
//! [`StoreError::VersionConflict`] if someone else wrote in between.
//!
//! # Implementations
//!
//! - [`MemoryStateStore`] - in-process, for tests and simulations
//! - [`JsonFileStateStore`] - one JSON document per user on disk

mod json_file;
mod memory;

pub use json_file::JsonFileStateStore;
pub use memory::MemoryStateStore;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::model::{Stitch, StitchProgress, TubeId, UserId};
use crate::position::PositionStoreSnapshot;
use crate::rotation::LiveAidState;

/// Errors from a [`StateStore`].
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Version conflict on {key}: expected {expected}, found {actual}")]
    VersionConflict {
        key: String,
        expected: u64,
        actual: u64,
    },

    #[error("User already exists: {0}")]
    AlreadyExists(UserId),

    #[error("No stored state for user {0}")]
    MissingUser(UserId),

    #[error("Invalid store key: {0}")]
    InvalidKey(String),
}

/// Persisted state of one tube.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TubeSnapshot {
    pub tube: TubeId,
    /// Record version; bumped by every committed write.
    pub version: u64,
    pub positions: PositionStoreSnapshot,
    pub stitches: Vec<Stitch>,
    pub progress: Vec<StitchProgress>,
    #[serde(default)]
    pub last_session_at: Option<DateTime<Utc>>,
}

/// Persisted rotation state.
pub type RotationSnapshot = LiveAidState;

/// Everything stored for one user.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserSnapshot {
    pub user_id: UserId,
    pub tubes: Vec<TubeSnapshot>,
    pub rotation: RotationSnapshot,
    pub created_at: DateTime<Utc>,
}

impl UserSnapshot {
    pub fn tube(&self, tube: TubeId) -> Option<&TubeSnapshot> {
        self.tubes.iter().find(|t| t.tube == tube)
    }

    fn tube_mut(&mut self, tube: TubeId) -> Option<&mut TubeSnapshot> {
        self.tubes.iter_mut().find(|t| t.tube == tube)
    }

    /// Replace a tube snapshot if the stored version matches `expected`.
    pub(crate) fn replace_tube(
        &mut self,
        snapshot: &TubeSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let key = format!("{}/{}", self.user_id, snapshot.tube);
        let current = self
            .tube_mut(snapshot.tube)
            .ok_or_else(|| StoreError::InvalidKey(key.clone()))?;
        if current.version != expected_version {
            return Err(StoreError::VersionConflict {
                key,
                expected: expected_version,
                actual: current.version,
            });
        }
        *current = snapshot.clone();
        Ok(snapshot.version)
    }

    /// Replace the rotation state if the stored version matches `expected`.
    pub(crate) fn replace_rotation(
        &mut self,
        rotation: &RotationSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        if self.rotation.version() != expected_version {
            return Err(StoreError::VersionConflict {
                key: format!("{}/rotation", self.user_id),
                expected: expected_version,
                actual: self.rotation.version(),
            });
        }
        self.rotation = rotation.clone();
        Ok(rotation.version())
    }
}

/// Persistence boundary for scheduler state.
///
/// Implementations must be safe to share across threads. Saves are
/// compare-and-swap on the record version.
pub trait StateStore: Send + Sync {
    /// Load a user's state, or `None` if the user was never created.
    fn load_user(&self, user: &UserId) -> Result<Option<UserSnapshot>, StoreError>;

    /// Store a freshly initialized user. Fails if the user already exists.
    fn create_user(&self, snapshot: &UserSnapshot) -> Result<(), StoreError>;

    /// Save one tube, returning the stored version.
    fn save_tube(
        &self,
        user: &UserId,
        tube: &TubeSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Save the rotation state, returning the stored version.
    fn save_rotation(
        &self,
        user: &UserId,
        rotation: &RotationSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError>;

    /// Ids of all stored users.
    fn list_users(&self) -> Result<Vec<UserId>, StoreError>;
}
