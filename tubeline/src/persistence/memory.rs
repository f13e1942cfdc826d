//! In-memory state store.

use dashmap::DashMap;

use super::{RotationSnapshot, StateStore, StoreError, TubeSnapshot, UserSnapshot};
use crate::model::UserId;

/// Thread-safe in-memory [`StateStore`].
///
/// State lives only as long as the store. Per-user entries are locked
/// independently, so writes for different users never contend.
#[derive(Debug, Default)]
pub struct MemoryStateStore {
    users: DashMap<UserId, UserSnapshot>,
}

impl MemoryStateStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn len(&self) -> usize {
        self.users.len()
    }

    pub fn is_empty(&self) -> bool {
        self.users.is_empty()
    }
}

impl StateStore for MemoryStateStore {
    fn load_user(&self, user: &UserId) -> Result<Option<UserSnapshot>, StoreError> {
        Ok(self.users.get(user).map(|entry| entry.value().clone()))
    }

    fn create_user(&self, snapshot: &UserSnapshot) -> Result<(), StoreError> {
        match self.users.entry(snapshot.user_id.clone()) {
            dashmap::mapref::entry::Entry::Occupied(_) => {
                Err(StoreError::AlreadyExists(snapshot.user_id.clone()))
            }
            dashmap::mapref::entry::Entry::Vacant(slot) => {
                slot.insert(snapshot.clone());
                Ok(())
            }
        }
    }

    fn save_tube(
        &self,
        user: &UserId,
        tube: &TubeSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut entry = self
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::MissingUser(user.clone()))?;
        entry.replace_tube(tube, expected_version)
    }

    fn save_rotation(
        &self,
        user: &UserId,
        rotation: &RotationSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        let mut entry = self
            .users
            .get_mut(user)
            .ok_or_else(|| StoreError::MissingUser(user.clone()))?;
        entry.replace_rotation(rotation, expected_version)
    }

    fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        let mut users: Vec<UserId> = self.users.iter().map(|e| e.key().clone()).collect();
        users.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{StitchId, TubeId};
    use crate::tube::TubeRecord;
    use crate::user::UserState;

    fn snapshot(user: &str) -> UserSnapshot {
        let records = TubeId::ALL.map(|tube| {
            TubeRecord::seeded(
                tube,
                (1..=3)
                    .map(|o| crate::model::Stitch::new(StitchId::new(tube, "c", o), "", vec![]))
                    .collect(),
            )
            .unwrap()
        });
        UserState::new(UserId::new(user), records).snapshot()
    }

    #[test]
    fn test_create_and_load() {
        let store = MemoryStateStore::new();
        let user = UserId::new("alice");
        assert!(store.load_user(&user).unwrap().is_none());

        store.create_user(&snapshot("alice")).unwrap();
        let loaded = store.load_user(&user).unwrap().unwrap();
        assert_eq!(loaded.tubes.len(), 3);
    }

    #[test]
    fn test_create_twice_fails() {
        let store = MemoryStateStore::new();
        store.create_user(&snapshot("alice")).unwrap();
        assert!(matches!(
            store.create_user(&snapshot("alice")),
            Err(StoreError::AlreadyExists(_))
        ));
    }

    #[test]
    fn test_save_tube_version_check() {
        let store = MemoryStateStore::new();
        let user = UserId::new("alice");
        let initial = snapshot("alice");
        store.create_user(&initial).unwrap();

        let mut tube = initial.tube(TubeId::Tube1).unwrap().clone();
        let read_version = tube.version;
        tube.version += 1;
        assert_eq!(store.save_tube(&user, &tube, read_version).unwrap(), tube.version);

        let err = store.save_tube(&user, &tube, read_version).unwrap_err();
        match err {
            StoreError::VersionConflict {
                expected, actual, ..
            } => {
                assert_eq!(expected, read_version);
                assert_eq!(actual, read_version + 1);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[test]
    fn test_save_for_unknown_user() {
        let store = MemoryStateStore::new();
        let initial = snapshot("alice");
        let tube = initial.tube(TubeId::Tube2).unwrap();
        assert!(matches!(
            store.save_tube(&UserId::new("bob"), tube, 0),
            Err(StoreError::MissingUser(_))
        ));
    }
}
