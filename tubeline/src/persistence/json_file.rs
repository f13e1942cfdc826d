//! JSON-file state store.
//!
//! Layout: one `<user>.json` document per user under the store directory,
//! plus `content/<user>.json` holding ready content between processes.
//! Writes go to a temporary sibling file that is then renamed over the
//! target, so a crash mid-write never leaves a truncated document.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use parking_lot::Mutex;
use serde::Serialize;
use tracing::debug;

use super::{RotationSnapshot, StateStore, StoreError, TubeSnapshot, UserSnapshot};
use crate::cache::ReadyContent;
use crate::model::UserId;

const EXTENSION: &str = "json";

/// Subdirectory holding saved ready content.
const CONTENT_DIR: &str = "content";

/// File-backed [`StateStore`].
///
/// A single mutex serializes read-modify-write cycles within this process.
/// Version checks still apply, so a second process writing the same
/// directory surfaces as a version conflict rather than a lost update.
#[derive(Debug)]
pub struct JsonFileStateStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStateStore {
    /// Open a store rooted at `dir`, creating the directory if needed.
    pub fn open(dir: impl Into<PathBuf>) -> Result<Self, StoreError> {
        let dir = dir.into();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Ready content saved for a user by
    /// [`save_ready_content`](Self::save_ready_content). Empty if none.
    pub fn load_ready_content(&self, user: &UserId) -> Result<Vec<ReadyContent>, StoreError> {
        let path = self.content_path_for(user)?;
        match fs::read(&path) {
            Ok(bytes) => Ok(serde_json::from_slice(&bytes)?),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(Vec::new()),
            Err(e) => Err(e.into()),
        }
    }

    /// Replace the saved ready content for a user.
    pub fn save_ready_content(
        &self,
        user: &UserId,
        content: &[Arc<ReadyContent>],
    ) -> Result<(), StoreError> {
        let path = self.content_path_for(user)?;
        fs::create_dir_all(self.dir.join(CONTENT_DIR))?;
        let entries: Vec<&ReadyContent> = content.iter().map(Arc::as_ref).collect();
        self.write(&path, &entries)
    }

    fn content_path_for(&self, user: &UserId) -> Result<PathBuf, StoreError> {
        let file = self.path_for(user)?;
        let name = file
            .file_name()
            .ok_or_else(|| StoreError::InvalidKey(user.as_str().to_string()))?;
        Ok(self.dir.join(CONTENT_DIR).join(name))
    }

    fn path_for(&self, user: &UserId) -> Result<PathBuf, StoreError> {
        let name = user.as_str();
        let valid = !name.is_empty()
            && !name.starts_with('.')
            && name
                .chars()
                .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'));
        if !valid {
            return Err(StoreError::InvalidKey(name.to_string()));
        }
        Ok(self.dir.join(format!("{}.{}", name, EXTENSION)))
    }

    fn read(&self, path: &Path) -> Result<Option<UserSnapshot>, StoreError> {
        match fs::read(path) {
            Ok(bytes) => Ok(Some(serde_json::from_slice(&bytes)?)),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    fn write<T: Serialize + ?Sized>(&self, path: &Path, value: &T) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(value)?;
        let tmp = path.with_extension(format!("{}.tmp", EXTENSION));
        fs::write(&tmp, json)?;
        fs::rename(&tmp, path)?;
        debug!(path = %path.display(), "Wrote state file");
        Ok(())
    }

    fn modify<F>(&self, user: &UserId, apply: F) -> Result<u64, StoreError>
    where
        F: FnOnce(&mut UserSnapshot) -> Result<u64, StoreError>,
    {
        let path = self.path_for(user)?;
        let _guard = self.write_lock.lock();

        let mut snapshot = self
            .read(&path)?
            .ok_or_else(|| StoreError::MissingUser(user.clone()))?;
        let version = apply(&mut snapshot)?;
        self.write(&path, &snapshot)?;
        Ok(version)
    }
}

impl StateStore for JsonFileStateStore {
    fn load_user(&self, user: &UserId) -> Result<Option<UserSnapshot>, StoreError> {
        let path = self.path_for(user)?;
        self.read(&path)
    }

    fn create_user(&self, snapshot: &UserSnapshot) -> Result<(), StoreError> {
        let path = self.path_for(&snapshot.user_id)?;
        let _guard = self.write_lock.lock();
        if path.exists() {
            return Err(StoreError::AlreadyExists(snapshot.user_id.clone()));
        }
        self.write(&path, snapshot)
    }

    fn save_tube(
        &self,
        user: &UserId,
        tube: &TubeSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.modify(user, |snapshot| snapshot.replace_tube(tube, expected_version))
    }

    fn save_rotation(
        &self,
        user: &UserId,
        rotation: &RotationSnapshot,
        expected_version: u64,
    ) -> Result<u64, StoreError> {
        self.modify(user, |snapshot| {
            snapshot.replace_rotation(rotation, expected_version)
        })
    }

    fn list_users(&self) -> Result<Vec<UserId>, StoreError> {
        let mut users = Vec::new();
        for entry in fs::read_dir(&self.dir)? {
            let path = entry?.path();
            if path.extension().and_then(|e| e.to_str()) != Some(EXTENSION) {
                continue;
            }
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                users.push(UserId::new(stem));
            }
        }
        users.sort_by(|a, b| a.as_str().cmp(b.as_str()));
        Ok(users)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::{Stitch, StitchId, TubeId};
    use crate::tube::TubeRecord;
    use crate::user::UserState;
    use tempfile::TempDir;

    fn snapshot(user: &str) -> UserSnapshot {
        let records = TubeId::ALL.map(|tube| {
            TubeRecord::seeded(
                tube,
                (1..=2)
                    .map(|o| Stitch::new(StitchId::new(tube, "c", o), "", vec![]))
                    .collect(),
            )
            .unwrap()
        });
        UserState::new(UserId::new(user), records).snapshot()
    }

    #[test]
    fn test_roundtrip_through_disk() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(temp.path()).unwrap();
        let original = snapshot("alice");

        store.create_user(&original).unwrap();

        let reopened = JsonFileStateStore::open(temp.path()).unwrap();
        let loaded = reopened.load_user(&UserId::new("alice")).unwrap().unwrap();
        assert_eq!(loaded, original);
        assert_eq!(reopened.list_users().unwrap(), vec![UserId::new("alice")]);
    }

    #[test]
    fn test_no_temp_file_left_behind() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(temp.path()).unwrap();
        let original = snapshot("bob");
        store.create_user(&original).unwrap();

        let mut tube = original.tube(TubeId::Tube3).unwrap().clone();
        tube.version += 1;
        store.save_tube(&UserId::new("bob"), &tube, 0).unwrap();

        let names: Vec<String> = fs::read_dir(temp.path())
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        assert_eq!(names, vec!["bob.json".to_string()]);
    }

    #[test]
    fn test_stale_rotation_write_rejected() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(temp.path()).unwrap();
        let original = snapshot("carol");
        store.create_user(&original).unwrap();

        let user = UserId::new("carol");
        let mut rotation = original.rotation.clone();
        rotation
            .rotate(crate::rotation::RotationTrigger::Manual, chrono::Utc::now())
            .unwrap();
        store.save_rotation(&user, &rotation, 0).unwrap();

        assert!(matches!(
            store.save_rotation(&user, &rotation, 0),
            Err(StoreError::VersionConflict { .. })
        ));
    }

    #[test]
    fn test_rejects_path_like_user_ids() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(temp.path()).unwrap();
        for bad in ["../escape", ".hidden", "a/b", ""] {
            assert!(matches!(
                store.load_user(&UserId::new(bad)),
                Err(StoreError::InvalidKey(_))
            ));
        }
    }

    #[test]
    fn test_ready_content_saved_beside_state() {
        let temp = TempDir::new().unwrap();
        let store = JsonFileStateStore::open(temp.path()).unwrap();
        store.create_user(&snapshot("dave")).unwrap();
        let user = UserId::new("dave");
        assert!(store.load_ready_content(&user).unwrap().is_empty());

        let content = Arc::new(ReadyContent::new(
            user.clone(),
            TubeId::Tube2,
            StitchId::new(TubeId::Tube2, "c", 1),
            crate::model::BoundaryLevel::MIN,
            Vec::new(),
        ));
        store.save_ready_content(&user, &[content]).unwrap();

        let loaded = store.load_ready_content(&user).unwrap();
        assert_eq!(loaded.len(), 1);
        assert_eq!(loaded[0].stitch_id, StitchId::new(TubeId::Tube2, "c", 1));
        assert!(temp.path().join("content").join("dave.json").exists());
        assert_eq!(store.list_users().unwrap(), vec![user]);
    }
}
