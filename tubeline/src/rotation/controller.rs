//! Tube rotation controller.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info, warn};

use super::live_aid::{LiveAidRotationResult, RotationTrigger};
use crate::config::RotationConfig;
use crate::error::Result;
use crate::persistence::StateStore;
use crate::preparation::{
    ContentPreparationCoordinator, PreparationPriority, PreparationProcess, PreparationRequest,
};
use crate::user::UserState;

/// What a rotation did.
#[derive(Debug, Clone)]
pub struct RotationOutcome {
    pub result: LiveAidRotationResult,
    /// Preparation started for the tube that just became PREPARING. `None`
    /// if the tube is empty or the preparation could not be started; the
    /// rotation itself stands either way.
    pub preparation: Option<PreparationProcess>,
}

/// Rotates a learner's tubes and kicks off preparation for the tube that
/// moves into PREPARING.
pub struct TubeRotationController {
    store: Arc<dyn StateStore>,
    coordinator: Arc<ContentPreparationCoordinator>,
    config: RotationConfig,
}

impl TubeRotationController {
    pub fn new(
        store: Arc<dyn StateStore>,
        coordinator: Arc<ContentPreparationCoordinator>,
        config: RotationConfig,
    ) -> Self {
        Self {
            store,
            coordinator,
            config,
        }
    }

    pub fn config(&self) -> &RotationConfig {
        &self.config
    }

    /// Rotate all three tubes at once.
    ///
    /// The new state is persisted before it becomes visible. An inconsistent
    /// stored state fails with `ROTATION_FAILED` and is left as found.
    pub fn rotate(&self, user: &UserState, trigger: RotationTrigger) -> Result<RotationOutcome> {
        let result = {
            let mut current = user.rotation().lock();
            let mut next = current.clone();
            let result = next.rotate(trigger, Utc::now())?;
            self.store
                .save_rotation(user.user_id(), &next, current.version())?;
            *current = next;
            result
        };

        info!(
            user = %user.user_id(),
            live = %result.live,
            ready = %result.ready,
            preparing = %result.preparing,
            rotation = result.rotation_count,
            trigger = %result.trigger,
            "Tubes rotated"
        );

        let preparation = self.prepare(user, &result);
        Ok(RotationOutcome {
            result,
            preparation,
        })
    }

    fn prepare(
        &self,
        user: &UserState,
        result: &LiveAidRotationResult,
    ) -> Option<PreparationProcess> {
        let due = user.tube(result.preparing).lock().due_preparation();
        let Some((stitch, boundary_level)) = due else {
            debug!(
                user = %user.user_id(),
                tube = %result.preparing,
                "Nothing to prepare, tube is empty"
            );
            return None;
        };

        let request = PreparationRequest::new(
            user.user_id().clone(),
            result.preparing,
            stitch,
            boundary_level,
        )
        .with_priority(PreparationPriority::Normal);

        match self.coordinator.prepare_stitch(request) {
            Ok(process) => Some(process),
            Err(e) => {
                warn!(
                    user = %user.user_id(),
                    tube = %result.preparing,
                    error = %e,
                    "Could not start preparation after rotation"
                );
                None
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache::ContentReadyCache;
    use crate::config::{CacheConfig, PreparationConfig};
    use crate::model::{Stitch, StitchId, TubeId, UserId};
    use crate::persistence::MemoryStateStore;
    use crate::preparation::{Fact, FactPoolGenerator};
    use crate::rotation::{LiveAidState, TubeState};
    use crate::tube::TubeRecord;

    fn user() -> UserState {
        let records = TubeId::ALL.map(|tube| {
            let stitch = Stitch::new(
                StitchId::new(tube, "sq", 1),
                "",
                (1..=4).map(|n| format!("sq-{}", n)).collect(),
            );
            TubeRecord::seeded(tube, vec![stitch]).unwrap()
        });
        UserState::new(UserId::new("bob"), records)
    }

    fn controller(store: Arc<MemoryStateStore>) -> TubeRotationController {
        let facts = (1..=4)
            .map(|n| Fact::new(format!("sq-{}", n), format!("{}²", n), (n * n).to_string()));
        let cache = Arc::new(ContentReadyCache::new(&CacheConfig::default()));
        let coordinator = Arc::new(ContentPreparationCoordinator::new(
            Arc::new(FactPoolGenerator::new(facts)),
            cache,
            PreparationConfig::default().with_questions_per_stitch(4),
        ));
        TubeRotationController::new(store, coordinator, RotationConfig::default())
    }

    #[test]
    fn test_rotation_is_persisted() {
        let store = Arc::new(MemoryStateStore::new());
        let user = user();
        store.create_user(&user.snapshot()).unwrap();

        let outcome = controller(Arc::clone(&store))
            .rotate(&user, RotationTrigger::Manual)
            .unwrap();

        assert_eq!(outcome.result.live, TubeId::Tube2);
        let stored = store.load_user(user.user_id()).unwrap().unwrap();
        assert_eq!(stored.rotation, user.live_aid_state());
        assert_eq!(stored.rotation.rotation_count(), 1);
    }

    #[test]
    fn test_stale_rotation_rejected() {
        let store = Arc::new(MemoryStateStore::new());
        let user = user();
        store.create_user(&user.snapshot()).unwrap();

        // Another writer rotated first.
        let mut elsewhere = LiveAidState::initial();
        elsewhere.rotate(RotationTrigger::Manual, Utc::now()).unwrap();
        store.save_rotation(user.user_id(), &elsewhere, 0).unwrap();

        let err = controller(store)
            .rotate(&user, RotationTrigger::Manual)
            .unwrap_err();
        assert_eq!(err.code(), "VERSION_CONFLICT");
        assert_eq!(user.live_aid_state(), LiveAidState::initial());
    }

    #[test]
    fn test_inconsistent_state_surfaces() {
        let store = Arc::new(MemoryStateStore::new());
        let user = user();
        store.create_user(&user.snapshot()).unwrap();
        *user.rotation().lock() =
            LiveAidState::from_states([TubeState::Live, TubeState::Live, TubeState::Preparing]);

        let err = controller(Arc::clone(&store))
            .rotate(&user, RotationTrigger::Manual)
            .unwrap_err();

        assert_eq!(err.code(), "ROTATION_FAILED");
        let stored = store.load_user(user.user_id()).unwrap().unwrap();
        assert_eq!(stored.rotation.rotation_count(), 0);
    }

    #[tokio::test]
    async fn test_rotation_prepares_new_preparing_tube() {
        let store = Arc::new(MemoryStateStore::new());
        let user = user();
        store.create_user(&user.snapshot()).unwrap();
        let controller = controller(store);

        let outcome = controller.rotate(&user, RotationTrigger::Manual).unwrap();

        let process = outcome.preparation.expect("preparation started");
        assert_eq!(process.tube, TubeId::Tube1);
        let done = controller.coordinator.wait(process.id).await.unwrap();
        assert!(done.is_terminal());
        assert!(controller
            .coordinator
            .cache()
            .get_ready_stitch(user.user_id(), TubeId::Tube1)
            .is_ok());
    }
}
