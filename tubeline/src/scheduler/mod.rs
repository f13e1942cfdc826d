//! Scheduler facade.
//!
//! [`LearningScheduler`] owns the control flow from a session completion
//! through to the next tube's content:
//!
//! 1. the repositioning engine applies the session to the stitch's tube
//! 2. the tube is compressed if it has accumulated too many gaps
//! 3. if the session was on the LIVE tube, the tubes rotate
//! 4. rotation starts background preparation for the new PREPARING tube
//! 5. preparation writes the ready cache
//!
//! Learners are loaded lazily from the state store on first use and kept
//! in memory afterwards. A write rejected with `VERSION_CONFLICT` drops the
//! in-memory copy, so the retry works from the store's current state.

mod types;

pub use types::{ContentSource, ServedContent, SessionOutcome, TubeView, UserSeed};

use std::sync::Arc;

use dashmap::DashMap;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::cache::{ContentReadyCache, InvalidationReason};
use crate::config::SchedulerConfig;
use crate::error::{Result, SchedulerError};
use crate::model::{SessionCompletion, StitchId, StitchProgress, TubeId, UserId};
use crate::persistence::{StateStore, StoreError};
use crate::position::{CompressionOptions, CompressionResult, PositionCompressor};
use crate::preparation::{
    ContentGenerator, ContentPreparationCoordinator, PreparationPriority, PreparationProcess,
    PreparationRequest,
};
use crate::reposition::{RepositionMode, RepositioningEngine};
use crate::rotation::{
    LiveAidState, RotationOutcome, RotationTrigger, TubeRotationController, TubeState,
};
use crate::tube::TubeRecord;
use crate::user::UserState;

/// Entry point for all scheduling operations.
pub struct LearningScheduler {
    config: SchedulerConfig,
    store: Arc<dyn StateStore>,
    cache: Arc<ContentReadyCache>,
    coordinator: Arc<ContentPreparationCoordinator>,
    rotation: TubeRotationController,
    engine: RepositioningEngine,
    compressor: PositionCompressor,
    users: DashMap<UserId, Arc<UserState>>,
}

impl LearningScheduler {
    pub fn new(
        config: SchedulerConfig,
        store: Arc<dyn StateStore>,
        generator: Arc<dyn ContentGenerator>,
    ) -> Self {
        let cache = Arc::new(ContentReadyCache::new(&config.cache));
        let coordinator = Arc::new(ContentPreparationCoordinator::new(
            generator,
            Arc::clone(&cache),
            config.preparation.clone(),
        ));
        let rotation = TubeRotationController::new(
            Arc::clone(&store),
            Arc::clone(&coordinator),
            config.rotation.clone(),
        );
        let engine = RepositioningEngine::new(config.reposition.lock_timeout);

        Self {
            config,
            store,
            cache,
            coordinator,
            rotation,
            engine,
            compressor: PositionCompressor::new(),
            users: DashMap::new(),
        }
    }

    pub fn config(&self) -> &SchedulerConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ContentReadyCache> {
        &self.cache
    }

    pub fn coordinator(&self) -> &Arc<ContentPreparationCoordinator> {
        &self.coordinator
    }

    /// Start the preparation garbage collector. It stops when `shutdown`
    /// fires.
    pub fn spawn_maintenance(&self, shutdown: CancellationToken) -> JoinHandle<()> {
        self.coordinator.spawn_gc(shutdown)
    }

    // =========================================================================
    // Learners
    // =========================================================================

    /// Create a learner from seed content and persist it.
    pub fn initialize_user(&self, user_id: UserId, seed: UserSeed) -> Result<Arc<UserState>> {
        let records = [
            TubeRecord::seeded(TubeId::Tube1, seed.for_tube(TubeId::Tube1))?,
            TubeRecord::seeded(TubeId::Tube2, seed.for_tube(TubeId::Tube2))?,
            TubeRecord::seeded(TubeId::Tube3, seed.for_tube(TubeId::Tube3))?,
        ];
        let state = Arc::new(UserState::new(user_id.clone(), records));

        self.store
            .create_user(&state.snapshot())
            .map_err(|e| match e {
                StoreError::AlreadyExists(user) => {
                    SchedulerError::InvalidSeed(format!("user {} already exists", user))
                }
                other => other.into(),
            })?;
        self.users.insert(user_id.clone(), Arc::clone(&state));

        info!(
            user = %user_id,
            stitches = seed.stitches.len(),
            "Learner initialized"
        );
        Ok(state)
    }

    /// The in-memory state for a learner, loading it from the store if
    /// needed.
    pub fn ensure_user(&self, user_id: &UserId) -> Result<Arc<UserState>> {
        if let Some(state) = self.users.get(user_id) {
            return Ok(Arc::clone(state.value()));
        }

        let snapshot = self
            .store
            .load_user(user_id)?
            .ok_or_else(|| SchedulerError::UserNotFound(user_id.clone()))?;
        let state = Arc::new(UserState::from_snapshot(snapshot)?);
        debug!(user = %user_id, "Loaded learner from store");

        // Another caller may have loaded it meanwhile; keep the first.
        let entry = self.users.entry(user_id.clone()).or_insert(state);
        Ok(Arc::clone(entry.value()))
    }

    /// Replace the in-memory state for a learner with the stored one.
    pub fn reload_user(&self, user_id: &UserId) -> Result<Arc<UserState>> {
        let snapshot = self
            .store
            .load_user(user_id)?
            .ok_or_else(|| SchedulerError::UserNotFound(user_id.clone()))?;
        let state = Arc::new(UserState::from_snapshot(snapshot)?);
        self.users.insert(user_id.clone(), Arc::clone(&state));
        debug!(user = %user_id, "Reloaded learner from store");
        Ok(state)
    }

    /// Drop a learner's in-memory copy if `result` lost a version race.
    fn evict_if_stale<T>(&self, user_id: &UserId, result: Result<T>) -> Result<T> {
        if let Err(e) = &result {
            if e.is_version_conflict() {
                self.users.remove(user_id);
                info!(user = %user_id, error = %e, "Stale learner state dropped");
            }
        }
        result
    }

    // =========================================================================
    // Sessions
    // =========================================================================

    /// Apply a completed session.
    pub fn complete_session(&self, completion: &SessionCompletion) -> Result<SessionOutcome> {
        self.complete_session_with(completion, RepositionMode::Standard)
    }

    pub fn complete_session_with(
        &self,
        completion: &SessionCompletion,
        mode: RepositionMode,
    ) -> Result<SessionOutcome> {
        let session = completion.to_result()?;
        let user = self.ensure_user(&completion.user_id)?;
        let tube = completion.stitch_id.tube;
        let user_id = user.user_id().clone();

        let reposition = self.engine.reposition_stitch(
            user.tube(tube),
            &completion.stitch_id,
            &session,
            mode,
            |next| {
                let expected = next.version() - 1;
                self.store.save_tube(&user_id, &next.snapshot(), expected)?;
                Ok(())
            },
        );
        let reposition = self.evict_if_stale(&user_id, reposition)?;

        if reposition.boundary_level_changed {
            self.cache.invalidate_stitch(
                &user_id,
                tube,
                &reposition.stitch_id,
                InvalidationReason::BoundaryLevelChanged,
            );
        } else if reposition.moved() {
            self.cache.invalidate_stitch(
                &user_id,
                tube,
                &reposition.stitch_id,
                InvalidationReason::ForcedRefresh,
            );
        }

        let compression = self.maybe_compress(&user, tube);

        let mut rotation = None;
        let mut rotation_error = None;
        if self.config.rotation.rotate_on_completion
            && user.live_aid_state().state_of(tube) == TubeState::Live
        {
            let trigger = RotationTrigger::SessionCompleted {
                stitch_id: completion.stitch_id.clone(),
            };
            match self.evict_if_stale(&user_id, self.rotation.rotate(&user, trigger)) {
                Ok(outcome) => rotation = Some(outcome),
                Err(e) => {
                    warn!(
                        user = %user_id,
                        tube = %tube,
                        code = e.code(),
                        error = %e,
                        "Rotation after session failed"
                    );
                    rotation_error = Some(e);
                }
            }
        }

        Ok(SessionOutcome {
            reposition,
            compression,
            rotation,
            rotation_error,
        })
    }

    fn maybe_compress(&self, user: &UserState, tube: TubeId) -> Option<CompressionResult> {
        let threshold = self.config.reposition.compress_gap_threshold;
        if threshold == 0 {
            return None;
        }
        let gaps = user.tube(tube).lock().positions().gap_count();
        if gaps < threshold {
            return None;
        }

        let result = self.compress_in(user, tube, CompressionOptions::default());
        match self.evict_if_stale(user.user_id(), result) {
            Ok(result) => Some(result),
            Err(e) => {
                warn!(
                    user = %user.user_id(),
                    tube = %tube,
                    error = %e,
                    "Opportunistic compression skipped"
                );
                None
            }
        }
    }

    // =========================================================================
    // Rotation and compression
    // =========================================================================

    /// Rotate a learner's tubes.
    pub fn rotate(&self, user_id: &UserId, trigger: RotationTrigger) -> Result<RotationOutcome> {
        let user = self.ensure_user(user_id)?;
        self.evict_if_stale(user_id, self.rotation.rotate(&user, trigger))
    }

    /// Remove gaps from one tube's position map.
    pub fn compress_tube(
        &self,
        user_id: &UserId,
        tube: TubeId,
        options: CompressionOptions,
    ) -> Result<CompressionResult> {
        let user = self.ensure_user(user_id)?;
        self.evict_if_stale(user_id, self.compress_in(&user, tube, options))
    }

    fn compress_in(
        &self,
        user: &UserState,
        tube: TubeId,
        options: CompressionOptions,
    ) -> Result<CompressionResult> {
        let timeout = self.engine.lock_timeout();
        let mut guard = user.tube(tube).try_lock_for(timeout).ok_or_else(|| {
            SchedulerError::CompressionWouldBreakOrdering {
                tube,
                reason: format!("tube busy, lock not acquired within {:?}", timeout),
            }
        })?;

        let mut next = guard.clone();
        let result = self
            .compressor
            .compress_tube_positions(&mut next.positions, options)?;
        if !result.applied {
            return Ok(result);
        }

        next.version = guard.version + 1;
        self.store
            .save_tube(user.user_id(), &next.snapshot(), guard.version)?;
        *guard = next;

        info!(
            user = %user.user_id(),
            tube = %tube,
            gaps_removed = result.gaps_removed,
            span = result.compressed_count,
            "Tube compressed"
        );
        Ok(result)
    }

    // =========================================================================
    // Content
    // =========================================================================

    /// Start background preparation for every tube without fresh content.
    ///
    /// Tubes that already have work in flight are skipped.
    pub fn prepare_ready_tubes(&self, user_id: &UserId) -> Result<Vec<PreparationProcess>> {
        let user = self.ensure_user(user_id)?;
        let mut started = Vec::new();

        for tube in TubeId::ALL {
            if self.cache.get_ready_stitch(user_id, tube).is_ok() {
                continue;
            }
            let Some((stitch, level)) = user.tube(tube).lock().due_preparation() else {
                continue;
            };
            let request = PreparationRequest::new(user_id.clone(), tube, stitch, level)
                .with_priority(PreparationPriority::Background);
            match self.coordinator.prepare_stitch(request) {
                Ok(process) => started.push(process),
                Err(SchedulerError::WarmingInProgress { .. }) => {}
                Err(e) => return Err(e),
            }
        }
        Ok(started)
    }

    /// Content for the LIVE tube.
    ///
    /// Degrades rather than fails: fresh content if cached, else stale
    /// content for the same stitch (with a refresh started behind it), else
    /// an emergency preparation awaited inline.
    pub async fn serve_live(&self, user_id: &UserId) -> Result<ServedContent> {
        let user = self.ensure_user(user_id)?;
        let live = user.live_aid_state().live()?;
        let due = user.tube(live).lock().due_preparation();
        let (stitch, level) = due.ok_or_else(|| SchedulerError::CacheMiss {
            user: user_id.clone(),
            tube: live,
        })?;

        match self.cache.get_ready_stitch(user_id, live) {
            Ok(content) if content.stitch_id == stitch.id => {
                return Ok(ServedContent {
                    content,
                    source: ContentSource::Ready,
                });
            }
            Ok(_) => debug!(user = %user_id, tube = %live, "Cached content is for another stitch"),
            Err(e) => debug!(user = %user_id, tube = %live, code = e.code(), "No fresh content"),
        }

        if let Some(content) = self.cache.get_best_available(user_id, live) {
            if content.stitch_id == stitch.id {
                warn!(
                    user = %user_id,
                    tube = %live,
                    age_secs = content.age().as_secs(),
                    "Serving stale content"
                );
                let refresh = PreparationRequest::new(user_id.clone(), live, stitch, level)
                    .with_priority(PreparationPriority::Background);
                if let Err(e) = self.coordinator.prepare_stitch(refresh) {
                    debug!(error = %e, "Background refresh not started");
                }
                return Ok(ServedContent {
                    content,
                    source: ContentSource::Stale,
                });
            }
        }

        warn!(user = %user_id, tube = %live, stitch = %stitch.id, "No usable content, preparing inline");
        let request = PreparationRequest::new(user_id.clone(), live, stitch, level);
        let content = self.coordinator.emergency_preparation(request).await?;
        Ok(ServedContent {
            content,
            source: ContentSource::Emergency,
        })
    }

    // =========================================================================
    // Queries
    // =========================================================================

    pub fn live_aid_state(&self, user_id: &UserId) -> Result<LiveAidState> {
        Ok(self.ensure_user(user_id)?.live_aid_state())
    }

    pub fn progress(&self, user_id: &UserId, stitch_id: &StitchId) -> Result<StitchProgress> {
        let user = self.ensure_user(user_id)?;
        let record = user.tube(stitch_id.tube).lock();
        record.progress(stitch_id)
    }

    pub fn tube_view(&self, user_id: &UserId, tube: TubeId) -> Result<TubeView> {
        let user = self.ensure_user(user_id)?;
        let state = user.live_aid_state().state_of(tube);
        let record = user.tube(tube).lock();

        Ok(TubeView {
            tube,
            state,
            version: record.version(),
            active: record.active_stitch().map(|s| s.id.clone()),
            positions: record
                .positions()
                .iter()
                .map(|(p, s)| (p, s.clone()))
                .collect(),
            gap_count: record.positions().gap_count(),
            progress: record.recorded_progress().into_iter().cloned().collect(),
        })
    }
}
