//! Preparation coordinator.
//!
//! Runs content preparation as background tasks, one lane per
//! (user, tube). Work within a lane is serialized through an async gate;
//! different lanes run in parallel.
//!
//! ```text
//! prepare_stitch ──► register ──► spawn ──► gate ──► generate ──► shuffle ──► commit
//!                      │                     ▲          │                      │
//!                      │ Background: reject  │ FIFO     │ timeout / cancel     ▼
//!                      │ if lane busy        │          ▼                ContentReadyCache
//!                      │ Emergency: cancel ──┘       Failed / Cancelled
//!                      │ lane, run inline
//! ```
//!
//! A process becomes `Completed` only at the commit step, which checks and
//! updates the status under the same map guard that `cancel_preparation`
//! uses. Once generation has produced questions the process is past the
//! point of cancellation: a cancel seen in `Assembling` or `Committing`
//! leaves it to complete, and a cancel after the commit is a no-op.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use dashmap::DashMap;
use rand::seq::SliceRandom;
use tokio::sync::broadcast;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::generator::{ContentGenerator, GenerationRequest};
use super::process::{
    PreparationEvent, PreparationPriority, PreparationProcess, PreparationRequest,
    PreparationStage, PreparationStatus, ProcessId,
};
use crate::cache::{ContentReadyCache, ReadyContent};
use crate::config::{PreparationConfig, MIN_GC_INTERVAL};
use crate::error::{Result, SchedulerError};
use crate::model::{TubeId, UserId};

type LaneKey = (UserId, TubeId);

/// Serialization point for one (user, tube).
#[derive(Default)]
struct Lane {
    /// Held for the duration of a process's run. Tokio mutexes are FIFO,
    /// so `Normal` work runs in submission order.
    gate: tokio::sync::Mutex<()>,
    /// Registered, non-finished processes in submission order.
    inflight: parking_lot::Mutex<Vec<ProcessId>>,
}

struct ProcessEntry {
    process: PreparationProcess,
    cancel: CancellationToken,
    observed: bool,
}

/// Why a run stopped short of completion.
enum Interrupt {
    Cancelled,
    Failed(SchedulerError),
}

/// Coordinates background content preparation.
pub struct ContentPreparationCoordinator {
    generator: Arc<dyn ContentGenerator>,
    cache: Arc<ContentReadyCache>,
    config: PreparationConfig,
    processes: DashMap<ProcessId, ProcessEntry>,
    lanes: DashMap<LaneKey, Arc<Lane>>,
    next_id: AtomicU64,
    events: broadcast::Sender<PreparationEvent>,
}

impl ContentPreparationCoordinator {
    pub fn new(
        generator: Arc<dyn ContentGenerator>,
        cache: Arc<ContentReadyCache>,
        config: PreparationConfig,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            generator,
            cache,
            config,
            processes: DashMap::new(),
            lanes: DashMap::new(),
            next_id: AtomicU64::new(1),
            events,
        }
    }

    pub fn config(&self) -> &PreparationConfig {
        &self.config
    }

    pub fn cache(&self) -> &Arc<ContentReadyCache> {
        &self.cache
    }

    /// Receive progress events for all processes.
    pub fn subscribe(&self) -> broadcast::Receiver<PreparationEvent> {
        self.events.subscribe()
    }

    /// Start preparing content in the background.
    ///
    /// Returns the queued process immediately. Must be called from within
    /// a Tokio runtime.
    pub fn prepare_stitch(
        self: &Arc<Self>,
        request: PreparationRequest,
    ) -> Result<PreparationProcess> {
        let runtime = tokio::runtime::Handle::try_current().map_err(|_| {
            SchedulerError::PreparationFailed("no async runtime available".to_string())
        })?;

        let (process, lane, cancel) = self.register(&request)?;
        let this = Arc::clone(self);
        let id = process.id;
        runtime.spawn(async move {
            if let Err(e) = this.run(id, request, lane, cancel).await {
                debug!(process = %id, error = %e, "Background preparation did not complete");
            }
        });

        Ok(process)
    }

    /// Prepare content now, cancelling anything in flight for the tube.
    ///
    /// Returns the committed content once the process completes.
    pub async fn emergency_preparation(
        &self,
        request: PreparationRequest,
    ) -> Result<Arc<ReadyContent>> {
        let request = request.with_priority(PreparationPriority::Emergency);
        let (process, lane, cancel) = self.register(&request)?;
        warn!(
            user = %request.user,
            tube = %request.tube,
            process = %process.id,
            "Emergency preparation"
        );
        self.run(process.id, request, lane, cancel).await
    }

    /// Cancel a process. Safe at any stage; cancelling a finished process
    /// is a no-op that returns its final state.
    ///
    /// A process whose questions are already generated completes anyway;
    /// the returned state is then still `InProgress`.
    pub fn cancel_preparation(&self, id: ProcessId) -> Result<PreparationProcess> {
        let mut entry = self
            .processes
            .get_mut(&id)
            .ok_or(SchedulerError::ProcessNotFound(id))?;

        if entry.process.is_terminal() {
            return Ok(entry.process.clone());
        }
        if matches!(
            entry.process.stage,
            PreparationStage::Assembling | PreparationStage::Committing
        ) {
            debug!(process = %id, stage = ?entry.process.stage, "Cancel ignored, completing");
            return Ok(entry.process.clone());
        }

        entry.process.finish(PreparationStatus::Cancelled);
        entry.process.reason = Some("cancelled".to_string());
        entry.cancel.cancel();
        let process = entry.process.clone();
        drop(entry);

        debug!(process = %id, "Preparation cancelled");
        self.emit(&process);
        Ok(process)
    }

    /// Current state of a process. Reading a finished process marks it for
    /// garbage collection.
    pub fn process(&self, id: ProcessId) -> Result<PreparationProcess> {
        let mut entry = self
            .processes
            .get_mut(&id)
            .ok_or(SchedulerError::ProcessNotFound(id))?;
        if entry.process.is_terminal() {
            entry.observed = true;
        }
        Ok(entry.process.clone())
    }

    /// All known processes, oldest first.
    pub fn processes(&self) -> Vec<PreparationProcess> {
        let mut all: Vec<PreparationProcess> = self
            .processes
            .iter()
            .map(|e| e.process.clone())
            .collect();
        all.sort_by_key(|p| p.id);
        all
    }

    /// Wait until a process reaches a final status.
    pub async fn wait(&self, id: ProcessId) -> Result<PreparationProcess> {
        // Subscribe before checking so a transition between the check and
        // the first recv is not missed.
        let mut events = self.events.subscribe();
        loop {
            let process = self.process(id)?;
            if process.is_terminal() {
                return Ok(process);
            }
            match events.recv().await {
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => continue,
                Err(broadcast::error::RecvError::Closed) => {
                    return Err(SchedulerError::PreparationFailed(
                        "event channel closed".to_string(),
                    ))
                }
            }
        }
    }

    /// Drop finished processes that were read, or that finished longer ago
    /// than the retention period. Returns the number removed.
    pub fn collect_garbage(&self) -> usize {
        let retention = self.config.process_retention;
        let before = self.processes.len();
        self.processes.retain(|_, entry| {
            let expired = entry
                .process
                .finished_for()
                .map(|age| entry.observed || age >= retention)
                .unwrap_or(false);
            !expired
        });
        self.lanes
            .retain(|_, lane| Arc::strong_count(lane) > 1 || !lane.inflight.lock().is_empty());
        before.saturating_sub(self.processes.len())
    }

    /// Run [`collect_garbage`](Self::collect_garbage) on the configured
    /// interval until `shutdown` fires. Intervals below
    /// [`MIN_GC_INTERVAL`] are raised to it.
    pub fn spawn_gc(self: &Arc<Self>, shutdown: CancellationToken) -> JoinHandle<()> {
        let this = Arc::clone(self);
        let period = this.config.gc_interval.max(MIN_GC_INTERVAL);
        tokio::spawn(async move {
            let mut interval = tokio::time::interval(period);
            interval.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
            loop {
                tokio::select! {
                    biased;

                    _ = shutdown.cancelled() => {
                        debug!("Preparation GC stopping");
                        break;
                    }

                    _ = interval.tick() => {
                        let removed = this.collect_garbage();
                        if removed > 0 {
                            debug!(removed, "Collected finished preparation processes");
                        }
                    }
                }
            }
        })
    }

    // =========================================================================
    // Internals
    // =========================================================================

    fn register(
        &self,
        request: &PreparationRequest,
    ) -> Result<(PreparationProcess, Arc<Lane>, CancellationToken)> {
        let key = (request.user.clone(), request.tube);
        let lane = Arc::clone(self.lanes.entry(key).or_default().value());

        let mut inflight = lane.inflight.lock();
        match request.priority {
            PreparationPriority::Background => {
                if let Some(&running) = inflight.first() {
                    return Err(SchedulerError::WarmingInProgress {
                        user: request.user.clone(),
                        tube: request.tube,
                        process_id: running,
                    });
                }
            }
            PreparationPriority::Normal => {}
            PreparationPriority::Emergency => {
                for &id in inflight.iter() {
                    // Already collected means already finished.
                    let _ = self.cancel_preparation(id);
                }
            }
        }

        let id = ProcessId::new(self.next_id.fetch_add(1, Ordering::Relaxed));
        let process = PreparationProcess::queued(id, request);
        let cancel = CancellationToken::new();
        self.processes.insert(
            id,
            ProcessEntry {
                process: process.clone(),
                cancel: cancel.clone(),
                observed: false,
            },
        );
        inflight.push(id);
        self.cache.mark_pending(&request.user, request.tube, id);
        drop(inflight);

        debug!(
            process = %id,
            user = %request.user,
            tube = %request.tube,
            stitch = %request.stitch.id,
            priority = %request.priority,
            "Preparation queued"
        );
        self.emit(&process);
        Ok((process, lane, cancel))
    }

    async fn run(
        &self,
        id: ProcessId,
        request: PreparationRequest,
        lane: Arc<Lane>,
        cancel: CancellationToken,
    ) -> Result<Arc<ReadyContent>> {
        let outcome = self.execute(id, &request, &lane, &cancel).await;

        let result = match outcome {
            Ok(content) => Ok(content),
            Err(Interrupt::Cancelled) => {
                // Already marked by cancel_preparation, or lost the race to
                // a cancel after generation finished.
                let _ = self.finish(id, PreparationStatus::Cancelled, None);
                Err(SchedulerError::PreparationFailed(format!(
                    "process {} was cancelled",
                    id
                )))
            }
            Err(Interrupt::Failed(err)) => {
                warn!(
                    process = %id,
                    user = %request.user,
                    tube = %request.tube,
                    stitch = %request.stitch.id,
                    code = err.code(),
                    error = %err,
                    "Preparation failed"
                );
                let _ = self.finish(id, PreparationStatus::Failed, Some(&err));
                Err(err)
            }
        };

        let mut inflight = lane.inflight.lock();
        inflight.retain(|p| *p != id);
        match inflight.first() {
            Some(&next) => self.cache.mark_pending(&request.user, request.tube, next),
            None => self.cache.clear_pending(&request.user, request.tube),
        }

        result
    }

    async fn execute(
        &self,
        id: ProcessId,
        request: &PreparationRequest,
        lane: &Lane,
        cancel: &CancellationToken,
    ) -> std::result::Result<Arc<ReadyContent>, Interrupt> {
        let _gate = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(Interrupt::Cancelled),
            guard = lane.gate.lock() => guard,
        };

        if !self.advance(id, PreparationStatus::InProgress, PreparationStage::Generating) {
            return Err(Interrupt::Cancelled);
        }

        let generation = GenerationRequest {
            stitch: Arc::clone(&request.stitch),
            boundary_level: request.boundary_level,
            question_count: request
                .question_count
                .unwrap_or(self.config.questions_per_stitch),
        };

        let generated = tokio::time::timeout(self.config.timeout, async {
            tokio::select! {
                biased;
                _ = cancel.cancelled() => Err(Interrupt::Cancelled),
                result = self.generator.generate(&generation) => {
                    result.map_err(|e| Interrupt::Failed(e.into()))
                }
            }
        })
        .await;

        let mut questions = match generated {
            Ok(result) => result?,
            Err(_) => {
                return Err(Interrupt::Failed(SchedulerError::PreparationTimeout(
                    self.config.timeout,
                )))
            }
        };

        if !self.advance(id, PreparationStatus::InProgress, PreparationStage::Assembling) {
            return Err(Interrupt::Cancelled);
        }
        questions.shuffle(&mut rand::rng());

        let content = ReadyContent::new(
            request.user.clone(),
            request.tube,
            request.stitch.id.clone(),
            request.boundary_level,
            questions,
        )
        .with_process(id);

        self.commit(id, content).ok_or(Interrupt::Cancelled)
    }

    /// Write content to the cache and mark the process completed, unless it
    /// was cancelled first.
    fn commit(&self, id: ProcessId, content: ReadyContent) -> Option<Arc<ReadyContent>> {
        let mut entry = self.processes.get_mut(&id)?;
        if entry.process.status != PreparationStatus::InProgress {
            return None;
        }

        entry.process.stage = PreparationStage::Committing;
        let questions = content.len();
        let committed = self.cache.insert(content);
        entry.process.finish(PreparationStatus::Completed);
        let process = entry.process.clone();
        drop(entry);

        info!(
            process = %id,
            user = %process.user,
            tube = %process.tube,
            stitch = %process.stitch_id,
            questions,
            "Content ready"
        );
        self.emit(&process);
        Some(committed)
    }

    /// Move a live process to a new stage. Returns false if it already
    /// reached a final status.
    fn advance(&self, id: ProcessId, status: PreparationStatus, stage: PreparationStage) -> bool {
        let Some(mut entry) = self.processes.get_mut(&id) else {
            return false;
        };
        if entry.process.is_terminal() {
            return false;
        }
        entry.process.advance(status, stage);
        let process = entry.process.clone();
        drop(entry);
        self.emit(&process);
        true
    }

    /// Record a final status unless one is already recorded.
    fn finish(
        &self,
        id: ProcessId,
        status: PreparationStatus,
        error: Option<&SchedulerError>,
    ) -> Option<PreparationProcess> {
        let mut entry = self.processes.get_mut(&id)?;
        if entry.process.is_terminal() {
            return None;
        }
        entry.process.finish(status);
        if let Some(err) = error {
            entry.process.error_code = Some(err.code().to_string());
            entry.process.reason = Some(err.to_string());
        }
        let process = entry.process.clone();
        drop(entry);
        self.emit(&process);
        Some(process)
    }

    fn emit(&self, process: &PreparationProcess) {
        // No subscribers is fine.
        let _ = self.events.send(PreparationEvent::from(process));
    }
}
