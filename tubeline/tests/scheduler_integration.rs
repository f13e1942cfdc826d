//! Integration tests for the scheduler facade.
//!
//! These tests drive [`LearningScheduler`] end to end:
//! - session completion → repositioning → persistence
//! - LIVE tube completion → rotation → preparation → ready cache
//! - degraded content serving (stale, emergency)
//! - optimistic concurrency against a shared state store
//!
//! Run with: `cargo test --test scheduler_integration`

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Duration as ChronoDuration, Utc};

use tubeline::config::{
    CacheConfig, PreparationConfig, RepositionConfig, RotationConfig, SchedulerConfig,
};
use tubeline::model::{SessionCompletion, Stitch, StitchId, TubeId, UserId};
use tubeline::persistence::{JsonFileStateStore, MemoryStateStore, StateStore};
use tubeline::position::CompressionOptions;
use tubeline::preparation::{Fact, FactPoolGenerator, PreparationStatus};
use tubeline::reposition::RepositionMode;
use tubeline::rotation::{LiveAidState, RotationTrigger, TubeState};
use tubeline::scheduler::{ContentSource, LearningScheduler, UserSeed};

// ============================================================================
// Helper Functions
// ============================================================================

const STITCHES_PER_TUBE: u32 = 5;
const FACTS_PER_STITCH: u32 = 6;

fn stitch_id(tube: TubeId, order: u32) -> StitchId {
    StitchId::new(tube, "tables", order)
}

fn fact_id(tube: TubeId, order: u32, n: u32) -> String {
    format!("{}-{}-{}", tube, order, n)
}

/// Five stitches per tube, each backed by six numeric facts.
fn seed() -> UserSeed {
    let stitches = TubeId::ALL
        .into_iter()
        .flat_map(|tube| {
            (1..=STITCHES_PER_TUBE).map(move |order| {
                Stitch::new(
                    stitch_id(tube, order),
                    format!("{} times table", order),
                    (1..=FACTS_PER_STITCH)
                        .map(|n| fact_id(tube, order, n))
                        .collect(),
                )
            })
        })
        .collect();
    UserSeed::new(stitches)
}

fn facts() -> Vec<Fact> {
    let mut facts = Vec::new();
    for tube in TubeId::ALL {
        for order in 1..=STITCHES_PER_TUBE {
            for n in 1..=FACTS_PER_STITCH {
                facts.push(Fact::new(
                    fact_id(tube, order, n),
                    format!("{} x {}", n, order),
                    (n * order).to_string(),
                ));
            }
        }
    }
    facts
}

fn config() -> SchedulerConfig {
    SchedulerConfig::default()
        .with_preparation(PreparationConfig::default().with_questions_per_stitch(6))
        .with_rotation(RotationConfig::default().with_rotate_on_completion(false))
}

fn scheduler_with(config: SchedulerConfig, store: Arc<dyn StateStore>) -> LearningScheduler {
    LearningScheduler::new(config, store, Arc::new(FactPoolGenerator::new(facts())))
}

fn scheduler(config: SchedulerConfig) -> LearningScheduler {
    scheduler_with(config, Arc::new(MemoryStateStore::new()))
}

fn alice() -> UserId {
    UserId::new("alice")
}

/// A completion `minutes` after a fixed base time, so ordering is explicit.
fn completion(stitch: &StitchId, correct: u32, minutes: i64) -> SessionCompletion {
    let base: DateTime<Utc> = DateTime::from_timestamp(1_700_000_000, 0).unwrap();
    SessionCompletion::new(alice(), stitch.clone(), correct, 20)
        .at(base + ChronoDuration::minutes(minutes))
}

/// Two perfect sessions on tube 1's first stitch: positions 4 then 8.
fn spread_first_stitch(scheduler: &LearningScheduler) {
    let id = stitch_id(TubeId::Tube1, 1);
    for minute in 0..2 {
        scheduler
            .complete_session(&completion(&id, 20, minute))
            .unwrap();
    }
}

fn layout(scheduler: &LearningScheduler, tube: TubeId) -> Vec<(u32, u32)> {
    scheduler
        .tube_view(&alice(), tube)
        .unwrap()
        .positions
        .iter()
        .map(|(p, s)| (p.get(), s.order))
        .collect()
}

// ============================================================================
// Skip Progression Scenarios
// ============================================================================

#[test]
fn test_first_perfect_session_advances() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube1, 1);

    let outcome = scheduler.complete_session(&completion(&id, 20, 0)).unwrap();

    let calc = &outcome.reposition.calculation;
    assert_eq!(calc.previous_skip_number.value(), 4);
    assert_eq!(calc.next_skip_number.value(), 8);
    assert_eq!(calc.consecutive_perfect, 1);
    assert!(calc.is_advancement);
    assert!(!calc.is_reset);
    assert!(outcome.reposition.moved());
}

#[test]
fn test_imperfect_session_resets_from_hundred() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube1, 1);

    for minute in 0..4 {
        scheduler
            .complete_session(&completion(&id, 20, minute))
            .unwrap();
    }
    let progress = scheduler.progress(&alice(), &id).unwrap();
    assert_eq!(progress.skip_number.value(), 100);
    assert_eq!(progress.consecutive_perfect, 4);
    let position_before = scheduler
        .tube_view(&alice(), TubeId::Tube1)
        .unwrap()
        .positions
        .iter()
        .find(|(_, s)| *s == id)
        .map(|(p, _)| *p)
        .unwrap();

    let outcome = scheduler.complete_session(&completion(&id, 18, 10)).unwrap();

    let calc = &outcome.reposition.calculation;
    assert_eq!(calc.next_skip_number.value(), 4);
    assert_eq!(calc.consecutive_perfect, 0);
    assert!(calc.is_reset);
    assert!(!calc.is_advancement);
    assert_eq!(outcome.reposition.new_position, position_before);
}

#[test]
fn test_retired_stitch_is_reviewed_in_place() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube2, 1);

    for minute in 0..5 {
        scheduler
            .complete_session(&completion(&id, 20, minute))
            .unwrap();
    }
    assert!(scheduler.progress(&alice(), &id).unwrap().is_retired());
    let before = layout(&scheduler, TubeId::Tube2);

    let outcome = scheduler.complete_session(&completion(&id, 20, 10)).unwrap();

    assert_eq!(outcome.reposition.skip_number.value(), 1000);
    assert!(outcome.reposition.calculation.is_review());
    assert!(!outcome.reposition.moved());
    assert_eq!(layout(&scheduler, TubeId::Tube2), before);
    assert_eq!(scheduler.progress(&alice(), &id).unwrap().completions, 6);
}

#[test]
fn test_retired_stitch_with_expect_movement_fails() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube3, 2);

    for minute in 0..5 {
        scheduler
            .complete_session(&completion(&id, 20, minute))
            .unwrap();
    }

    let err = scheduler
        .complete_session_with(&completion(&id, 20, 10), RepositionMode::ExpectMovement)
        .unwrap_err();
    assert_eq!(err.code(), "STITCH_ALREADY_RETIRED");
    assert_eq!(scheduler.progress(&alice(), &id).unwrap().completions, 5);
}

// ============================================================================
// Repositioning and Compression
// ============================================================================

#[test]
fn test_perfect_session_shifts_intervening_stitches() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();

    let outcome = scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 1), 20, 0))
        .unwrap();

    // Skip 4 sends stitch 1 to position 4; stitches 2..=4 move up by one.
    assert_eq!(outcome.reposition.new_position.get(), 4);
    assert_eq!(outcome.reposition.skip_number.value(), 8);
    assert_eq!(
        layout(&scheduler, TubeId::Tube1),
        vec![(1, 2), (2, 3), (3, 4), (4, 1), (5, 5)]
    );
    let view = scheduler.tube_view(&alice(), TubeId::Tube1).unwrap();
    assert_eq!(view.active, Some(stitch_id(TubeId::Tube1, 2)));
    assert_eq!(view.gap_count, 0);
    assert_eq!(view.version, 1);
}

#[test]
fn test_second_perfect_session_leaves_gaps_past_the_end() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    spread_first_stitch(&scheduler);

    // The second pass uses skip 8, beyond the five seeded stitches.
    assert_eq!(
        layout(&scheduler, TubeId::Tube1),
        vec![(1, 2), (2, 3), (3, 4), (4, 5), (8, 1)]
    );
    assert_eq!(scheduler.tube_view(&alice(), TubeId::Tube1).unwrap().gap_count, 3);
}

#[test]
fn test_compress_tube_dry_run_then_apply() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    spread_first_stitch(&scheduler);

    let preview = scheduler
        .compress_tube(&alice(), TubeId::Tube1, CompressionOptions::dry_run())
        .unwrap();
    assert_eq!(preview.gaps_removed, 3);
    assert!(!preview.applied);
    assert_eq!(scheduler.tube_view(&alice(), TubeId::Tube1).unwrap().gap_count, 3);

    let result = scheduler
        .compress_tube(&alice(), TubeId::Tube1, CompressionOptions::default())
        .unwrap();
    assert!(result.applied);
    assert_eq!(result.compressed_count, 5);
    assert_eq!(
        layout(&scheduler, TubeId::Tube1),
        vec![(1, 2), (2, 3), (3, 4), (4, 5), (5, 1)]
    );

    let again = scheduler
        .compress_tube(&alice(), TubeId::Tube1, CompressionOptions::default())
        .unwrap();
    assert_eq!(again.gaps_removed, 0);
    assert!(!again.applied);
}

#[test]
fn test_compression_keeps_progress() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube1, 1);
    scheduler
        .complete_session(&completion(&id, 20, 0).with_boundary_level(3))
        .unwrap();
    scheduler.complete_session(&completion(&id, 20, 1)).unwrap();
    let before = scheduler.progress(&alice(), &id).unwrap();
    assert!(scheduler.tube_view(&alice(), TubeId::Tube1).unwrap().gap_count > 0);

    scheduler
        .compress_tube(&alice(), TubeId::Tube1, CompressionOptions::default())
        .unwrap();

    assert_eq!(scheduler.progress(&alice(), &id).unwrap(), before);
}

#[test]
fn test_gap_threshold_compresses_after_session() {
    let config = config()
        .with_reposition(RepositionConfig::default().with_compress_gap_threshold(3));
    let scheduler = scheduler(config);
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube1, 1);

    let first = scheduler.complete_session(&completion(&id, 20, 0)).unwrap();
    assert!(first.compression.is_none());
    let outcome = scheduler.complete_session(&completion(&id, 20, 1)).unwrap();

    let compression = outcome.compression.expect("tube crossed the gap threshold");
    assert_eq!(compression.gaps_removed, 3);
    assert_eq!(scheduler.tube_view(&alice(), TubeId::Tube1).unwrap().gap_count, 0);
}

#[test]
fn test_out_of_order_session_rejected() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();

    scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 2), 20, 10))
        .unwrap();
    let err = scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 3), 20, 5))
        .unwrap_err();

    assert_eq!(err.code(), "REPOSITIONING_FAILED");
    assert!(err.is_retryable());
}

#[test]
fn test_invalid_scores_rejected_without_effect() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let id = stitch_id(TubeId::Tube1, 1);

    let over = SessionCompletion::new(alice(), id.clone(), 21, 20);
    assert_eq!(
        scheduler.complete_session(&over).unwrap_err().code(),
        "INVALID_PERFORMANCE_DATA"
    );
    let empty = SessionCompletion::new(alice(), id.clone(), 0, 0);
    assert_eq!(
        scheduler.complete_session(&empty).unwrap_err().code(),
        "INVALID_PERFORMANCE_DATA"
    );

    assert_eq!(scheduler.tube_view(&alice(), TubeId::Tube1).unwrap().version, 0);
}

// ============================================================================
// Learners
// ============================================================================

#[test]
fn test_unknown_user() {
    let scheduler = scheduler(config());
    let err = scheduler.live_aid_state(&UserId::new("nobody")).unwrap_err();
    assert_eq!(err.code(), "USER_NOT_FOUND");
}

#[test]
fn test_initializing_twice_is_rejected() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let err = scheduler.initialize_user(alice(), seed()).unwrap_err();
    assert_eq!(err.code(), "INVALID_SEED");
}

#[test]
fn test_unknown_stitch() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    let err = scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 99), 20, 0))
        .unwrap_err();
    assert_eq!(err.code(), "STITCH_NOT_FOUND");
}

#[test]
fn test_stale_writer_gets_version_conflict() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let first = scheduler_with(config(), Arc::clone(&store));
    let second = scheduler_with(config(), Arc::clone(&store));
    first.initialize_user(alice(), seed()).unwrap();
    second.ensure_user(&alice()).unwrap();

    first
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 1), 20, 0))
        .unwrap();
    let err = second
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 2), 20, 1))
        .unwrap_err();

    assert_eq!(err.code(), "VERSION_CONFLICT");
    assert!(err.is_retryable());

    // The retry works from the stored state and keeps both sessions.
    let retried = second
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 2), 20, 1))
        .unwrap();
    assert_eq!(retried.reposition.version, 2);
    assert_eq!(
        layout(&second, TubeId::Tube1),
        vec![(1, 3), (2, 4), (3, 1), (4, 2), (5, 5)]
    );
    let stored = store.load_user(&alice()).unwrap().unwrap();
    assert_eq!(stored.tube(TubeId::Tube1).unwrap().version, 2);
}

#[test]
fn test_stale_rotation_and_compression_recover_on_retry() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let first = scheduler_with(config(), Arc::clone(&store));
    let second = scheduler_with(config(), Arc::clone(&store));
    first.initialize_user(alice(), seed()).unwrap();
    second.ensure_user(&alice()).unwrap();

    first.rotate(&alice(), RotationTrigger::Manual).unwrap();
    let err = second.rotate(&alice(), RotationTrigger::Manual).unwrap_err();
    assert_eq!(err.code(), "VERSION_CONFLICT");
    let outcome = second.rotate(&alice(), RotationTrigger::Manual).unwrap();
    assert_eq!(outcome.result.rotation_count, 2);
    assert_eq!(outcome.result.live, TubeId::Tube3);

    spread_first_stitch(&first);
    second.reload_user(&alice()).unwrap();
    first
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 2), 20, 5))
        .unwrap();
    let err = second
        .compress_tube(&alice(), TubeId::Tube1, CompressionOptions::default())
        .unwrap_err();
    assert_eq!(err.code(), "VERSION_CONFLICT");
    let result = second
        .compress_tube(&alice(), TubeId::Tube1, CompressionOptions::default())
        .unwrap();
    assert!(result.applied);
    assert_eq!(result.gaps_removed, 3);
}

#[test]
fn test_reload_user_picks_up_other_writers() {
    let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
    let first = scheduler_with(config(), Arc::clone(&store));
    let second = scheduler_with(config(), Arc::clone(&store));
    first.initialize_user(alice(), seed()).unwrap();
    second.ensure_user(&alice()).unwrap();

    first
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 1), 20, 0))
        .unwrap();
    assert_eq!(second.tube_view(&alice(), TubeId::Tube1).unwrap().version, 0);

    second.reload_user(&alice()).unwrap();
    assert_eq!(second.tube_view(&alice(), TubeId::Tube1).unwrap().version, 1);
}

#[test]
fn test_json_store_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let id = stitch_id(TubeId::Tube2, 1);

    {
        let store = Arc::new(JsonFileStateStore::open(dir.path()).unwrap());
        let scheduler = scheduler_with(config(), store);
        scheduler.initialize_user(alice(), seed()).unwrap();
        scheduler
            .complete_session(&completion(&id, 20, 0).with_boundary_level(2))
            .unwrap();
        scheduler
            .rotate(&alice(), RotationTrigger::Manual)
            .unwrap();
    }

    let store = Arc::new(JsonFileStateStore::open(dir.path()).unwrap());
    let reopened = scheduler_with(config(), store);

    let progress = reopened.progress(&alice(), &id).unwrap();
    assert_eq!(progress.skip_number.value(), 8);
    assert_eq!(progress.boundary_level.get(), 2);
    let rotation = reopened.live_aid_state(&alice()).unwrap();
    assert_eq!(rotation.rotation_count(), 1);
    assert_eq!(rotation.live().unwrap(), TubeId::Tube2);
    assert_eq!(reopened.tube_view(&alice(), TubeId::Tube2).unwrap().version, 1);
}

// ============================================================================
// Rotation
// ============================================================================

#[test]
fn test_manual_rotation_stays_bijective() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();

    for n in 1..=7u64 {
        let outcome = scheduler.rotate(&alice(), RotationTrigger::Manual).unwrap();
        assert_eq!(outcome.result.rotation_count, n);
        assert_eq!(outcome.result.transitions.len(), 3);

        let state = scheduler.live_aid_state(&alice()).unwrap();
        state.validate().unwrap();
        let mut roles: Vec<TubeState> = TubeId::ALL.iter().map(|t| state.state_of(*t)).collect();
        roles.sort_by_key(|s| s.to_string());
        assert_eq!(roles, vec![TubeState::Live, TubeState::Preparing, TubeState::Ready]);
    }
}

#[tokio::test]
async fn test_live_completion_rotates_and_prepares() {
    let config = config().with_rotation(RotationConfig::default());
    let scheduler = scheduler(config);
    scheduler.initialize_user(alice(), seed()).unwrap();
    assert_eq!(scheduler.live_aid_state(&alice()).unwrap().live().unwrap(), TubeId::Tube1);

    let outcome = scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 1), 20, 0))
        .unwrap();

    let rotation = outcome.rotation.expect("LIVE tube completion rotates");
    assert!(outcome.rotation_error.is_none());
    assert_eq!(rotation.result.live, TubeId::Tube2);
    assert_eq!(rotation.result.ready, TubeId::Tube3);
    assert_eq!(rotation.result.preparing, TubeId::Tube1);

    let process = rotation.preparation.expect("preparation started");
    assert_eq!(process.tube, TubeId::Tube1);
    // The moved stitch is no longer due; the next active one is.
    assert_eq!(process.stitch_id, stitch_id(TubeId::Tube1, 2));

    let done = scheduler.coordinator().wait(process.id).await.unwrap();
    assert_eq!(done.status, PreparationStatus::Completed);

    let ready = scheduler
        .cache()
        .get_ready_stitch(&alice(), TubeId::Tube1)
        .unwrap();
    assert_eq!(ready.stitch_id, stitch_id(TubeId::Tube1, 2));
    assert_eq!(ready.len(), 6);
}

#[tokio::test]
async fn test_non_live_completion_does_not_rotate() {
    let config = config().with_rotation(RotationConfig::default());
    let scheduler = scheduler(config);
    scheduler.initialize_user(alice(), seed()).unwrap();

    let outcome = scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube3, 1), 20, 0))
        .unwrap();

    assert!(outcome.rotation.is_none());
    assert_eq!(scheduler.live_aid_state(&alice()).unwrap().rotation_count(), 0);
}

#[test]
fn test_inconsistent_rotation_reported_but_session_kept() {
    let config = config().with_rotation(RotationConfig::default());
    let scheduler = scheduler(config);
    let state = scheduler.initialize_user(alice(), seed()).unwrap();
    *state.rotation().lock() = LiveAidState::from_states([
        TubeState::Live,
        TubeState::Live,
        TubeState::Preparing,
    ]);

    let outcome = scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 1), 20, 0))
        .unwrap();

    assert!(outcome.rotation.is_none());
    let err = outcome.rotation_error.expect("rotation attempted");
    assert_eq!(err.code(), "ROTATION_FAILED");
    assert_eq!(outcome.reposition.skip_number.value(), 8);
}

#[test]
fn test_rotation_without_runtime_still_rotates() {
    let config = config().with_rotation(RotationConfig::default());
    let scheduler = scheduler(config);
    scheduler.initialize_user(alice(), seed()).unwrap();

    let outcome = scheduler.rotate(&alice(), RotationTrigger::Manual).unwrap();

    assert!(outcome.preparation.is_none());
    assert_eq!(scheduler.live_aid_state(&alice()).unwrap().live().unwrap(), TubeId::Tube2);
}

// ============================================================================
// Content Serving
// ============================================================================

#[tokio::test]
async fn test_prepare_ready_tubes_skips_busy_lanes() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();

    let started = scheduler.prepare_ready_tubes(&alice()).unwrap();
    assert_eq!(started.len(), 3);

    // Nothing has run yet on this runtime, so every lane is still busy.
    let again = scheduler.prepare_ready_tubes(&alice()).unwrap();
    assert!(again.is_empty());

    for process in started {
        let done = scheduler.coordinator().wait(process.id).await.unwrap();
        assert_eq!(done.status, PreparationStatus::Completed);
    }
    for tube in TubeId::ALL {
        assert!(scheduler.cache().get_ready_stitch(&alice(), tube).is_ok());
    }
}

#[tokio::test]
async fn test_serve_live_from_ready_cache() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    for process in scheduler.prepare_ready_tubes(&alice()).unwrap() {
        scheduler.coordinator().wait(process.id).await.unwrap();
    }

    let served = scheduler.serve_live(&alice()).await.unwrap();

    assert_eq!(served.source, ContentSource::Ready);
    assert_eq!(served.content.stitch_id, stitch_id(TubeId::Tube1, 1));
}

#[tokio::test]
async fn test_serve_live_falls_back_to_emergency() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();

    let served = scheduler.serve_live(&alice()).await.unwrap();

    assert_eq!(served.source, ContentSource::Emergency);
    assert_eq!(served.content.stitch_id, stitch_id(TubeId::Tube1, 1));
    assert!(scheduler
        .cache()
        .get_ready_stitch(&alice(), TubeId::Tube1)
        .is_ok());
}

#[tokio::test]
async fn test_serve_live_prefers_stale_over_emergency() {
    let config = config().with_cache(CacheConfig::default().with_max_age(Duration::from_millis(1)));
    let scheduler = scheduler(config);
    scheduler.initialize_user(alice(), seed()).unwrap();
    for process in scheduler.prepare_ready_tubes(&alice()).unwrap() {
        scheduler.coordinator().wait(process.id).await.unwrap();
    }
    tokio::time::sleep(Duration::from_millis(20)).await;

    let served = scheduler.serve_live(&alice()).await.unwrap();

    assert_eq!(served.source, ContentSource::Stale);
    assert_eq!(served.content.stitch_id, stitch_id(TubeId::Tube1, 1));
}

#[tokio::test]
async fn test_saved_ready_content_is_served_after_restart() {
    let dir = tempfile::tempdir().unwrap();

    {
        let store = Arc::new(JsonFileStateStore::open(dir.path()).unwrap());
        let scheduler = scheduler_with(config(), store.clone());
        scheduler.initialize_user(alice(), seed()).unwrap();
        for process in scheduler.prepare_ready_tubes(&alice()).unwrap() {
            scheduler.coordinator().wait(process.id).await.unwrap();
        }
        store
            .save_ready_content(&alice(), &scheduler.cache().export(&alice()))
            .unwrap();
    }

    let store = Arc::new(JsonFileStateStore::open(dir.path()).unwrap());
    let reopened = scheduler_with(config(), store.clone());
    let mut restored = 0;
    for content in store.load_ready_content(&alice()).unwrap() {
        if reopened.cache().restore(content) {
            restored += 1;
        }
    }
    assert_eq!(restored, 3);

    let served = reopened.serve_live(&alice()).await.unwrap();
    assert_eq!(served.source, ContentSource::Ready);
    assert_eq!(served.content.stitch_id, stitch_id(TubeId::Tube1, 1));
}

#[tokio::test]
async fn test_moved_stitch_content_is_invalidated() {
    let scheduler = scheduler(config());
    scheduler.initialize_user(alice(), seed()).unwrap();
    for process in scheduler.prepare_ready_tubes(&alice()).unwrap() {
        scheduler.coordinator().wait(process.id).await.unwrap();
    }

    scheduler
        .complete_session(&completion(&stitch_id(TubeId::Tube1, 1), 20, 0))
        .unwrap();

    let err = scheduler
        .cache()
        .get_ready_stitch(&alice(), TubeId::Tube1)
        .unwrap_err();
    assert_eq!(err.code(), "CACHE_MISS");

    // The next serve builds content for the new active stitch.
    let served = scheduler.serve_live(&alice()).await.unwrap();
    assert_eq!(served.content.stitch_id, stitch_id(TubeId::Tube1, 2));
}

#[tokio::test]
async fn test_insufficient_facts_degrades_to_error_not_panic() {
    let scheduler = LearningScheduler::new(
        config(),
        Arc::new(MemoryStateStore::new()),
        Arc::new(FactPoolGenerator::new(Vec::new())),
    );
    scheduler.initialize_user(alice(), seed()).unwrap();

    let err = scheduler.serve_live(&alice()).await.unwrap_err();
    assert_eq!(err.code(), "INSUFFICIENT_FACTS");
}
