//! Simulate command - run a learner through many sessions in memory.
//!
//! Nothing is written to the state directory. Useful for checking how a
//! seed file behaves under the skip progression before committing to it.

use std::path::PathBuf;
use std::sync::Arc;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tubeline::model::{SessionCompletion, TubeId, UserId};
use tubeline::persistence::MemoryStateStore;
use tubeline::preparation::FactPoolGenerator;
use tubeline::scheduler::{ContentSource, LearningScheduler};

use super::common::{print_rotation, SeedFile};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the simulate command.
pub struct SimulateArgs {
    pub seed: PathBuf,
    pub sessions: u32,
    /// Every nth session misses one question. Zero means never.
    pub miss_every: u32,
}

#[derive(Debug, Default)]
struct Tally {
    sessions: u32,
    perfect: u32,
    rotations: u32,
    served_ready: u32,
    served_stale: u32,
    served_emergency: u32,
}

/// Run the simulate command.
pub fn run(options: &GlobalOptions, args: SimulateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("simulate");

    let seed = SeedFile::read(&args.seed)?;
    let scheduler = LearningScheduler::new(
        runner.config().scheduler.clone(),
        Arc::new(MemoryStateStore::new()),
        Arc::new(FactPoolGenerator::new(seed.facts.clone())),
    );
    let user = UserId::new("simulated");
    scheduler.initialize_user(user.clone(), seed.user_seed())?;

    let tally = runner.block_on(async {
        let shutdown = CancellationToken::new();
        let gc = scheduler.spawn_maintenance(shutdown.clone());
        let result = simulate(&scheduler, &user, &args).await;
        shutdown.cancel();
        let _ = gc.await;
        result
    })?;

    println!();
    println!(
        "{} sessions, {} perfect, {} rotations",
        tally.sessions, tally.perfect, tally.rotations
    );
    println!(
        "content: {} ready, {} stale, {} emergency",
        style(tally.served_ready).green(),
        style(tally.served_stale).yellow(),
        style(tally.served_emergency).red()
    );
    println!();
    print_rotation(&scheduler.live_aid_state(&user)?);
    for tube in TubeId::ALL {
        let view = scheduler.tube_view(&user, tube)?;
        let retired = view.progress.iter().filter(|p| p.is_retired()).count();
        println!(
            "  {}: {} stitches, {} retired, span {}",
            tube,
            view.positions.len(),
            retired,
            view.positions.last().map(|(p, _)| p.get()).unwrap_or(0)
        );
    }
    Ok(())
}

async fn simulate(
    scheduler: &LearningScheduler,
    user: &UserId,
    args: &SimulateArgs,
) -> Result<Tally, CliError> {
    let bar = ProgressBar::new(u64::from(args.sessions));
    bar.set_style(
        ProgressStyle::with_template("{bar:40.cyan/blue} {pos}/{len} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_bar()),
    );

    let mut tally = Tally::default();
    for n in 1..=args.sessions {
        let served = scheduler.serve_live(user).await?;
        match served.source {
            ContentSource::Ready => tally.served_ready += 1,
            ContentSource::Stale => tally.served_stale += 1,
            ContentSource::Emergency => tally.served_emergency += 1,
        }

        let total = served.content.len() as u32;
        let missed = args.miss_every > 0 && n % args.miss_every == 0;
        let correct = if missed { total.saturating_sub(1) } else { total };
        let completion =
            SessionCompletion::new(user.clone(), served.content.stitch_id.clone(), correct, total);

        let outcome = scheduler.complete_session(&completion)?;
        tally.sessions += 1;
        if !missed {
            tally.perfect += 1;
        }
        if let Some(rotation) = &outcome.rotation {
            tally.rotations += 1;
            // Let the new PREPARING tube finish so later serves hit the cache.
            if let Some(process) = &rotation.preparation {
                let done = scheduler.coordinator().wait(process.id).await?;
                debug!(process = %done.id, status = ?done.status, "Simulated preparation finished");
            }
        }

        bar.set_message(format!("{}", outcome.reposition.stitch_id));
        bar.inc(1);
    }
    bar.finish_and_clear();
    Ok(tally)
}
