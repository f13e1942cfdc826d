//! Complete command - record a finished session.

use console::style;
use tubeline::model::{SessionCompletion, UserId};
use tubeline::reposition::RepositionMode;
use tubeline::scheduler::SessionOutcome;

use super::common::{parse_stitch, wait_for_preparation};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the complete command.
pub struct CompleteArgs {
    pub user: String,
    pub stitch: String,
    pub correct: u32,
    pub total: u32,
    pub boundary_level: Option<u8>,
    pub expect_movement: bool,
    pub no_wait: bool,
}

/// Run the complete command.
pub fn run(options: &GlobalOptions, args: CompleteArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("complete");
    let scheduler = runner.scheduler()?;

    let stitch = parse_stitch(&args.stitch)?;
    let mut completion =
        SessionCompletion::new(UserId::new(args.user), stitch, args.correct, args.total);
    if let Some(level) = args.boundary_level {
        completion = completion.with_boundary_level(level);
    }
    let mode = if args.expect_movement {
        RepositionMode::ExpectMovement
    } else {
        RepositionMode::Standard
    };

    runner.restore_content(&scheduler, &completion.user_id)?;

    runner.block_on(async {
        let outcome = scheduler.complete_session_with(&completion, mode)?;
        print_outcome(&outcome);

        if let Some(process) = outcome.rotation.as_ref().and_then(|r| r.preparation.as_ref()) {
            if !args.no_wait {
                wait_for_preparation(&scheduler, process).await?;
            }
        }
        Ok::<(), CliError>(())
    })?;

    runner.save_content(&scheduler, &completion.user_id)
}

fn print_outcome(outcome: &SessionOutcome) {
    let r = &outcome.reposition;
    let calc = &r.calculation;

    let verdict = if calc.is_review() {
        style("reviewed").cyan()
    } else if calc.is_advancement {
        style("advanced").green()
    } else {
        style("reset").yellow()
    };
    println!(
        "{} {}: skip {} → {} ({})",
        verdict,
        r.stitch_id,
        calc.previous_skip_number,
        calc.next_skip_number,
        calc.reasoning
    );
    if r.moved() {
        println!("  position {} → {}", r.previous_position, r.new_position);
    }
    if r.boundary_level_changed {
        println!("  boundary level now {}", r.boundary_level);
    }

    if let Some(c) = &outcome.compression {
        println!("  compressed {}: {} gaps removed", r.tube, c.gaps_removed);
    }
    if let Some(rotation) = &outcome.rotation {
        println!();
        println!("Tubes rotated (#{}):", rotation.result.rotation_count);
        for t in &rotation.result.transitions {
            println!("  {}: {} → {}", t.tube, t.from, t.to);
        }
    }
    if let Some(e) = &outcome.rotation_error {
        println!(
            "{} rotation failed: [{}] {}",
            style("!").red().bold(),
            e.code(),
            e
        );
    }
}
