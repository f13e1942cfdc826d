//! Rotate command - advance a learner's tubes by hand.

use console::style;
use tubeline::model::UserId;
use tubeline::rotation::RotationTrigger;

use super::common::{print_rotation, wait_for_preparation};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the rotate command.
pub struct RotateArgs {
    pub user: String,
    /// Recorded as an administrative rotation when set.
    pub reason: Option<String>,
    pub no_wait: bool,
}

/// Run the rotate command.
pub fn run(options: &GlobalOptions, args: RotateArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("rotate");
    let scheduler = runner.scheduler()?;
    let user = UserId::new(args.user);

    let trigger = match args.reason {
        Some(reason) => RotationTrigger::Administrative { reason },
        None => RotationTrigger::Manual,
    };

    runner.restore_content(&scheduler, &user)?;

    runner.block_on(async {
        let outcome = scheduler.rotate(&user, trigger)?;
        println!(
            "{} Rotation #{} ({})",
            style("✓").green(),
            outcome.result.rotation_count,
            outcome.result.trigger
        );
        print_rotation(&scheduler.live_aid_state(&user)?);

        match &outcome.preparation {
            Some(process) if !args.no_wait => {
                wait_for_preparation(&scheduler, process).await?;
            }
            Some(process) => println!("  preparation {} started", process.id),
            None => println!("  nothing to prepare for {}", outcome.result.preparing),
        }
        Ok::<(), CliError>(())
    })?;

    runner.save_content(&scheduler, &user)
}
