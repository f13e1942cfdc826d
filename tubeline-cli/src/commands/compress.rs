//! Compress command - remove gaps from tube position maps.

use console::style;
use tubeline::model::{TubeId, UserId};
use tubeline::position::CompressionOptions;

use super::common::parse_tube;
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// Arguments for the compress command.
pub struct CompressArgs {
    pub user: String,
    /// All tubes when unset.
    pub tube: Option<String>,
    pub dry_run: bool,
}

/// Run the compress command.
pub fn run(options: &GlobalOptions, args: CompressArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("compress");
    let scheduler = runner.scheduler()?;
    let user = UserId::new(args.user);

    let tubes = match &args.tube {
        Some(t) => vec![parse_tube(t)?],
        None => TubeId::ALL.to_vec(),
    };
    let options = if args.dry_run {
        CompressionOptions::dry_run()
    } else {
        CompressionOptions::default()
    };

    if args.dry_run {
        println!("{}", style("Dry run, nothing will be written").dim());
    }
    for tube in tubes {
        let result = scheduler.compress_tube(&user, tube, options)?;
        let action = if result.applied {
            style("compressed").green()
        } else if result.gaps_removed == 0 {
            style("no gaps").dim()
        } else {
            style("would compress").yellow()
        };
        println!(
            "  {}: {}  span {} → {}  ({} gaps, ratio {:.2})",
            tube,
            action,
            result.original_count,
            result.compressed_count,
            result.gaps_removed,
            result.ratio
        );
    }
    Ok(())
}
