//! Show command - print a learner's tubes.

use console::style;
use tubeline::model::{StitchId, TubeId, UserId};
use tubeline::scheduler::TubeView;

use super::common::{parse_tube, print_rotation, state_label};
use crate::error::CliError;
use crate::runner::{CliRunner, GlobalOptions};

/// How many positions to list per tube before eliding.
const MAX_LISTED_POSITIONS: usize = 12;

/// Arguments for the show command.
pub struct ShowArgs {
    pub user: String,
    pub tube: Option<String>,
    pub json: bool,
}

/// Run the show command.
pub fn run(options: &GlobalOptions, args: ShowArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    let scheduler = runner.scheduler()?;
    let user = UserId::new(args.user);

    let tubes = match &args.tube {
        Some(t) => vec![parse_tube(t)?],
        None => TubeId::ALL.to_vec(),
    };
    let views = tubes
        .into_iter()
        .map(|tube| scheduler.tube_view(&user, tube))
        .collect::<Result<Vec<_>, _>>()?;

    if args.json {
        let json = serde_json::to_string_pretty(&views)
            .map_err(|e| CliError::InvalidArgument(e.to_string()))?;
        println!("{}", json);
        return Ok(());
    }

    let rotation = scheduler.live_aid_state(&user)?;
    println!("{} ({} rotations)", style(&user).bold(), rotation.rotation_count());
    print_rotation(&rotation);

    for view in &views {
        println!();
        print_view(view);
    }
    Ok(())
}

fn print_view(view: &TubeView) {
    println!(
        "{} {}  version {}  gaps {}",
        style(view.tube).bold(),
        state_label(view.state),
        view.version,
        view.gap_count
    );
    if view.positions.is_empty() {
        println!("  (empty)");
        return;
    }

    for (position, stitch) in view.positions.iter().take(MAX_LISTED_POSITIONS) {
        let marker = if Some(stitch) == view.active.as_ref() {
            style("▶").green().to_string()
        } else {
            " ".to_string()
        };
        println!(
            "  {} {:>5}  {:<28} {}",
            marker,
            position.get(),
            stitch.to_string(),
            describe(view, stitch)
        );
    }
    if view.positions.len() > MAX_LISTED_POSITIONS {
        println!("        … {} more", view.positions.len() - MAX_LISTED_POSITIONS);
    }
}

fn describe(view: &TubeView, stitch: &StitchId) -> String {
    match view.progress.iter().find(|p| &p.stitch_id == stitch) {
        Some(p) => format!(
            "skip {:<4} level {}  perfect×{}  sessions {}",
            p.skip_number.value(),
            p.boundary_level,
            p.consecutive_perfect,
            p.completions
        ),
        None => style("new").dim().to_string(),
    }
}
