//! Common types and utilities shared across CLI commands.

use std::fs;
use std::path::Path;
use std::time::Duration;

use console::style;
use indicatif::{ProgressBar, ProgressStyle};
use serde::{Deserialize, Serialize};
use tubeline::model::{Stitch, StitchId, TubeId};
use tubeline::preparation::{Fact, PreparationProcess, PreparationStatus};
use tubeline::rotation::{LiveAidState, TubeState};
use tubeline::scheduler::{LearningScheduler, UserSeed};

use crate::error::CliError;

/// On-disk seed: the stitches for a new learner and the facts behind them.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SeedFile {
    pub stitches: Vec<Stitch>,
    #[serde(default)]
    pub facts: Vec<Fact>,
}

impl SeedFile {
    pub fn read(path: &Path) -> Result<Self, CliError> {
        let bytes = fs::read(path).map_err(|e| CliError::SeedFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        serde_json::from_slice(&bytes).map_err(|e| CliError::SeedFile {
            path: path.to_path_buf(),
            message: e.to_string(),
        })
    }

    pub fn user_seed(&self) -> UserSeed {
        UserSeed::new(self.stitches.clone())
    }
}

/// Parse a tube argument (`1`, `t1`, or `tube1`).
pub fn parse_tube(s: &str) -> Result<TubeId, CliError> {
    s.parse()
        .map_err(|_| CliError::InvalidArgument(format!("'{}' is not a tube (use 1, 2, or 3)", s)))
}

/// Parse a stitch argument (`t1:concept:order`).
pub fn parse_stitch(s: &str) -> Result<StitchId, CliError> {
    s.parse().map_err(|_| {
        CliError::InvalidArgument(format!(
            "'{}' is not a stitch id (expected t<tube>:<concept>:<order>)",
            s
        ))
    })
}

/// Colored tube state label.
pub fn state_label(state: TubeState) -> String {
    let label = format!("{:<9}", state.to_string());
    match state {
        TubeState::Live => style(label).green().bold().to_string(),
        TubeState::Ready => style(label).cyan().to_string(),
        TubeState::Preparing => style(label).yellow().to_string(),
    }
}

/// One line per tube, in tube order.
pub fn print_rotation(state: &LiveAidState) {
    for (tube, role) in state.tubes() {
        println!("  {}  {}", tube, state_label(role));
    }
}

/// Wait for a preparation with a spinner. Returns the final process state.
pub async fn wait_for_preparation(
    scheduler: &LearningScheduler,
    process: &PreparationProcess,
) -> Result<PreparationProcess, CliError> {
    let spinner = ProgressBar::new_spinner();
    spinner.set_style(
        ProgressStyle::with_template("{spinner:.cyan} {msg}")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    spinner.enable_steady_tick(Duration::from_millis(100));
    spinner.set_message(format!(
        "Preparing {} for {} ({})",
        process.stitch_id, process.tube, process.id
    ));

    let done = scheduler.coordinator().wait(process.id).await;
    spinner.finish_and_clear();
    let done = done?;

    match done.status {
        PreparationStatus::Completed => println!(
            "  {} {} ready for {}",
            style("✓").green(),
            done.stitch_id,
            done.tube
        ),
        status => println!(
            "  {} preparation {} for {}: {}",
            style("✗").red(),
            format!("{:?}", status).to_lowercase(),
            done.tube,
            done.reason.as_deref().unwrap_or("no reason given")
        ),
    }
    Ok(done)
}
