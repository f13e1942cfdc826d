//! Init command - create a learner from a seed file.

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};

use console::style;
use tubeline::config::config_file_path;
use tubeline::model::{TubeId, UserId};
use tubeline::preparation::Fact;

use super::common::{print_rotation, SeedFile};
use crate::error::CliError;
use crate::runner::{load_facts, CliRunner, GlobalOptions, FACTS_FILE};

/// Arguments for the init command.
pub struct InitArgs {
    pub user: String,
    pub seed: PathBuf,
}

/// Run the init command.
pub fn run(options: &GlobalOptions, args: InitArgs) -> Result<(), CliError> {
    let runner = CliRunner::new(options)?;
    runner.log_startup("init");

    let seed = SeedFile::read(&args.seed)?;
    if seed.stitches.is_empty() {
        return Err(CliError::InvalidArgument(format!(
            "{} contains no stitches",
            args.seed.display()
        )));
    }

    // Write a config file on first use so there is something to edit.
    let config_path = config_file_path();
    if options.config.is_none() && !config_path.exists() {
        runner.config().save_to(&config_path)?;
        println!("Created {}", config_path.display());
    }

    fs::create_dir_all(runner.state_dir()).map_err(|e| CliError::SeedFile {
        path: runner.state_dir().to_path_buf(),
        message: e.to_string(),
    })?;
    let added = merge_facts(&runner.state_dir().join(FACTS_FILE), &seed.facts)?;

    let scheduler = runner.scheduler()?;
    let user = UserId::new(args.user);
    let state = scheduler.initialize_user(user.clone(), seed.user_seed())?;

    println!(
        "{} Initialized {} with {} stitches ({} new facts)",
        style("✓").green(),
        style(&user).bold(),
        seed.stitches.len(),
        added
    );
    for tube in TubeId::ALL {
        let count = seed.stitches.iter().filter(|s| s.id.tube == tube).count();
        println!("  {}: {} stitches", tube, count);
    }
    println!();
    print_rotation(&state.live_aid_state());
    Ok(())
}

/// Add facts to the shared facts file, keeping existing entries on id
/// clashes. Returns how many were added.
fn merge_facts(path: &Path, incoming: &[Fact]) -> Result<usize, CliError> {
    let mut by_id: BTreeMap<String, Fact> = load_facts(path)?
        .into_iter()
        .map(|f| (f.id.clone(), f))
        .collect();

    let before = by_id.len();
    for fact in incoming {
        by_id.entry(fact.id.clone()).or_insert_with(|| fact.clone());
    }
    let added = by_id.len() - before;

    let facts: Vec<&Fact> = by_id.values().collect();
    let json = serde_json::to_vec_pretty(&facts).map_err(|e| CliError::SeedFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    fs::write(path, json).map_err(|e| CliError::SeedFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })?;
    Ok(added)
}
