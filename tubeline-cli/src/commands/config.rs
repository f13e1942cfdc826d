//! Configuration management CLI commands.
//!
//! Provides `config show`, `config path`, and `config write` for viewing
//! and creating the configuration file.

use std::path::Path;

use clap::Subcommand;
use tubeline::config::{config_file_path, ConfigFile};

use crate::error::CliError;
use crate::runner::GlobalOptions;

/// Config subcommands.
#[derive(Debug, Subcommand)]
pub enum ConfigCommands {
    /// Print the effective configuration in config-file form
    Show,

    /// Show the configuration file path
    Path,

    /// Write the effective configuration to the config file
    Write {
        /// Overwrite an existing file
        #[arg(long)]
        force: bool,
    },
}

/// Run a config subcommand.
pub fn run(options: &GlobalOptions, command: ConfigCommands) -> Result<(), CliError> {
    let path = options.config.clone().unwrap_or_else(config_file_path);
    match command {
        ConfigCommands::Show => run_show(&path),
        ConfigCommands::Path => run_path(&path),
        ConfigCommands::Write { force } => run_write(&path, force),
    }
}

fn load(path: &Path) -> Result<ConfigFile, CliError> {
    if path.exists() {
        Ok(ConfigFile::load_from(path)?)
    } else {
        Ok(ConfigFile::default())
    }
}

/// Print the effective configuration.
fn run_show(path: &Path) -> Result<(), CliError> {
    let config = load(path)?;
    let mut out = Vec::new();
    config
        .to_ini()
        .write_to(&mut out)
        .map_err(|e| CliError::Config(e.to_string()))?;
    print!("{}", String::from_utf8_lossy(&out));
    Ok(())
}

/// Show the configuration file path.
fn run_path(path: &Path) -> Result<(), CliError> {
    let marker = if path.exists() { "" } else { " (not created)" };
    println!("{}{}", path.display(), marker);
    Ok(())
}

/// Write the effective configuration to disk.
fn run_write(path: &Path, force: bool) -> Result<(), CliError> {
    if path.exists() && !force {
        return Err(CliError::Config(format!(
            "{} already exists. Use --force to overwrite.",
            path.display()
        )));
    }
    load(path)?.save_to(path)?;
    println!("Wrote {}", path.display());
    Ok(())
}
