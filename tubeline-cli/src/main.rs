//! Tubeline CLI - Command-line interface
//!
//! Drives the tubeline scheduler against a state directory of JSON files:
//! initialize learners from a seed, record sessions, rotate and compress
//! tubes, and fetch the LIVE tube's questions.

mod commands;
mod error;
mod runner;

use std::path::PathBuf;
use std::process;

use clap::{Parser, Subcommand};
use console::style;

use commands::complete::CompleteArgs;
use commands::compress::CompressArgs;
use commands::config::ConfigCommands;
use commands::init::InitArgs;
use commands::rotate::RotateArgs;
use commands::serve::ServeArgs;
use commands::show::ShowArgs;
use commands::simulate::SimulateArgs;
use error::CliError;
use runner::GlobalOptions;

#[derive(Parser)]
#[command(name = "tubeline")]
#[command(version, about = "Spaced-repetition tube scheduler", long_about = None)]
struct Cli {
    /// Config file to use instead of ~/.tubeline/config.ini
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// State directory (overrides [storage] state_dir)
    #[arg(long, global = true)]
    state_dir: Option<PathBuf>,

    /// Log filter, e.g. "debug" or "tubeline=trace" (overrides [logging] level)
    #[arg(long, global = true)]
    log_level: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Create a learner from a seed file
    Init {
        /// Learner id
        user: String,

        /// Seed file (JSON with "stitches" and "facts")
        #[arg(long)]
        seed: PathBuf,
    },

    /// Show a learner's tubes, positions, and progress
    Show {
        /// Learner id
        user: String,

        /// Only this tube (1, 2, or 3)
        #[arg(long)]
        tube: Option<String>,

        /// Print JSON instead of a table
        #[arg(long)]
        json: bool,
    },

    /// Record a completed session
    Complete {
        /// Learner id
        user: String,

        /// Stitch id, e.g. t1:add-within-10:3
        stitch: String,

        /// Questions answered correctly
        correct: u32,

        /// Questions in the session
        #[arg(long, default_value_t = 20)]
        total: u32,

        /// Boundary level the session ran at (1-5)
        #[arg(long)]
        boundary_level: Option<u8>,

        /// Fail instead of recording a review if the stitch is retired
        #[arg(long)]
        expect_movement: bool,

        /// Don't wait for content preparation after a rotation; unfinished
        /// content is not kept
        #[arg(long)]
        no_wait: bool,
    },

    /// Rotate the tubes (LIVE → PREPARING, READY → LIVE, PREPARING → READY)
    Rotate {
        /// Learner id
        user: String,

        /// Record as an administrative rotation with this reason
        #[arg(long)]
        reason: Option<String>,

        /// Don't wait for content preparation; unfinished content is not kept
        #[arg(long)]
        no_wait: bool,
    },

    /// Remove gaps from tube position maps
    Compress {
        /// Learner id
        user: String,

        /// Only this tube (1, 2, or 3)
        #[arg(long)]
        tube: Option<String>,

        /// Report what would change without writing
        #[arg(long)]
        dry_run: bool,
    },

    /// Fetch the questions for the LIVE tube (ready, stale, or prepared now)
    Serve {
        /// Learner id
        user: String,

        /// Print JSON instead of a list
        #[arg(long)]
        json: bool,
    },

    /// Run a simulated learner through many sessions in memory
    Simulate {
        /// Seed file (JSON with "stitches" and "facts")
        #[arg(long)]
        seed: PathBuf,

        /// Number of sessions to run
        #[arg(long, default_value_t = 50)]
        sessions: u32,

        /// Every nth session misses one question (0 = never)
        #[arg(long, default_value_t = 4)]
        miss_every: u32,
    },

    /// View and write configuration
    Config {
        #[command(subcommand)]
        command: ConfigCommands,
    },
}

fn main() {
    let cli = Cli::parse();
    let options = GlobalOptions {
        config: cli.config,
        state_dir: cli.state_dir,
        log_level: cli.log_level,
    };

    if let Err(e) = dispatch(&options, cli.command) {
        eprintln!("{} {}", style("Error:").red().bold(), e);
        process::exit(e.exit_code());
    }
}

fn dispatch(options: &GlobalOptions, command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Init { user, seed } => commands::init::run(options, InitArgs { user, seed }),
        Commands::Show { user, tube, json } => {
            commands::show::run(options, ShowArgs { user, tube, json })
        }
        Commands::Complete {
            user,
            stitch,
            correct,
            total,
            boundary_level,
            expect_movement,
            no_wait,
        } => commands::complete::run(
            options,
            CompleteArgs {
                user,
                stitch,
                correct,
                total,
                boundary_level,
                expect_movement,
                no_wait,
            },
        ),
        Commands::Rotate {
            user,
            reason,
            no_wait,
        } => commands::rotate::run(
            options,
            RotateArgs {
                user,
                reason,
                no_wait,
            },
        ),
        Commands::Compress {
            user,
            tube,
            dry_run,
        } => commands::compress::run(options, CompressArgs { user, tube, dry_run }),
        Commands::Serve { user, json } => commands::serve::run(options, ServeArgs { user, json }),
        Commands::Simulate {
            seed,
            sessions,
            miss_every,
        } => commands::simulate::run(
            options,
            SimulateArgs {
                seed,
                sessions,
                miss_every,
            },
        ),
        Commands::Config { command } => commands::config::run(options, command),
    }
}
