//! Shared command setup: configuration, logging, runtime, and scheduler.

use std::fs;
use std::future::Future;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tokio::runtime::Runtime;
use tracing::{debug, info, warn};
use tubeline::config::{config_file_path, ConfigFile};
use tubeline::logging::{init_logging, LoggingGuard};
use tubeline::model::UserId;
use tubeline::persistence::JsonFileStateStore;
use tubeline::preparation::{Fact, FactPoolGenerator};
use tubeline::scheduler::LearningScheduler;

use crate::error::CliError;

/// Name of the facts file kept next to learner state.
pub const FACTS_FILE: &str = "facts.json";

/// Global options that apply to every command.
#[derive(Debug, Clone, Default)]
pub struct GlobalOptions {
    pub config: Option<PathBuf>,
    pub state_dir: Option<PathBuf>,
    pub log_level: Option<String>,
}

/// Everything a scheduling command needs.
pub struct CliRunner {
    config: ConfigFile,
    runtime: Runtime,
    _logging: LoggingGuard,
}

impl CliRunner {
    /// Load configuration, apply CLI overrides, and start logging.
    pub fn new(options: &GlobalOptions) -> Result<Self, CliError> {
        let mut config = match &options.config {
            Some(path) => ConfigFile::load_from(path)?,
            None => ConfigFile::load()?,
        };
        if let Some(dir) = &options.state_dir {
            config.scheduler.storage.state_dir = dir.clone();
        }
        if let Some(level) = &options.log_level {
            config.scheduler.logging.level = level.clone();
        }

        let logging = init_logging(&config.scheduler.logging)?;
        let runtime = tokio::runtime::Builder::new_multi_thread()
            .enable_all()
            .thread_name("tubeline")
            .build()
            .map_err(|e| CliError::Runtime(e.to_string()))?;

        Ok(Self {
            config,
            runtime,
            _logging: logging,
        })
    }

    pub fn config(&self) -> &ConfigFile {
        &self.config
    }

    pub fn state_dir(&self) -> &Path {
        &self.config.scheduler.storage.state_dir
    }

    pub fn log_startup(&self, command: &str) {
        info!(
            command,
            version = tubeline::VERSION,
            state_dir = %self.state_dir().display(),
            config = %config_file_path().display(),
            "tubeline starting"
        );
    }

    /// Build a scheduler over the state directory and its facts file.
    pub fn scheduler(&self) -> Result<LearningScheduler, CliError> {
        let store = JsonFileStateStore::open(self.state_dir())?;
        let facts = load_facts(&self.state_dir().join(FACTS_FILE))?;
        if facts.is_empty() {
            warn!("No facts available, content preparation will fail");
        }
        Ok(LearningScheduler::new(
            self.config.scheduler.clone(),
            Arc::new(store),
            Arc::new(FactPoolGenerator::new(facts)),
        ))
    }

    /// Load the ready content a previous command left for `user` into the
    /// scheduler's cache. Returns how many entries were restored.
    pub fn restore_content(
        &self,
        scheduler: &LearningScheduler,
        user: &UserId,
    ) -> Result<usize, CliError> {
        let store = JsonFileStateStore::open(self.state_dir())?;
        let restored = store
            .load_ready_content(user)?
            .into_iter()
            .filter(|content| &content.user == user)
            .filter(|content| scheduler.cache().restore(content.clone()))
            .count();
        debug!(user = %user, restored, "Ready content loaded");
        Ok(restored)
    }

    /// Save the scheduler's ready content for `user` so the next command
    /// can serve it.
    pub fn save_content(&self, scheduler: &LearningScheduler, user: &UserId) -> Result<(), CliError> {
        let store = JsonFileStateStore::open(self.state_dir())?;
        let content = scheduler.cache().export(user);
        store.save_ready_content(user, &content)?;
        debug!(user = %user, entries = content.len(), "Ready content saved");
        Ok(())
    }

    /// Run a future to completion on the command's runtime.
    pub fn block_on<F: Future>(&self, future: F) -> F::Output {
        self.runtime.block_on(future)
    }
}

/// Read the facts file. A missing file yields an empty pool.
pub fn load_facts(path: &Path) -> Result<Vec<Fact>, CliError> {
    let bytes = match fs::read(path) {
        Ok(bytes) => bytes,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => {
            return Err(CliError::SeedFile {
                path: path.to_path_buf(),
                message: e.to_string(),
            })
        }
    };
    serde_json::from_slice(&bytes).map_err(|e| CliError::SeedFile {
        path: path.to_path_buf(),
        message: e.to_string(),
    })
}
