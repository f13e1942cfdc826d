//! INI configuration file.
//!
//! ```ini
//! [scheduler]
//! lock_timeout_ms = 500
//! compress_gap_threshold = 200
//! rotate_on_completion = true
//!
//! [preparation]
//! questions_per_stitch = 20
//! timeout_secs = 30
//! process_retention_secs = 600
//! gc_interval_secs = 60
//!
//! [cache]
//! max_age_secs = 3600
//! max_entries = 10000
//!
//! [storage]
//! state_dir = ~/.tubeline/state
//!
//! [logging]
//! level = info
//! log_dir = ~/.tubeline/logs
//! ```
//!
//! Missing sections and keys keep their defaults.

use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use ini::Ini;
use thiserror::Error;

use super::{tubeline_home, SchedulerConfig, MAX_CACHE_MAX_AGE};

/// Errors loading or saving the configuration file.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: ini::Error,
    },

    #[error("Failed to parse config: {0}")]
    Parse(#[from] ini::ParseError),

    #[error("Failed to write config file: {0}")]
    Write(#[from] std::io::Error),

    #[error("Invalid value for {section}.{key}: '{value}'")]
    InvalidValue {
        section: String,
        key: String,
        value: String,
    },
}

/// Path of the default configuration file: `~/.tubeline/config.ini`.
pub fn config_file_path() -> PathBuf {
    tubeline_home().join("config.ini")
}

/// Configuration as loaded from disk.
#[derive(Debug, Clone, Default)]
pub struct ConfigFile {
    pub scheduler: SchedulerConfig,
}

impl ConfigFile {
    /// Load from the default path. A missing file yields defaults.
    pub fn load() -> Result<Self, ConfigError> {
        let path = config_file_path();
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    pub fn load_from(path: &Path) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_file(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        Self::from_ini(&ini)
    }

    pub fn parse(contents: &str) -> Result<Self, ConfigError> {
        let ini = Ini::load_from_str(contents)?;
        Self::from_ini(&ini)
    }

    fn from_ini(ini: &Ini) -> Result<Self, ConfigError> {
        let mut config = SchedulerConfig::default();

        if let Some(section) = ini.section(Some("scheduler")) {
            if let Some(v) = section.get("lock_timeout_ms") {
                config.reposition.lock_timeout =
                    Duration::from_millis(parse_value("scheduler", "lock_timeout_ms", v)?);
            }
            if let Some(v) = section.get("compress_gap_threshold") {
                config.reposition.compress_gap_threshold =
                    parse_value("scheduler", "compress_gap_threshold", v)?;
            }
            if let Some(v) = section.get("rotate_on_completion") {
                config.rotation.rotate_on_completion =
                    parse_bool("scheduler", "rotate_on_completion", v)?;
            }
        }

        if let Some(section) = ini.section(Some("preparation")) {
            if let Some(v) = section.get("questions_per_stitch") {
                let count: usize = parse_value("preparation", "questions_per_stitch", v)?;
                if count == 0 {
                    return Err(invalid("preparation", "questions_per_stitch", v));
                }
                config.preparation.questions_per_stitch = count;
            }
            if let Some(v) = section.get("timeout_secs") {
                config.preparation.timeout =
                    Duration::from_secs(parse_value("preparation", "timeout_secs", v)?);
            }
            if let Some(v) = section.get("process_retention_secs") {
                config.preparation.process_retention =
                    Duration::from_secs(parse_value("preparation", "process_retention_secs", v)?);
            }
            if let Some(v) = section.get("gc_interval_secs") {
                let secs: u64 = parse_value("preparation", "gc_interval_secs", v)?;
                if secs == 0 {
                    return Err(invalid("preparation", "gc_interval_secs", v));
                }
                config.preparation.gc_interval = Duration::from_secs(secs);
            }
        }

        if let Some(section) = ini.section(Some("cache")) {
            if let Some(v) = section.get("max_age_secs") {
                let max_age = Duration::from_secs(parse_value("cache", "max_age_secs", v)?);
                if max_age > MAX_CACHE_MAX_AGE {
                    return Err(invalid("cache", "max_age_secs", v));
                }
                config.cache.max_age = max_age;
            }
            if let Some(v) = section.get("max_entries") {
                config.cache.max_entries = parse_value("cache", "max_entries", v)?;
            }
        }

        if let Some(section) = ini.section(Some("storage")) {
            if let Some(v) = section.get("state_dir") {
                config.storage.state_dir = expand_tilde(v);
            }
        }

        if let Some(section) = ini.section(Some("logging")) {
            if let Some(v) = section.get("level") {
                config.logging.level = v.trim().to_string();
            }
            if let Some(v) = section.get("log_dir") {
                let v = v.trim();
                config.logging.log_dir = if v.is_empty() {
                    None
                } else {
                    Some(expand_tilde(v))
                };
            }
        }

        Ok(Self { scheduler: config })
    }

    /// Render as INI, including every key with its current value.
    pub fn to_ini(&self) -> Ini {
        let c = &self.scheduler;
        let mut ini = Ini::new();
        ini.with_section(Some("scheduler"))
            .set(
                "lock_timeout_ms",
                c.reposition.lock_timeout.as_millis().to_string(),
            )
            .set(
                "compress_gap_threshold",
                c.reposition.compress_gap_threshold.to_string(),
            )
            .set(
                "rotate_on_completion",
                c.rotation.rotate_on_completion.to_string(),
            );
        ini.with_section(Some("preparation"))
            .set(
                "questions_per_stitch",
                c.preparation.questions_per_stitch.to_string(),
            )
            .set("timeout_secs", c.preparation.timeout.as_secs().to_string())
            .set(
                "process_retention_secs",
                c.preparation.process_retention.as_secs().to_string(),
            )
            .set(
                "gc_interval_secs",
                c.preparation.gc_interval.as_secs().to_string(),
            );
        ini.with_section(Some("cache"))
            .set("max_age_secs", c.cache.max_age.as_secs().to_string())
            .set("max_entries", c.cache.max_entries.to_string());
        ini.with_section(Some("storage"))
            .set("state_dir", c.storage.state_dir.display().to_string());
        let log_dir = c
            .logging
            .log_dir
            .as_ref()
            .map(|d| d.display().to_string())
            .unwrap_or_default();
        ini.with_section(Some("logging"))
            .set("level", c.logging.level.clone())
            .set("log_dir", log_dir);
        ini
    }

    /// Write to `path`, creating the parent directory if needed.
    pub fn save_to(&self, path: &Path) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        self.to_ini().write_to_file(path)?;
        Ok(())
    }
}

fn parse_value<T: FromStr>(section: &str, key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| invalid(section, key, value))
}

fn parse_bool(section: &str, key: &str, value: &str) -> Result<bool, ConfigError> {
    match value.trim().to_lowercase().as_str() {
        "true" | "yes" | "on" | "1" => Ok(true),
        "false" | "no" | "off" | "0" => Ok(false),
        _ => Err(invalid(section, key, value)),
    }
}

fn invalid(section: &str, key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        section: section.to_string(),
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn expand_tilde(path: &str) -> PathBuf {
    let path = path.trim();
    match path.strip_prefix("~/") {
        Some(rest) => dirs::home_dir()
            .map(|home| home.join(rest))
            .unwrap_or_else(|| PathBuf::from(path)),
        None => PathBuf::from(path),
    }
}
