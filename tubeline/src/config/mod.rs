//! Scheduler configuration.
//!
//! Runtime settings are grouped per component. Every setting has a
//! `DEFAULT_*` constant and a `with_*` builder so callers can override
//! only what they need. [`ConfigFile`] loads the same settings from an INI
//! file.

mod file;

pub use file::{config_file_path, ConfigError, ConfigFile};

use std::path::PathBuf;
use std::time::Duration;

// ==================== Repositioning Defaults ====================

/// Default time to wait for a tube lock before a write fails.
pub const DEFAULT_LOCK_TIMEOUT: Duration = Duration::from_millis(500);

/// Default gap count at which a tube is compressed after a session.
///
/// Zero disables opportunistic compression.
pub const DEFAULT_COMPRESS_GAP_THRESHOLD: u32 = 200;

// ==================== Rotation Defaults ====================

/// Rotate tubes after every session completed on the LIVE tube.
pub const DEFAULT_ROTATE_ON_COMPLETION: bool = true;

// ==================== Preparation Defaults ====================

/// Default number of questions assembled per stitch.
pub const DEFAULT_QUESTIONS_PER_STITCH: usize = 20;

/// Default upper bound on one preparation.
pub const DEFAULT_PREPARATION_TIMEOUT: Duration = Duration::from_secs(30);

/// Default time a finished process stays queryable if nobody reads it.
pub const DEFAULT_PROCESS_RETENTION: Duration = Duration::from_secs(600);

/// Default capacity of the preparation event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 256;

/// Default interval between process garbage-collection sweeps.
pub const DEFAULT_GC_INTERVAL: Duration = Duration::from_secs(60);

/// Shortest interval the garbage collector will run at.
pub const MIN_GC_INTERVAL: Duration = Duration::from_millis(10);

// ==================== Cache Defaults ====================

/// Default maximum age of ready content before it is considered expired.
pub const DEFAULT_CACHE_MAX_AGE: Duration = Duration::from_secs(3600);

/// Longest max age accepted from a config file (30 days).
pub const MAX_CACHE_MAX_AGE: Duration = Duration::from_secs(30 * 24 * 3600);

/// Default maximum number of cached (user, tube) entries.
pub const DEFAULT_CACHE_MAX_ENTRIES: u64 = 10_000;

// ==================== Logging Defaults ====================

/// Default log filter when `RUST_LOG` is not set.
pub const DEFAULT_LOG_LEVEL: &str = "info";

/// Settings for the repositioning engine and compressor.
#[derive(Debug, Clone)]
pub struct RepositionConfig {
    /// Time to wait for the tube lock. Default: 500ms.
    pub lock_timeout: Duration,
    /// Gap count that triggers compression after a session. Default: 200.
    pub compress_gap_threshold: u32,
}

impl Default for RepositionConfig {
    fn default() -> Self {
        Self {
            lock_timeout: DEFAULT_LOCK_TIMEOUT,
            compress_gap_threshold: DEFAULT_COMPRESS_GAP_THRESHOLD,
        }
    }
}

impl RepositionConfig {
    pub fn with_lock_timeout(mut self, timeout: Duration) -> Self {
        self.lock_timeout = timeout;
        self
    }

    pub fn with_compress_gap_threshold(mut self, threshold: u32) -> Self {
        self.compress_gap_threshold = threshold;
        self
    }
}

/// Settings for the tube rotation controller.
#[derive(Debug, Clone)]
pub struct RotationConfig {
    /// Rotate after each session completed on the LIVE tube. Default: true.
    pub rotate_on_completion: bool,
}

impl Default for RotationConfig {
    fn default() -> Self {
        Self {
            rotate_on_completion: DEFAULT_ROTATE_ON_COMPLETION,
        }
    }
}

impl RotationConfig {
    pub fn with_rotate_on_completion(mut self, enabled: bool) -> Self {
        self.rotate_on_completion = enabled;
        self
    }
}

/// Settings for background content preparation.
#[derive(Debug, Clone)]
pub struct PreparationConfig {
    /// Questions assembled per stitch. Default: 20.
    pub questions_per_stitch: usize,
    /// Upper bound on one preparation. Default: 30s.
    pub timeout: Duration,
    /// How long an unread finished process is kept. Default: 10 minutes.
    pub process_retention: Duration,
    /// Capacity of the broadcast event channel. Default: 256.
    pub event_capacity: usize,
    /// Interval between garbage-collection sweeps. Default: 60s.
    pub gc_interval: Duration,
}

impl Default for PreparationConfig {
    fn default() -> Self {
        Self {
            questions_per_stitch: DEFAULT_QUESTIONS_PER_STITCH,
            timeout: DEFAULT_PREPARATION_TIMEOUT,
            process_retention: DEFAULT_PROCESS_RETENTION,
            event_capacity: DEFAULT_EVENT_CAPACITY,
            gc_interval: DEFAULT_GC_INTERVAL,
        }
    }
}

impl PreparationConfig {
    pub fn with_questions_per_stitch(mut self, count: usize) -> Self {
        self.questions_per_stitch = count;
        self
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn with_process_retention(mut self, retention: Duration) -> Self {
        self.process_retention = retention;
        self
    }

    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }

    pub fn with_gc_interval(mut self, interval: Duration) -> Self {
        self.gc_interval = interval;
        self
    }
}

/// Settings for the ready-content cache.
#[derive(Debug, Clone)]
pub struct CacheConfig {
    /// Age past which content is expired. Default: 1 hour.
    pub max_age: Duration,
    /// Maximum number of cached entries. Default: 10,000.
    pub max_entries: u64,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            max_age: DEFAULT_CACHE_MAX_AGE,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
        }
    }
}

impl CacheConfig {
    pub fn with_max_age(mut self, max_age: Duration) -> Self {
        self.max_age = max_age;
        self
    }

    pub fn with_max_entries(mut self, max_entries: u64) -> Self {
        self.max_entries = max_entries;
        self
    }
}

/// Where state is persisted.
#[derive(Debug, Clone)]
pub struct StorageConfig {
    /// Directory holding per-user state documents.
    pub state_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            state_dir: default_state_dir(),
        }
    }
}

/// Logging output settings.
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Filter directive used when `RUST_LOG` is unset. Default: "info".
    pub level: String,
    /// Directory for daily-rolling log files. `None` logs to stderr only.
    pub log_dir: Option<PathBuf>,
    /// Log file name prefix. Default: "tubeline.log".
    pub file_prefix: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: DEFAULT_LOG_LEVEL.to_string(),
            log_dir: None,
            file_prefix: "tubeline.log".to_string(),
        }
    }
}

impl LoggingConfig {
    pub fn with_level(mut self, level: impl Into<String>) -> Self {
        self.level = level.into();
        self
    }

    pub fn with_log_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.log_dir = Some(dir.into());
        self
    }
}

/// Complete scheduler configuration.
#[derive(Debug, Clone, Default)]
pub struct SchedulerConfig {
    pub reposition: RepositionConfig,
    pub rotation: RotationConfig,
    pub preparation: PreparationConfig,
    pub cache: CacheConfig,
    pub storage: StorageConfig,
    pub logging: LoggingConfig,
}

impl SchedulerConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_reposition(mut self, config: RepositionConfig) -> Self {
        self.reposition = config;
        self
    }

    pub fn with_rotation(mut self, config: RotationConfig) -> Self {
        self.rotation = config;
        self
    }

    pub fn with_preparation(mut self, config: PreparationConfig) -> Self {
        self.preparation = config;
        self
    }

    pub fn with_cache(mut self, config: CacheConfig) -> Self {
        self.cache = config;
        self
    }
}

/// Base directory for tubeline files: `~/.tubeline`.
pub fn tubeline_home() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tubeline")
}

fn default_state_dir() -> PathBuf {
    tubeline_home().join("state")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SchedulerConfig::default();
        assert_eq!(config.preparation.questions_per_stitch, 20);
        assert_eq!(config.reposition.lock_timeout, DEFAULT_LOCK_TIMEOUT);
        assert!(config.rotation.rotate_on_completion);
        assert_eq!(config.cache.max_age, DEFAULT_CACHE_MAX_AGE);
        assert!(config.storage.state_dir.ends_with("state"));
    }

    #[test]
    fn test_builders() {
        let config = SchedulerConfig::new()
            .with_preparation(
                PreparationConfig::default()
                    .with_timeout(Duration::from_secs(2))
                    .with_event_capacity(0),
            )
            .with_rotation(RotationConfig::default().with_rotate_on_completion(false));

        assert_eq!(config.preparation.timeout, Duration::from_secs(2));
        assert_eq!(config.preparation.event_capacity, 1);
        assert!(!config.rotation.rotate_on_completion);
    }
}
