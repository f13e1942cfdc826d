//! Ready-content cache.
//!
//! Holds the assembled questions for each (user, tube) so the next session
//! starts without waiting on generation. Entries are written only by the
//! preparation coordinator and removed only by explicit invalidation or
//! memory pressure.
//!
//! Freshness is judged against the configured max age on every read.
//! Expired entries are kept a while longer (up to
//! [`STALE_RETENTION_FACTOR`] times the max age, and never less than
//! [`MIN_STALE_RETENTION`]) so callers that would
//! rather serve stale content than nothing can still reach them through
//! [`ContentReadyCache::get_best_available`].

mod content;

pub use content::ReadyContent;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use moka::sync::Cache;
use tracing::debug;

use crate::config::CacheConfig;
use crate::error::{Result, SchedulerError};
use crate::model::{StitchId, TubeId, UserId};
use crate::preparation::ProcessId;

/// How many max-ages an expired entry survives before it is reclaimed.
pub const STALE_RETENTION_FACTOR: u32 = 4;

/// Shortest time any entry is kept before reclamation.
pub const MIN_STALE_RETENTION: Duration = Duration::from_secs(60);

/// Longest time any entry is kept before reclamation (one year).
pub const MAX_STALE_RETENTION: Duration = Duration::from_secs(365 * 24 * 3600);

type CacheKey = (UserId, TubeId);

/// Why an entry was removed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InvalidationReason {
    /// The learner's boundary level on the stitch changed.
    BoundaryLevelChanged,
    /// The entry outlived the configured max age.
    MaxAgeExceeded,
    /// An operator or caller asked for fresh content.
    ForcedRefresh,
}

impl fmt::Display for InvalidationReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            InvalidationReason::BoundaryLevelChanged => "boundary level changed",
            InvalidationReason::MaxAgeExceeded => "max age exceeded",
            InvalidationReason::ForcedRefresh => "forced refresh",
        };
        f.write_str(name)
    }
}

/// Point-in-time cache counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub expired: u64,
    pub invalidations: u64,
    pub entries: u64,
}

impl CacheStats {
    /// Fraction of lookups served fresh content.
    pub fn hit_rate(&self) -> f64 {
        let lookups = self.hits + self.misses + self.expired;
        if lookups == 0 {
            0.0
        } else {
            self.hits as f64 / lookups as f64
        }
    }
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    expired: AtomicU64,
    invalidations: AtomicU64,
}

/// How long moka keeps an entry for a given max age.
fn retention(max_age: Duration) -> Duration {
    max_age
        .saturating_mul(STALE_RETENTION_FACTOR)
        .clamp(MIN_STALE_RETENTION, MAX_STALE_RETENTION)
}

/// Per-(user, tube) store of assembled content.
pub struct ContentReadyCache {
    entries: Cache<CacheKey, Arc<ReadyContent>>,
    pending: DashMap<CacheKey, ProcessId>,
    max_age: Duration,
    counters: Counters,
}

impl ContentReadyCache {
    pub fn new(config: &CacheConfig) -> Self {
        let entries = Cache::builder()
            .max_capacity(config.max_entries)
            .time_to_live(retention(config.max_age))
            .build();
        Self {
            entries,
            pending: DashMap::new(),
            max_age: config.max_age,
            counters: Counters::default(),
        }
    }

    pub fn max_age(&self) -> Duration {
        self.max_age
    }

    /// Fresh content for a tube.
    ///
    /// Fails with `STITCH_NOT_READY` while a preparation is in flight and no
    /// fresh entry exists, `CACHE_EXPIRED` for an entry past max age, and
    /// `CACHE_MISS` otherwise.
    pub fn get_ready_stitch(&self, user: &UserId, tube: TubeId) -> Result<Arc<ReadyContent>> {
        let key = (user.clone(), tube);
        let entry = self.entries.get(&key);

        if let Some(content) = &entry {
            if content.age() <= self.max_age {
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Ok(Arc::clone(content));
            }
        }

        if let Some(process_id) = self.pending.get(&key).map(|p| *p) {
            self.counters.misses.fetch_add(1, Ordering::Relaxed);
            return Err(SchedulerError::StitchNotReady {
                user: user.clone(),
                tube,
                process_id,
            });
        }

        match entry {
            Some(content) => {
                self.counters.expired.fetch_add(1, Ordering::Relaxed);
                Err(SchedulerError::CacheExpired {
                    user: user.clone(),
                    tube,
                    age: content.age(),
                })
            }
            None => {
                self.counters.misses.fetch_add(1, Ordering::Relaxed);
                Err(SchedulerError::CacheMiss {
                    user: user.clone(),
                    tube,
                })
            }
        }
    }

    /// Whatever content is held for a tube, regardless of age.
    pub fn get_best_available(&self, user: &UserId, tube: TubeId) -> Option<Arc<ReadyContent>> {
        self.entries.get(&(user.clone(), tube))
    }

    /// Store content, replacing any previous entry for its (user, tube).
    pub(crate) fn insert(&self, content: ReadyContent) -> Arc<ReadyContent> {
        let content = Arc::new(content);
        self.entries
            .insert((content.user.clone(), content.tube), Arc::clone(&content));
        content
    }

    /// Every entry held for a learner, fresh or stale, in tube order.
    pub fn export(&self, user: &UserId) -> Vec<Arc<ReadyContent>> {
        TubeId::ALL
            .into_iter()
            .filter_map(|tube| self.get_best_available(user, tube))
            .collect()
    }

    /// Put back content saved by [`export`](Self::export).
    ///
    /// Age is taken from the content's `prepared_at`. Content too old to
    /// be retained, or already superseded by a newer entry, is dropped.
    /// Returns true if the content was restored.
    pub fn restore(&self, content: ReadyContent) -> bool {
        let Some(content) = content.with_age_from_timestamp() else {
            return false;
        };
        if content.age() >= retention(self.max_age) {
            return false;
        }
        let key = (content.user.clone(), content.tube);
        if let Some(current) = self.entries.get(&key) {
            if current.prepared_at >= content.prepared_at {
                return false;
            }
        }
        debug!(
            user = %content.user,
            tube = %content.tube,
            stitch = %content.stitch_id,
            age_secs = content.age().as_secs(),
            "Ready content restored"
        );
        self.entries.insert(key, Arc::new(content));
        true
    }

    /// Remove the entry for a tube. Returns true if one was removed.
    pub fn invalidate(&self, user: &UserId, tube: TubeId, reason: InvalidationReason) -> bool {
        let removed = self.entries.remove(&(user.clone(), tube)).is_some();
        if removed {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
            debug!(user = %user, tube = %tube, reason = %reason, "Ready content invalidated");
        }
        removed
    }

    /// Remove the entry for a tube only if it was built for `stitch_id`.
    pub fn invalidate_stitch(
        &self,
        user: &UserId,
        tube: TubeId,
        stitch_id: &StitchId,
        reason: InvalidationReason,
    ) -> bool {
        match self.get_best_available(user, tube) {
            Some(content) if &content.stitch_id == stitch_id => {
                self.invalidate(user, tube, reason)
            }
            _ => false,
        }
    }

    /// Remove every entry past max age.
    pub fn purge_expired(&self) -> usize {
        let expired: Vec<CacheKey> = self
            .entries
            .iter()
            .filter(|(_, content)| content.age() > self.max_age)
            .map(|(key, _)| (*key).clone())
            .collect();
        expired
            .iter()
            .filter(|(user, tube)| self.invalidate(user, *tube, InvalidationReason::MaxAgeExceeded))
            .count()
    }

    /// The process currently preparing content for a tube, if any.
    pub fn pending_process(&self, user: &UserId, tube: TubeId) -> Option<ProcessId> {
        self.pending.get(&(user.clone(), tube)).map(|p| *p)
    }

    pub(crate) fn mark_pending(&self, user: &UserId, tube: TubeId, process_id: ProcessId) {
        self.pending.insert((user.clone(), tube), process_id);
    }

    pub(crate) fn clear_pending(&self, user: &UserId, tube: TubeId) {
        self.pending.remove(&(user.clone(), tube));
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            expired: self.counters.expired.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            entries: self.entries.entry_count(),
        }
    }
}

impl fmt::Debug for ContentReadyCache {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ContentReadyCache")
            .field("max_age", &self.max_age)
            .field("pending", &self.pending.len())
            .field("stats", &self.stats())
            .finish()
    }
}
