//! Snapshot Cache
//!
//! Write-through cache of session records in front of SQLite, so a turn does
//! not re-read and re-parse the context snapshot on every message.
//! Entries expire after a TTL; when full, the least recently used entry is
//! evicted.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};

use dashmap::DashMap;
use serde::Serialize;
use tracing::debug;

use super::database::SessionRecord;
use crate::config::CacheConfig;
use crate::types::SessionId;

struct CachedSession {
    record: SessionRecord,
    inserted: Instant,
    last_accessed: Instant,
}

/// Cache statistics
#[derive(Debug, Default, Clone, Copy, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub invalidations: u64,
}

impl CacheStats {
    /// Cache hit rate (0.0 - 1.0)
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

#[derive(Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

pub struct SnapshotCache {
    entries: DashMap<SessionId, CachedSession>,
    max_entries: usize,
    ttl: Duration,
    counters: Counters,
}

impl SnapshotCache {
    pub fn new(max_entries: usize, ttl: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            max_entries: max_entries.max(1),
            ttl,
            counters: Counters::default(),
        }
    }

    pub fn from_config(config: &CacheConfig) -> Self {
        Self::new(config.max_entries, Duration::from_secs(config.ttl_secs))
    }

    pub fn get(&self, id: &SessionId) -> Option<SessionRecord> {
        let expired = match self.entries.get_mut(id) {
            Some(mut entry) if entry.inserted.elapsed() < self.ttl => {
                entry.last_accessed = Instant::now();
                self.counters.hits.fetch_add(1, Ordering::Relaxed);
                return Some(entry.record.clone());
            }
            Some(_) => true,
            None => false,
        };

        if expired {
            self.entries.remove(id);
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
        self.counters.misses.fetch_add(1, Ordering::Relaxed);
        None
    }

    pub fn insert(&self, record: SessionRecord) {
        if !self.entries.contains_key(&record.id) && self.entries.len() >= self.max_entries {
            self.evict_oldest();
        }

        let now = Instant::now();
        self.entries.insert(
            record.id.clone(),
            CachedSession {
                record,
                inserted: now,
                last_accessed: now,
            },
        );
    }

    /// Drop an entry whose backing row may no longer match.
    pub fn invalidate(&self, id: &SessionId) {
        if self.entries.remove(id).is_some() {
            self.counters.invalidations.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
        }
    }

    fn evict_oldest(&self) {
        let oldest = self
            .entries
            .iter()
            .min_by_key(|entry| entry.last_accessed)
            .map(|entry| entry.key().clone());

        if let Some(key) = oldest {
            self.entries.remove(&key);
            self.counters.evictions.fetch_add(1, Ordering::Relaxed);
            debug!(session_id = %key, "Evicted session from cache");
        }
    }
}
