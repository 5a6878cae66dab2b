//! In-memory TTL cache keyed by query signature.
//!
//! A pure performance layer, never a durability layer: it starts empty on
//! every session and all misses fall through to the record store. The
//! coordinator owns the only instance; nothing else mutates it.

use dispatch_types::Record;
use regex_lite::Regex;
use std::collections::HashMap;
use std::time::{Duration, Instant};
use tracing::debug;

/// Which cache entries an invalidation removes.
#[derive(Clone, Debug)]
pub enum InvalidatePattern {
    /// Every key starting with the prefix. Write-path invalidation uses the
    /// table's key prefix, which covers all filters over that table.
    Prefix(String),
    Regex(Regex),
}

impl InvalidatePattern {
    fn matches(&self, key: &str) -> bool {
        match self {
            Self::Prefix(prefix) => key.starts_with(prefix.as_str()),
            Self::Regex(regex) => regex.is_match(key),
        }
    }
}

/// Hit/miss counters for observability.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    pub sets: u64,
}

impl CacheStats {
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

struct CacheEntry {
    records: Vec<Record>,
    inserted_at: Instant,
    ttl: Duration,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        self.inserted_at.elapsed() >= self.ttl
    }
}

/// TTL cache of query results. Expiry is lazy: an expired entry is evicted
/// on the access that observes it.
pub struct Cache {
    entries: HashMap<String, CacheEntry>,
    default_ttl: Duration,
    stats: CacheStats,
}

impl Cache {
    pub fn new(default_ttl: Duration) -> Self {
        Self {
            entries: HashMap::new(),
            default_ttl,
            stats: CacheStats::default(),
        }
    }

    /// Returns the cached value, or `None` on miss or expiry.
    pub fn get(&mut self, key: &str) -> Option<Vec<Record>> {
        let expired = self.entries.get(key).is_some_and(|e| e.is_expired());
        if expired {
            self.entries.remove(key);
        }
        match self.entries.get(key) {
            Some(entry) => {
                self.stats.hits += 1;
                Some(entry.records.clone())
            }
            None => {
                self.stats.misses += 1;
                None
            }
        }
    }

    /// Returns the cached value even if expired, without evicting it. Used
    /// for the offline fallback, where the caller flags the result stale.
    pub fn get_stale(&self, key: &str) -> Option<Vec<Record>> {
        self.entries.get(key).map(|e| e.records.clone())
    }

    /// Caches a query result, with an optional per-entry TTL override.
    pub fn set(&mut self, key: String, records: Vec<Record>, ttl: Option<Duration>) {
        self.stats.sets += 1;
        self.entries.insert(
            key,
            CacheEntry {
                records,
                inserted_at: Instant::now(),
                ttl: ttl.unwrap_or(self.default_ttl),
            },
        );
    }

    /// Removes every entry matching the pattern. Returns how many went.
    pub fn invalidate(&mut self, pattern: &InvalidatePattern) -> usize {
        let before = self.entries.len();
        self.entries.retain(|key, _| !pattern.matches(key));
        let removed = before - self.entries.len();
        if removed > 0 {
            debug!("invalidated {removed} cache entries");
        }
        removed
    }

    /// Sweeps expired entries. Optional; long-lived sessions can call it
    /// periodically, everyone else relies on lazy expiry.
    pub fn clear_expired(&mut self) -> usize {
        let before = self.entries.len();
        self.entries.retain(|_, entry| !entry.is_expired());
        before - self.entries.len()
    }

    pub fn stats(&self) -> CacheStats {
        self.stats
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
