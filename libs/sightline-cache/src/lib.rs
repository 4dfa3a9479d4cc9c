//! Process-wide keyed cache for page payloads
//!
//! **Freshness model**: an entry is fresh while `written_at + ttl` has not
//! elapsed. Plain [`CacheStore::get`] sees fresh entries only; stale values
//! stay reachable through [`CacheStore::get_stale`] so a failed refetch can
//! fall back to the last known good payload.
//!
//! **Lifecycle**: created on first successful fetch, overwritten on every
//! refresh, demoted to stale by invalidation (exact key, key prefix, or
//! dependency tag), physically removed by [`CacheStore::sweep`] once older
//! than a long ceiling.
//!
//! No network knowledge, no business logic; side effects are confined to
//! the internal map.

mod metrics;

pub use metrics::CacheMetrics;

use dashmap::DashMap;
use sightline_schema::ResourceId;
use std::collections::HashSet;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, Instant};
use tracing::debug;

/// Default ceiling after which sweep removes an entry outright.
pub const DEFAULT_SWEEP_CEILING: Duration = Duration::from_secs(3600);

#[derive(Debug, Clone)]
struct StoredEntry<V> {
    value: V,
    written_at: Instant,
    ttl: Duration,
    owner: ResourceId,
    tags: HashSet<String>,
}

impl<V> StoredEntry<V> {
    fn is_fresh(&self) -> bool {
        self.written_at.elapsed() < self.ttl
    }

    /// Demote to stale without touching the value. `get` stops seeing the
    /// entry; `get_stale` keeps serving it until sweep.
    fn expire(&mut self) {
        self.ttl = Duration::ZERO;
    }
}

/// Selector for [`CacheStore::invalidate`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Matcher {
    /// Exact cache key.
    Key(String),
    /// Every key starting with the prefix.
    Prefix(String),
    /// Every entry carrying the dependency tag.
    Tag(String),
}

impl Matcher {
    fn matches<V>(&self, key: &str, entry: &StoredEntry<V>) -> bool {
        match self {
            Matcher::Key(k) => key == k,
            Matcher::Prefix(p) => key.starts_with(p.as_str()),
            Matcher::Tag(t) => entry.tags.contains(t),
        }
    }
}

/// Snapshot of store counters.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub entries: usize,
    pub hits: u64,
    pub misses: u64,
    pub stale_hits: u64,
    pub invalidations: u64,
    pub swept: u64,
}

/// Concurrent keyed store of `(value, freshness, dependency tags)`.
///
/// Explicitly constructed and injected - tests instantiate isolated stores,
/// nothing lives in module globals.
pub struct CacheStore<V> {
    entries: DashMap<String, StoredEntry<V>>,
    sweep_ceiling: Duration,
    hits: AtomicU64,
    misses: AtomicU64,
    stale_hits: AtomicU64,
    invalidations: AtomicU64,
    swept: AtomicU64,
    metrics: CacheMetrics,
}

impl<V: Clone + Send + Sync + 'static> CacheStore<V> {
    pub fn new() -> Self {
        Self::with_ceiling(DEFAULT_SWEEP_CEILING)
    }

    pub fn with_ceiling(sweep_ceiling: Duration) -> Self {
        Self {
            entries: DashMap::new(),
            sweep_ceiling,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            stale_hits: AtomicU64::new(0),
            invalidations: AtomicU64::new(0),
            swept: AtomicU64::new(0),
            metrics: CacheMetrics::new(),
        }
    }

    /// Fresh value for `key`, if any. Stale and absent entries both come
    /// back as `None`; missing keys are not an error.
    pub fn get(&self, key: &str) -> Option<V> {
        match self.entries.get(key) {
            Some(entry) if entry.is_fresh() => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_hit(key);
                debug!(key = %key, "cache hit");
                Some(entry.value.clone())
            }
            Some(_) => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_miss(key);
                debug!(key = %key, "cache stale, treated as miss");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.metrics.record_miss(key);
                debug!(key = %key, "cache miss");
                None
            }
        }
    }

    /// Last written value regardless of freshness, for fallback-on-error.
    pub fn get_stale(&self, key: &str) -> Option<V> {
        self.entries.get(key).map(|entry| {
            self.stale_hits.fetch_add(1, Ordering::Relaxed);
            debug!(key = %key, "cache stale read");
            entry.value.clone()
        })
    }

    /// Unconditional overwrite. Resets the freshness clock.
    pub fn set(
        &self,
        key: impl Into<String>,
        value: V,
        ttl: Duration,
        owner: ResourceId,
        tags: impl IntoIterator<Item = String>,
    ) {
        let key = key.into();
        self.metrics.record_write(&key);
        debug!(key = %key, ttl_secs = ttl.as_secs(), "cache set");

        self.entries.insert(
            key,
            StoredEntry {
                value,
                written_at: Instant::now(),
                ttl,
                owner,
                tags: tags.into_iter().collect(),
            },
        );
    }

    /// Demote every matching entry to stale. Returns how many matched.
    ///
    /// Readers racing an invalidation observe either the old fresh value or
    /// the stale absence, never torn state - each shard mutation is atomic.
    pub fn invalidate(&self, matcher: &Matcher) -> usize {
        let mut matched = 0;

        for mut entry in self.entries.iter_mut() {
            if matcher.matches(entry.key(), entry.value()) {
                entry.value_mut().expire();
                matched += 1;
            }
        }

        if matched > 0 {
            self.invalidations.fetch_add(matched as u64, Ordering::Relaxed);
            self.metrics.record_invalidation(matched);
            debug!(matcher = ?matcher, matched, "cache invalidate");
        }
        matched
    }

    /// Remove entries whose age exceeds the ceiling, independent of their
    /// ttl. Bounds memory; stale fallback values survive only until here.
    pub fn sweep(&self) -> usize {
        let before = self.entries.len();
        let ceiling = self.sweep_ceiling;

        self.entries
            .retain(|_, entry| entry.written_at.elapsed() <= ceiling);

        let removed = before - self.entries.len();
        if removed > 0 {
            self.swept.fetch_add(removed as u64, Ordering::Relaxed);
            self.metrics.record_sweep(removed);
            debug!(removed, "cache sweep");
        }
        removed
    }

    /// Owner of the entry at `key`, if present (fresh or stale).
    pub fn owner_of(&self, key: &str) -> Option<ResourceId> {
        self.entries.get(key).map(|entry| entry.owner.clone())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.entries.len(),
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            stale_hits: self.stale_hits.load(Ordering::Relaxed),
            invalidations: self.invalidations.load(Ordering::Relaxed),
            swept: self.swept.load(Ordering::Relaxed),
        }
    }
}

impl<V: Clone + Send + Sync + 'static> Default for CacheStore<V> {
    fn default() -> Self {
        Self::new()
    }
}
