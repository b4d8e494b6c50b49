//! Two-deadline TTL cache.
//!
//! Each entry carries a `fresh_until` and a later `stale_until`. Lookups
//! classify the entry as fresh, stale or missing against the injected clock.
//! Storage is a `DashMap`, so locking is sharded by key and a slow writer on
//! one shard never blocks readers on another.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use log::debug;

use crate::clock::Clock;

/// An immutable cached snapshot.
///
/// Replacing a value always creates a new entry; readers holding the old
/// `Arc` keep a consistent view.
#[derive(Debug)]
pub struct CacheEntry<V> {
    pub key: String,
    pub value: V,
    pub fetched_at: Instant,
    /// Wall-clock time of the fetch, for "as of" reporting.
    pub fetched_at_utc: DateTime<Utc>,
    pub fresh_until: Instant,
    pub stale_until: Instant,
    /// Insertion order, breaks ties between entries fetched at the same instant.
    seq: u64,
}

impl<V> CacheEntry<V> {
    pub fn is_fresh_at(&self, now: Instant) -> bool {
        now < self.fresh_until
    }

    pub fn is_dead_at(&self, now: Instant) -> bool {
        now >= self.stale_until
    }
}

/// Result of a cache lookup.
#[derive(Debug)]
pub enum CacheLookup<V> {
    /// Within the primary TTL.
    Fresh(Arc<CacheEntry<V>>),
    /// Past the primary TTL but inside the stale window.
    Stale(Arc<CacheEntry<V>>),
    /// Absent, or past the stale window.
    Miss,
}

impl<V> CacheLookup<V> {
    pub fn is_fresh(&self) -> bool {
        matches!(self, Self::Fresh(_))
    }

    pub fn is_stale(&self) -> bool {
        matches!(self, Self::Stale(_))
    }

    pub fn is_miss(&self) -> bool {
        matches!(self, Self::Miss)
    }

    /// The entry behind a fresh or stale hit.
    pub fn entry(&self) -> Option<&Arc<CacheEntry<V>>> {
        match self {
            Self::Fresh(entry) | Self::Stale(entry) => Some(entry),
            Self::Miss => None,
        }
    }
}

/// Concurrent key → value cache with fresh and stale deadlines.
pub struct TtlCache<V> {
    entries: DashMap<String, Arc<CacheEntry<V>>>,
    clock: Arc<dyn Clock>,
    /// Upper bound on stored entries; `None` means unbounded.
    max_entries: Option<usize>,
    next_seq: AtomicU64,
}

impl<V> TtlCache<V> {
    /// Create an unbounded cache.
    pub fn new(clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            clock,
            max_entries: None,
            next_seq: AtomicU64::new(0),
        }
    }

    /// Create a cache holding at most `max_entries` entries.
    ///
    /// When a put overflows the bound, dead entries are dropped first and then
    /// the oldest fetches are evicted.
    pub fn with_capacity_limit(clock: Arc<dyn Clock>, max_entries: usize) -> Self {
        Self {
            max_entries: Some(max_entries.max(1)),
            ..Self::new(clock)
        }
    }

    /// Look up `key` and classify it against the current time.
    ///
    /// A dead entry is removed on the way out, unless a concurrent put has
    /// already replaced it.
    pub fn get(&self, key: &str) -> CacheLookup<V> {
        let now = self.clock.now();
        let entry = match self.entries.get(key) {
            Some(slot) => Arc::clone(slot.value()),
            None => return CacheLookup::Miss,
        };

        if entry.is_fresh_at(now) {
            CacheLookup::Fresh(entry)
        } else if !entry.is_dead_at(now) {
            CacheLookup::Stale(entry)
        } else {
            self.entries
                .remove_if(key, |_, current| Arc::ptr_eq(current, &entry));
            debug!("Cache: evicted dead entry '{}'", key);
            CacheLookup::Miss
        }
    }

    /// Return the stored entry without classifying or evicting it.
    pub fn peek(&self, key: &str) -> Option<Arc<CacheEntry<V>>> {
        self.entries.get(key).map(|slot| Arc::clone(slot.value()))
    }

    /// Store a new snapshot for `key`, replacing any previous entry.
    pub fn put(
        &self,
        key: impl Into<String>,
        value: V,
        fresh_ttl: Duration,
        stale_window: Duration,
    ) -> Arc<CacheEntry<V>> {
        let key = key.into();
        let now = self.clock.now();
        let fresh_until = now + fresh_ttl;
        let entry = Arc::new(CacheEntry {
            key: key.clone(),
            value,
            fetched_at: now,
            fetched_at_utc: self.clock.wall_time(),
            fresh_until,
            stale_until: fresh_until + stale_window,
            seq: self.next_seq.fetch_add(1, Ordering::Relaxed),
        });

        self.entries.insert(key, Arc::clone(&entry));

        if let Some(max_entries) = self.max_entries {
            if self.entries.len() > max_entries {
                self.evict_overflow(max_entries);
            }
        }

        entry
    }

    /// Remove `key`. Returns true if an entry was present.
    pub fn invalidate(&self, key: &str) -> bool {
        self.entries.remove(key).is_some()
    }

    pub fn clear(&self) {
        self.entries.clear();
    }

    /// Drop every entry past its stale window. Returns how many were removed.
    pub fn purge_expired(&self) -> usize {
        let now = self.clock.now();
        let mut removed = 0;
        self.entries.retain(|_, entry| {
            let keep = !entry.is_dead_at(now);
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    fn evict_overflow(&self, max_entries: usize) {
        let purged = self.purge_expired();
        if purged > 0 {
            debug!("Cache: purged {} dead entries on overflow", purged);
        }

        while self.entries.len() > max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|slot| (slot.fetched_at, slot.seq))
                .map(|slot| slot.key().clone());

            match oldest {
                Some(key) => {
                    debug!("Cache: capacity reached, evicting '{}'", key);
                    self.entries.remove(&key);
                }
                None => break,
            }
        }
    }
}
