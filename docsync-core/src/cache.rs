//! Bounded key-value cache with per-entry TTL and LRU eviction.
//!
//! Reads are a pure function of `(entry, now)`: an entry is valid iff
//! `now - written_at < ttl`. The cache never returns an expired entry -
//! an expired read is a miss, never a silently stale value. A miss is a
//! normal outcome, not a failure.
//!
//! Time is passed in by the caller so tests never sleep.

use std::collections::HashMap;
use std::hash::Hash;
use std::time::{Duration, Instant};

#[derive(Debug)]
struct Entry<V> {
    value: V,
    written_at: Instant,
    ttl: Duration,
    last_used: u64,
}

impl<V> Entry<V> {
    fn is_valid(&self, now: Instant) -> bool {
        now.saturating_duration_since(self.written_at) < self.ttl
    }
}

/// A TTL cache, optionally capacity-bounded with least-recently-used
/// eviction.
///
/// On a capacity-bounded cache, `get` counts as a use and refreshes
/// recency. Expired entries are dropped lazily on access.
#[derive(Debug)]
pub struct TtlCache<K, V> {
    entries: HashMap<K, Entry<V>>,
    capacity: Option<usize>,
    tick: u64,
}

impl<K: Eq + Hash + Clone, V> TtlCache<K, V> {
    /// Create an unbounded TTL cache.
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
            capacity: None,
            tick: 0,
        }
    }

    /// Create a capacity-bounded cache that evicts the least-recently-used
    /// entry when an insertion would exceed `capacity`.
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            capacity: Some(capacity.max(1)),
            tick: 0,
        }
    }

    /// Look up a live entry. Never blocks, never returns an expired value.
    pub fn get(&mut self, key: &K, now: Instant) -> Option<&V> {
        let valid = match self.entries.get(key) {
            Some(entry) => entry.is_valid(now),
            None => return None,
        };
        if !valid {
            self.entries.remove(key);
            return None;
        }
        self.tick += 1;
        let tick = self.tick;
        let entry = self.entries.get_mut(key)?;
        entry.last_used = tick;
        Some(&entry.value)
    }

    /// Look up an entry ignoring its TTL, without touching recency.
    ///
    /// This is the degraded-fallback read used when a refresh fails and
    /// the last known value is better than nothing. Normal reads go
    /// through [`TtlCache::get`].
    pub fn peek(&self, key: &K) -> Option<&V> {
        self.entries.get(key).map(|entry| &entry.value)
    }

    /// Insert or replace an entry.
    ///
    /// On a capacity-bounded cache, inserting a new key at capacity first
    /// drops expired entries, then evicts the least-recently-used one.
    pub fn put(&mut self, key: K, value: V, ttl: Duration, now: Instant) {
        if let Some(capacity) = self.capacity {
            if !self.entries.contains_key(&key) && self.entries.len() >= capacity {
                self.entries.retain(|_, entry| entry.is_valid(now));
                if self.entries.len() >= capacity {
                    let lru = self
                        .entries
                        .iter()
                        .min_by_key(|(_, entry)| entry.last_used)
                        .map(|(k, _)| k.clone());
                    if let Some(lru) = lru {
                        self.entries.remove(&lru);
                    }
                }
            }
        }
        self.tick += 1;
        self.entries.insert(
            key,
            Entry {
                value,
                written_at: now,
                ttl,
                last_used: self.tick,
            },
        );
    }

    /// Remove an entry, returning its value if present.
    pub fn invalidate(&mut self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|entry| entry.value)
    }

    /// Remove all entries.
    pub fn invalidate_all(&mut self) {
        self.entries.clear();
    }

    /// Iterate over all held values, ignoring expiry and recency.
    ///
    /// Snapshot/persistence use only; normal reads go through
    /// [`TtlCache::get`].
    pub fn values(&self) -> impl Iterator<Item = &V> {
        self.entries.values().map(|entry| &entry.value)
    }

    /// Number of entries currently held (live or not-yet-collected).
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Whether the cache holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

impl<K: Eq + Hash + Clone, V> Default for TtlCache<K, V> {
    fn default() -> Self {
        Self::new()
    }
}
