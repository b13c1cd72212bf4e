use std::time::{Duration, Instant};

use dashmap::DashMap;

/// Bounded, TTL-expiring dedup cache keyed by `idempotency_key`.
///
/// A `DashMap` of key to last-seen timestamp, with a capacity-triggered eviction pass
/// in addition to TTL expiry. Eviction under capacity pressure removes the globally
/// oldest entries first, approximating LRU via a full linear scan rather than an
/// access-order list — acceptable since the scan only runs when capacity is exceeded.
pub struct DedupCache {
    entries: DashMap<String, Instant>,
    ttl: Duration,
    capacity: usize,
}

impl DedupCache {
    pub fn new(ttl: Duration, capacity: usize) -> Self {
        Self {
            entries: DashMap::with_capacity(capacity.min(1_000_000)),
            ttl,
            capacity,
        }
    }

    /// Returns `true` if `key` was already present and not expired (a dedup hit);
    /// otherwise inserts `key` with the current timestamp and returns `false`.
    pub fn check_and_insert(&self, key: &str, now: Instant) -> bool {
        if let Some(entry) = self.entries.get(key) {
            if now.saturating_duration_since(*entry) < self.ttl {
                return true;
            }
        }
        self.entries.insert(key.to_string(), now);
        if self.entries.len() > self.capacity {
            self.evict_oldest(now);
        }
        false
    }

    /// Lazy expiration sweep, called from the periodic eviction task and opportunistically
    /// from capacity pressure.
    pub fn sweep_expired(&self, now: Instant) {
        self.entries.retain(|_, ts| now.saturating_duration_since(*ts) < self.ttl);
    }

    fn evict_oldest(&self, now: Instant) {
        self.sweep_expired(now);
        while self.entries.len() > self.capacity {
            let Some(oldest_key) = self
                .entries
                .iter()
                .min_by_key(|e| *e.value())
                .map(|e| e.key().clone())
            else {
                break;
            };
            self.entries.remove(&oldest_key);
        }
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
