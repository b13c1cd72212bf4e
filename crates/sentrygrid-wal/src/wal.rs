//! Durable, idempotent per-agent delivery queue.
//!
//! Backed by `sled`, an embedded KV store. `events` holds live (Pending/InFlight)
//! records keyed by `idempotency_key`; `dead_letter` holds records moved there by
//! `mark_invalid` and is never drained. An in-memory FIFO index, ordered by
//! `created_ns`, tracks delivery order — sled itself only orders by raw key bytes, so
//! this index is rebuilt from the tree on open rather than relied on as the source of
//! truth.

use std::collections::{BTreeSet, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Mutex;
use std::time::{Duration, Instant};

use dashmap::DashMap;
use tracing::{info, warn};

use crate::error::WalError;
use crate::record::{RecordState, WalRecord};

#[derive(Debug, Clone, Copy)]
pub struct WalConfig {
    /// Backlog cap in bytes on disk (`wal_max_bytes`, default 200 MB).
    pub max_bytes: u64,
    /// Backlog cap in record count (`wal_max_records`, default 100_000).
    pub max_records: usize,
    /// Re-append dedup window (`wal_dedup_window_s`, default 300s).
    pub dedup_window: Duration,
    /// If true, fsync on every append; if false, rely on sled's own batched background
    /// flush (looser durability, higher throughput).
    pub fsync_every_append: bool,
}

impl Default for WalConfig {
    fn default() -> Self {
        Self {
            max_bytes: 200 * 1024 * 1024,
            max_records: 100_000,
            dedup_window: Duration::from_secs(300),
            fsync_every_append: true,
        }
    }
}

/// Whether an `append` call actually enqueued a new record or observed an idempotent
/// re-submission of a key already pending.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppendOutcome {
    Enqueued,
    DuplicateNoop,
}

struct PendingIndex {
    /// `(created_ns, idempotency_key)` so the smallest element is the oldest PENDING
    /// record, giving O(log n) FIFO drain.
    by_age: BTreeSet<(u64, String)>,
}

pub struct Wal {
    db: sled::Db,
    events: sled::Tree,
    dead_letter: sled::Tree,
    config: WalConfig,
    pending: Mutex<PendingIndex>,
    in_flight: Mutex<HashSet<String>>,
    recent_keys: DashMap<String, Instant>,
    appended_total: AtomicU64,
    dropped_total: AtomicU64,
}

impl Wal {
    pub fn open(path: impl AsRef<Path>, config: WalConfig) -> Result<Self, WalError> {
        let db = sled::open(path)?;
        let events = db.open_tree("events")?;
        let dead_letter = db.open_tree("dead_letter")?;

        let mut by_age = BTreeSet::new();
        // Crash recovery: any IN_FLIGHT record found on open reverts to PENDING, since
        // we have no way to know whether its delivery actually reached the bus.
        for item in events.iter() {
            let (key_bytes, value_bytes) = item?;
            let key = String::from_utf8_lossy(&key_bytes).to_string();
            let mut record: WalRecord = serde_json::from_slice(&value_bytes)?;
            match record.state {
                RecordState::Pending => {}
                RecordState::InFlight => {
                    warn!(key = %key, "wal recovery: reverting IN_FLIGHT record to PENDING");
                    record.state = RecordState::Pending;
                    events.insert(key_bytes.clone(), serde_json::to_vec(&record)?)?;
                }
                RecordState::Delivered => {
                    // Should have been compacted already; drop it defensively.
                    events.remove(&key_bytes)?;
                    continue;
                }
            }
            by_age.insert((record.created_ns, key));
        }
        if config.fsync_every_append {
            db.flush()?;
        }

        Ok(Self {
            db,
            events,
            dead_letter,
            config,
            pending: Mutex::new(PendingIndex { by_age }),
            in_flight: Mutex::new(HashSet::new()),
            recent_keys: DashMap::new(),
            appended_total: AtomicU64::new(0),
            dropped_total: AtomicU64::new(0),
        })
    }

    /// Appends a new envelope. Re-appending an `idempotency_key` already known within the
    /// dedup window (or still present in the store) is a silent, idempotent success.
    pub fn append(
        &self,
        idempotency_key: &str,
        serialized_envelope: Vec<u8>,
        created_ns: u64,
        now: Instant,
    ) -> Result<AppendOutcome, WalError> {
        if let Some(first_seen) = self.recent_keys.get(idempotency_key) {
            if now.saturating_duration_since(*first_seen) < self.config.dedup_window {
                return Ok(AppendOutcome::DuplicateNoop);
            }
        }
        if self.events.contains_key(idempotency_key.as_bytes())? {
            self.recent_keys.insert(idempotency_key.to_string(), now);
            return Ok(AppendOutcome::DuplicateNoop);
        }

        self.enforce_backlog_cap()?;

        let record = WalRecord {
            idempotency_key: idempotency_key.to_string(),
            serialized_envelope,
            retry_count: 0,
            last_attempt_ns: 0,
            created_ns,
            state: RecordState::Pending,
        };
        self.events
            .insert(idempotency_key.as_bytes(), serde_json::to_vec(&record)?)?;
        if self.config.fsync_every_append {
            self.db.flush()?;
        }
        self.pending
            .lock()
            .unwrap()
            .by_age
            .insert((created_ns, idempotency_key.to_string()));
        self.recent_keys.insert(idempotency_key.to_string(), now);
        self.appended_total.fetch_add(1, Ordering::Relaxed);
        Ok(AppendOutcome::Enqueued)
    }

    fn enforce_backlog_cap(&self) -> Result<(), WalError> {
        let over_records = self.pending.lock().unwrap().by_age.len() >= self.config.max_records;
        let over_bytes = self.size_bytes() >= self.config.max_bytes;
        if over_records || over_bytes {
            let oldest = {
                let mut pending = self.pending.lock().unwrap();
                pending.by_age.iter().next().cloned()
            };
            if let Some((created_ns, key)) = oldest {
                self.pending.lock().unwrap().by_age.remove(&(created_ns, key.clone()));
                self.events.remove(key.as_bytes())?;
                self.dropped_total.fetch_add(1, Ordering::Relaxed);
                warn!(key = %key, "wal backlog cap exceeded, evicting oldest pending record");
            }
        }
        Ok(())
    }

    /// Returns up to `batch_size` PENDING records in FIFO order of `created_ns`,
    /// atomically marking them IN_FLIGHT.
    pub fn drain(&self, batch_size: usize) -> Result<Vec<WalRecord>, WalError> {
        let keys: Vec<(u64, String)> = {
            let mut pending = self.pending.lock().unwrap();
            let taken: Vec<(u64, String)> = pending.by_age.iter().take(batch_size).cloned().collect();
            for k in &taken {
                pending.by_age.remove(k);
            }
            taken
        };

        let mut out = Vec::with_capacity(keys.len());
        let mut in_flight = self.in_flight.lock().unwrap();
        for (_, key) in keys {
            let Some(bytes) = self.events.get(key.as_bytes())? else {
                continue;
            };
            let mut record: WalRecord = serde_json::from_slice(&bytes)?;
            record.state = RecordState::InFlight;
            self.events
                .insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
            in_flight.insert(key.clone());
            out.push(record);
        }
        Ok(out)
    }

    /// Transitions records to DELIVERED, compacting them immediately.
    pub fn mark_delivered(&self, keys: &[String]) -> Result<(), WalError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        for key in keys {
            in_flight.remove(key);
            self.events.remove(key.as_bytes())?;
        }
        Ok(())
    }

    /// Transitions back to PENDING, incrementing `retry_count`.
    pub fn mark_retry(&self, keys: &[String], now_ns: u64) -> Result<(), WalError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        for key in keys {
            in_flight.remove(key);
            let Some(bytes) = self.events.get(key.as_bytes())? else {
                continue;
            };
            let mut record: WalRecord = serde_json::from_slice(&bytes)?;
            record.state = RecordState::Pending;
            record.retry_count += 1;
            record.last_attempt_ns = now_ns;
            let created_ns = record.created_ns;
            self.events
                .insert(key.as_bytes(), serde_json::to_vec(&record)?)?;
            self.pending
                .lock()
                .unwrap()
                .by_age
                .insert((created_ns, key.clone()));
        }
        Ok(())
    }

    /// Moves records to the local dead-letter bucket; never retried.
    pub fn mark_invalid(&self, keys: &[String]) -> Result<(), WalError> {
        let mut in_flight = self.in_flight.lock().unwrap();
        for key in keys {
            in_flight.remove(key);
            if let Some(bytes) = self.events.get(key.as_bytes())? {
                self.dead_letter.insert(key.as_bytes(), bytes)?;
                self.events.remove(key.as_bytes())?;
            }
        }
        Ok(())
    }

    pub fn pending_count(&self) -> usize {
        self.pending.lock().unwrap().by_age.len()
    }

    pub fn in_flight_count(&self) -> usize {
        self.in_flight.lock().unwrap().len()
    }

    pub fn dead_letter_count(&self) -> usize {
        self.dead_letter.len()
    }

    pub fn size_bytes(&self) -> u64 {
        self.db.size_on_disk().unwrap_or(0)
    }

    pub fn appended_total(&self) -> u64 {
        self.appended_total.load(Ordering::Relaxed)
    }

    pub fn dropped_total(&self) -> u64 {
        self.dropped_total.load(Ordering::Relaxed)
    }

    /// Forces all pending writes to disk. Called on shutdown; a no-op safety net when
    /// `fsync_every_append` already makes every write durable immediately.
    pub fn flush(&self) -> Result<(), WalError> {
        self.db.flush()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn open_wal(config: WalConfig) -> (Wal, tempfile::TempDir) {
        let dir = tempfile::tempdir().unwrap();
        let wal = Wal::open(dir.path(), config).unwrap();
        (wal, dir)
    }

    #[test]
    fn append_is_idempotent_for_same_key() {
        let (wal, _dir) = open_wal(WalConfig::default());
        let now = Instant::now();
        let out1 = wal.append("k1", b"envelope-bytes".to_vec(), 1, now).unwrap();
        let out2 = wal.append("k1", b"envelope-bytes".to_vec(), 1, now).unwrap();
        assert_eq!(out1, AppendOutcome::Enqueued);
        assert_eq!(out2, AppendOutcome::DuplicateNoop);
        assert_eq!(wal.pending_count(), 1);
    }

    #[test]
    fn drain_returns_fifo_order_and_marks_in_flight() {
        let (wal, _dir) = open_wal(WalConfig::default());
        let now = Instant::now();
        wal.append("k1", b"a".to_vec(), 100, now).unwrap();
        wal.append("k2", b"b".to_vec(), 50, now).unwrap();
        wal.append("k3", b"c".to_vec(), 200, now).unwrap();

        let batch = wal.drain(2).unwrap();
        let keys: Vec<_> = batch.iter().map(|r| r.idempotency_key.clone()).collect();
        assert_eq!(keys, vec!["k2".to_string(), "k1".to_string()]);
        assert_eq!(wal.in_flight_count(), 2);
        assert_eq!(wal.pending_count(), 1);
    }

    #[test]
    fn mark_delivered_removes_record_permanently() {
        let (wal, _dir) = open_wal(WalConfig::default());
        let now = Instant::now();
        wal.append("k1", b"a".to_vec(), 1, now).unwrap();
        let batch = wal.drain(10).unwrap();
        let keys: Vec<String> = batch.into_iter().map(|r| r.idempotency_key).collect();
        wal.mark_delivered(&keys).unwrap();
        assert_eq!(wal.pending_count(), 0);
        assert_eq!(wal.in_flight_count(), 0);

        // Re-appending after delivery (outside the dedup window, simulated by a later
        // `now`) enqueues a fresh record rather than resurrecting the delivered one.
        let later = now + Duration::from_secs(301);
        let out = wal.append("k1", b"a".to_vec(), 2, later).unwrap();
        assert_eq!(out, AppendOutcome::Enqueued);
    }

    #[test]
    fn mark_retry_increments_retry_count_and_requeues() {
        let (wal, _dir) = open_wal(WalConfig::default());
        let now = Instant::now();
        wal.append("k1", b"a".to_vec(), 1, now).unwrap();
        let batch = wal.drain(10).unwrap();
        let keys: Vec<String> = batch.into_iter().map(|r| r.idempotency_key).collect();
        wal.mark_retry(&keys, 999).unwrap();
        assert_eq!(wal.pending_count(), 1);
        let batch2 = wal.drain(10).unwrap();
        assert_eq!(batch2[0].retry_count, 1);
        assert_eq!(batch2[0].last_attempt_ns, 999);
    }

    #[test]
    fn mark_invalid_moves_to_dead_letter_and_is_never_redrained() {
        let (wal, _dir) = open_wal(WalConfig::default());
        let now = Instant::now();
        wal.append("k1", b"a".to_vec(), 1, now).unwrap();
        let batch = wal.drain(10).unwrap();
        let keys: Vec<String> = batch.into_iter().map(|r| r.idempotency_key).collect();
        wal.mark_invalid(&keys).unwrap();
        assert_eq!(wal.pending_count(), 0);
        assert_eq!(wal.dead_letter_count(), 1);
        assert!(wal.drain(10).unwrap().is_empty());
    }

    #[test]
    fn crash_recovery_reverts_in_flight_to_pending() {
        let dir = tempfile::tempdir().unwrap();
        {
            let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();
            let now = Instant::now();
            for i in 0..10u64 {
                wal.append(&format!("k{i}"), vec![i as u8], i, now).unwrap();
            }
            // Drain 5 into IN_FLIGHT and "crash" without acking.
            let _in_flight = wal.drain(5).unwrap();
        }
        let wal = Wal::open(dir.path(), WalConfig::default()).unwrap();
        assert_eq!(wal.pending_count(), 10);
        assert_eq!(wal.in_flight_count(), 0);
    }

    #[test]
    fn backlog_cap_evicts_oldest_pending_and_counts_drop() {
        let config = WalConfig {
            max_records: 2,
            ..WalConfig::default()
        };
        let (wal, _dir) = open_wal(config);
        let now = Instant::now();
        wal.append("k1", b"a".to_vec(), 1, now).unwrap();
        wal.append("k2", b"a".to_vec(), 2, now).unwrap();
        wal.append("k3", b"a".to_vec(), 3, now).unwrap();
        assert_eq!(wal.dropped_total(), 1);
        assert_eq!(wal.pending_count(), 2);
        let batch = wal.drain(10).unwrap();
        let keys: Vec<_> = batch.iter().map(|r| r.idempotency_key.as_str()).collect();
        assert!(!keys.contains(&"k1"), "oldest record should have been evicted");
    }
}
