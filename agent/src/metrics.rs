use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Counters and gauges for the Agent, exposed as a JSON snapshot at `/metrics`.
pub struct Metrics {
    events_collected: Mutex<HashMap<String, u64>>,
    events_rejected: Mutex<HashMap<(String, String), u64>>,
    publish_attempts: AtomicU64,
    publish_ok: AtomicU64,
    publish_retry: Mutex<HashMap<String, u64>>,
    publish_invalid: AtomicU64,
    publish_unauthorized: AtomicU64,
    pub breaker_state: AtomicI64,
    send_latency_sum_us: AtomicU64,
    send_latency_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            events_collected: Mutex::new(HashMap::new()),
            events_rejected: Mutex::new(HashMap::new()),
            publish_attempts: AtomicU64::new(0),
            publish_ok: AtomicU64::new(0),
            publish_retry: Mutex::new(HashMap::new()),
            publish_invalid: AtomicU64::new(0),
            publish_unauthorized: AtomicU64::new(0),
            breaker_state: AtomicI64::new(0),
            send_latency_sum_us: AtomicU64::new(0),
            send_latency_count: AtomicU64::new(0),
        }
    }

    pub fn record_collected(&self, probe: &str, n: u64) {
        *self.events_collected.lock().unwrap().entry(probe.to_string()).or_insert(0) += n;
    }

    pub fn record_rejected(&self, probe: &str, reason: &str) {
        *self
            .events_rejected
            .lock()
            .unwrap()
            .entry((probe.to_string(), reason.to_string()))
            .or_insert(0) += 1;
    }

    pub fn record_publish_attempt(&self) {
        self.publish_attempts.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_ok(&self) {
        self.publish_ok.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_retry(&self, reason: &str) {
        *self.publish_retry.lock().unwrap().entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_publish_invalid(&self) {
        self.publish_invalid.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_unauthorized(&self) {
        self.publish_unauthorized.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_send_latency(&self, micros: u64) {
        self.send_latency_sum_us.fetch_add(micros, Ordering::Relaxed);
        self.send_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(
        &self,
        wal_appended_total: u64,
        wal_dropped_total: u64,
        wal_size_bytes: u64,
        wal_pending: usize,
    ) -> MetricsSnapshot {
        let count = self.send_latency_count.load(Ordering::Relaxed);
        let sum_us = self.send_latency_sum_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            agent_events_collected_total: self.events_collected.lock().unwrap().clone(),
            agent_events_rejected_total: self
                .events_rejected
                .lock()
                .unwrap()
                .iter()
                .map(|((probe, reason), v)| (format!("{probe}:{reason}"), *v))
                .collect(),
            agent_wal_appended_total: wal_appended_total,
            agent_wal_dropped_total: wal_dropped_total,
            agent_wal_size_bytes: wal_size_bytes,
            agent_wal_pending: wal_pending,
            agent_publish_attempts_total: self.publish_attempts.load(Ordering::Relaxed),
            agent_publish_ok_total: self.publish_ok.load(Ordering::Relaxed),
            agent_publish_retry_total: self.publish_retry.lock().unwrap().clone(),
            agent_publish_invalid_total: self.publish_invalid.load(Ordering::Relaxed),
            agent_publish_unauthorized_total: self.publish_unauthorized.load(Ordering::Relaxed),
            agent_breaker_state: self.breaker_state.load(Ordering::Relaxed),
            agent_send_latency_seconds_avg: if count > 0 {
                (sum_us as f64 / count as f64) / 1_000_000.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub agent_events_collected_total: HashMap<String, u64>,
    pub agent_events_rejected_total: HashMap<String, u64>,
    pub agent_wal_appended_total: u64,
    pub agent_wal_dropped_total: u64,
    pub agent_wal_size_bytes: u64,
    pub agent_wal_pending: usize,
    pub agent_publish_attempts_total: u64,
    pub agent_publish_ok_total: u64,
    pub agent_publish_retry_total: HashMap<String, u64>,
    pub agent_publish_invalid_total: u64,
    pub agent_publish_unauthorized_total: u64,
    pub agent_breaker_state: i64,
    pub agent_send_latency_seconds_avg: f64,
}
