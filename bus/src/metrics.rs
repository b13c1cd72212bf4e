use std::collections::HashMap;
use std::sync::atomic::{AtomicI64, AtomicU64, Ordering};
use std::sync::Mutex;

use serde::Serialize;

/// Counters and gauges for the Bus, exposed as a JSON snapshot at `/metrics`.
pub struct Metrics {
    messages_received: Mutex<HashMap<String, u64>>,
    messages_ok: Mutex<HashMap<String, u64>>,
    messages_retry: Mutex<HashMap<(String, String), u64>>,
    messages_invalid: Mutex<HashMap<String, u64>>,
    messages_unauthorized: Mutex<HashMap<String, u64>>,
    pub inflight: AtomicI64,
    pub overload_mode: AtomicI64,
    dedup_hits: AtomicU64,
    publish_latency_sum_us: AtomicU64,
    publish_latency_count: AtomicU64,
}

impl Metrics {
    pub fn new() -> Self {
        Self {
            messages_received: Mutex::new(HashMap::new()),
            messages_ok: Mutex::new(HashMap::new()),
            messages_retry: Mutex::new(HashMap::new()),
            messages_invalid: Mutex::new(HashMap::new()),
            messages_unauthorized: Mutex::new(HashMap::new()),
            inflight: AtomicI64::new(0),
            overload_mode: AtomicI64::new(0),
            dedup_hits: AtomicU64::new(0),
            publish_latency_sum_us: AtomicU64::new(0),
            publish_latency_count: AtomicU64::new(0),
        }
    }

    pub fn record_received(&self, source: &str) {
        *self.messages_received.lock().unwrap().entry(source.to_string()).or_insert(0) += 1;
    }

    pub fn record_ok(&self, source: &str) {
        *self.messages_ok.lock().unwrap().entry(source.to_string()).or_insert(0) += 1;
    }

    pub fn record_retry(&self, source: &str, reason: &str) {
        *self
            .messages_retry
            .lock()
            .unwrap()
            .entry((source.to_string(), reason.to_string()))
            .or_insert(0) += 1;
    }

    pub fn record_invalid(&self, reason: &str) {
        *self.messages_invalid.lock().unwrap().entry(reason.to_string()).or_insert(0) += 1;
    }

    pub fn record_unauthorized(&self, reason: &str) {
        *self
            .messages_unauthorized
            .lock()
            .unwrap()
            .entry(reason.to_string())
            .or_insert(0) += 1;
    }

    pub fn record_dedup_hit(&self) {
        self.dedup_hits.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_publish_latency(&self, micros: u64) {
        self.publish_latency_sum_us.fetch_add(micros, Ordering::Relaxed);
        self.publish_latency_count.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self, dedup_cache_size: usize) -> MetricsSnapshot {
        let count = self.publish_latency_count.load(Ordering::Relaxed);
        let sum_us = self.publish_latency_sum_us.load(Ordering::Relaxed);
        MetricsSnapshot {
            bus_messages_received_total: self.messages_received.lock().unwrap().clone(),
            bus_messages_ok_total: self.messages_ok.lock().unwrap().clone(),
            bus_messages_retry_total: self
                .messages_retry
                .lock()
                .unwrap()
                .iter()
                .map(|((source, reason), v)| (format!("{source}:{reason}"), *v))
                .collect(),
            bus_messages_invalid_total: self.messages_invalid.lock().unwrap().clone(),
            bus_messages_unauthorized_total: self.messages_unauthorized.lock().unwrap().clone(),
            bus_inflight_messages: self.inflight.load(Ordering::Relaxed),
            bus_overload_mode: self.overload_mode.load(Ordering::Relaxed),
            bus_dedup_hits_total: self.dedup_hits.load(Ordering::Relaxed),
            bus_dedup_cache_size: dedup_cache_size,
            bus_publish_latency_seconds_avg: if count > 0 {
                (sum_us as f64 / count as f64) / 1_000_000.0
            } else {
                0.0
            },
        }
    }
}

#[derive(Serialize)]
pub struct MetricsSnapshot {
    pub bus_messages_received_total: HashMap<String, u64>,
    pub bus_messages_ok_total: HashMap<String, u64>,
    pub bus_messages_retry_total: HashMap<String, u64>,
    pub bus_messages_invalid_total: HashMap<String, u64>,
    pub bus_messages_unauthorized_total: HashMap<String, u64>,
    pub bus_inflight_messages: i64,
    pub bus_overload_mode: i64,
    pub bus_dedup_hits_total: u64,
    pub bus_dedup_cache_size: usize,
    pub bus_publish_latency_seconds_avg: f64,
}
