//! The drain loop: dequeues WAL records in FIFO order and publishes them to the bus,
//! gated by the circuit breaker, paced by an optional rate limit, backing off on
//! transport failure and on RETRY acks.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sentrygrid_breaker::CircuitBreaker;
use sentrygrid_wal::Wal;
use tracing::{error, warn};

use crate::backoff::{jittered, Backoff};
use crate::error::PublishOutcome;
use crate::metrics::Metrics;
use crate::transport::BusClient;

pub struct DrainConfig {
    pub batch_size: usize,
    pub send_rate: u32,
    pub retry_base_ms: u64,
    pub retry_max_ms: u64,
    pub retry_jitter: f64,
    pub retry_floor_ms: u64,
}

struct RateLimiter {
    interval: Option<Duration>,
    last_send: Option<Instant>,
}

impl RateLimiter {
    fn new(send_rate: u32) -> Self {
        let interval = if send_rate == 0 {
            None
        } else {
            Some(Duration::from_secs_f64(1.0 / send_rate as f64))
        };
        Self { interval, last_send: None }
    }

    fn wait_turn(&mut self) {
        let Some(interval) = self.interval else { return };
        if let Some(last) = self.last_send {
            let elapsed = last.elapsed();
            if elapsed < interval {
                thread::sleep(interval - elapsed);
            }
        }
        self.last_send = Some(Instant::now());
    }
}

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

/// Runs until `shutdown` is observed set. Intended to run on a dedicated OS thread; the
/// WAL and circuit breaker are synchronous, so this loop blocks freely rather than
/// competing with the tokio runtime that hosts the metrics/health surface.
pub fn run(
    wal: Arc<Wal>,
    breaker: Arc<CircuitBreaker>,
    client: BusClient,
    metrics: Arc<Metrics>,
    config: DrainConfig,
    shutdown: Arc<AtomicBool>,
) {
    let mut backoff = Backoff::new(
        config.retry_base_ms,
        config.retry_max_ms,
        config.retry_jitter,
        config.retry_floor_ms,
    );
    let mut rate_limiter = RateLimiter::new(config.send_rate);

    while !shutdown.load(Ordering::Relaxed) {
        let now = Instant::now();
        if !breaker.allow_call(now) {
            metrics.breaker_state.store(breaker.state() as i64, Ordering::Relaxed);
            thread::sleep(Duration::from_millis(200));
            continue;
        }

        let records = match wal.drain(config.batch_size) {
            Ok(r) => r,
            Err(e) => {
                error!(error = %e, "wal drain failed");
                thread::sleep(Duration::from_millis(500));
                continue;
            }
        };
        if records.is_empty() {
            thread::sleep(Duration::from_millis(500));
            continue;
        }

        for record in records {
            rate_limiter.wait_turn();
            let started = Instant::now();
            metrics.record_publish_attempt();
            let outcome = client.publish(&record.serialized_envelope);
            metrics.record_send_latency(started.elapsed().as_micros() as u64);

            match outcome {
                PublishOutcome::Ok => {
                    if let Err(e) = wal.mark_delivered(&[record.idempotency_key.clone()]) {
                        error!(error = %e, key = %record.idempotency_key, "failed to mark delivered");
                    }
                    metrics.record_publish_ok();
                    breaker.record_success();
                    backoff.reset();
                }
                PublishOutcome::Retry { reason, backoff_hint_ms } => {
                    if let Err(e) = wal.mark_retry(&[record.idempotency_key.clone()], now_ns()) {
                        error!(error = %e, key = %record.idempotency_key, "failed to mark retry");
                    }
                    metrics.record_publish_retry(&reason);
                    if reason == "hard_overload" || reason == "soft_overload" {
                        breaker.record_failure(Instant::now());
                    }
                    let delay = jittered(backoff_hint_ms as u64, config.retry_jitter, config.retry_floor_ms);
                    thread::sleep(delay);
                }
                PublishOutcome::Invalid { reason } => {
                    if let Err(e) = wal.mark_invalid(&[record.idempotency_key.clone()]) {
                        error!(error = %e, key = %record.idempotency_key, "failed to mark invalid");
                    }
                    metrics.record_publish_invalid();
                    error!(reason, key = %record.idempotency_key, "envelope rejected as invalid, moved to dead letter");
                }
                PublishOutcome::Unauthorized { reason } => {
                    if let Err(e) = wal.mark_invalid(&[record.idempotency_key.clone()]) {
                        error!(error = %e, key = %record.idempotency_key, "failed to mark invalid");
                    }
                    metrics.record_publish_unauthorized();
                    error!(reason, key = %record.idempotency_key, "envelope unauthorized, moved to dead letter — check trust map and signing key configuration");
                }
                PublishOutcome::Transport(err) => {
                    if let Err(e) = wal.mark_retry(&[record.idempotency_key.clone()], now_ns()) {
                        error!(error = %e, key = %record.idempotency_key, "failed to mark retry");
                    }
                    metrics.record_publish_retry("transport");
                    breaker.record_failure(Instant::now());
                    warn!(error = %err, key = %record.idempotency_key, "transport failure publishing envelope");
                    thread::sleep(backoff.next_delay());
                }
            }
            metrics.breaker_state.store(breaker.state() as i64, Ordering::Relaxed);

            if shutdown.load(Ordering::Relaxed) {
                break;
            }
        }
    }

    if let Err(e) = wal.flush() {
        error!(error = %e, "failed to flush wal on shutdown");
    }
}
