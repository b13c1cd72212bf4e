//! Runs every registered probe on a shared interval, validates and enriches what comes
//! back, signs it into an envelope, and appends it to the WAL.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant, SystemTime, UNIX_EPOCH};

use sentrygrid_crypto::Signer;
use sentrygrid_wal::{AppendOutcome, Wal};
use sentrygrid_wire::{Envelope, CURRENT_VERSION};
use tracing::{error, warn};

use crate::enrich::{enrich, EnrichmentContext};
use crate::metrics::Metrics;
use crate::probe::Probe;

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn reject_reason(e: &sentrygrid_wire::WireError) -> &'static str {
    match e {
        sentrygrid_wire::WireError::MissingField(_) => "missing_field",
        sentrygrid_wire::WireError::InvalidField(_) => "invalid_field",
        sentrygrid_wire::WireError::UnknownVersion(_) => "unknown_version",
        sentrygrid_wire::WireError::Oversize { .. } => "oversize",
        sentrygrid_wire::WireError::Decode(_) => "malformed",
        sentrygrid_wire::WireError::Encode(_) => "malformed",
    }
}

pub fn run(
    probes: Vec<Box<dyn Probe>>,
    signer: Arc<Signer>,
    wal: Arc<Wal>,
    metrics: Arc<Metrics>,
    source_identity: String,
    interval: Duration,
    shutdown: Arc<AtomicBool>,
) {
    let ctx = EnrichmentContext::discover();

    while !shutdown.load(Ordering::Relaxed) {
        for probe in &probes {
            let candidates = probe.collect();
            metrics.record_collected(probe.name(), candidates.len() as u64);

            for mut candidate in candidates {
                if let Err(e) = candidate.payload.validate() {
                    metrics.record_rejected(probe.name(), reject_reason(&e));
                    warn!(probe = probe.name(), error = %e, "dropping invalid candidate event");
                    continue;
                }
                enrich(&mut candidate.payload, &ctx);

                let envelope = Envelope {
                    version: CURRENT_VERSION.to_string(),
                    timestamp_ns: now_ns(),
                    idempotency_key: candidate.idempotency_key.clone(),
                    source_identity: source_identity.clone(),
                    payload: Some(candidate.payload),
                    signature: Vec::new(),
                    prev_signature: Vec::new(),
                };
                let envelope = signer.sign_envelope(envelope);

                let bytes = match envelope.to_bytes() {
                    Ok(b) => b,
                    Err(e) => {
                        error!(error = %e, "failed to serialize signed envelope, dropping");
                        continue;
                    }
                };

                match wal.append(&candidate.idempotency_key, bytes, now_ns(), Instant::now()) {
                    Ok(AppendOutcome::Enqueued) | Ok(AppendOutcome::DuplicateNoop) => {}
                    Err(e) => {
                        error!(error = %e, key = %candidate.idempotency_key, "wal append failed");
                    }
                }
            }
        }

        sleep_interruptible(interval, &shutdown);
    }
}

fn sleep_interruptible(total: Duration, shutdown: &Arc<AtomicBool>) {
    const STEP: Duration = Duration::from_millis(200);
    let mut remaining = total;
    while remaining > Duration::ZERO && !shutdown.load(Ordering::Relaxed) {
        let step = remaining.min(STEP);
        thread::sleep(step);
        remaining -= step;
    }
}
