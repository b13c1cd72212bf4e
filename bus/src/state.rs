use std::sync::Arc;
use std::time::Duration;

use sentrygrid_crypto::TrustMap;
use tokio::sync::mpsc;

use crate::admission::AdmissionController;
use crate::config::BusConfig;
use crate::dedup::DedupCache;
use crate::metrics::Metrics;
use sentrygrid_wire::Envelope;

#[derive(Clone)]
pub struct AppState {
    pub trust_map: Arc<TrustMap>,
    pub admission: Arc<AdmissionController>,
    pub dedup: Arc<DedupCache>,
    pub metrics: Arc<Metrics>,
    pub sink_tx: mpsc::Sender<Envelope>,
    pub max_envelope_bytes: usize,
}

impl AppState {
    pub fn new(config: &BusConfig, trust_map: Arc<TrustMap>, sink_tx: mpsc::Sender<Envelope>) -> Self {
        Self {
            trust_map,
            admission: Arc::new(AdmissionController::new(
                config.max_inflight_soft,
                config.max_inflight_hard,
                config.overload_hysteresis,
            )),
            dedup: Arc::new(DedupCache::new(
                Duration::from_secs(config.dedup_ttl_seconds),
                config.dedup_capacity,
            )),
            metrics: Arc::new(Metrics::new()),
            sink_tx,
            max_envelope_bytes: config.max_envelope_bytes,
        }
    }
}

/// Consumes accepted envelopes. The downstream forwarder/store is out of scope; this
/// is the reference sink — log and move on.
pub async fn sink_worker(mut rx: mpsc::Receiver<Envelope>) {
    while let Some(envelope) = rx.recv().await {
        tracing::info!(
            source = %envelope.source_identity,
            idempotency_key = %envelope.idempotency_key,
            kind = envelope.payload.as_ref().map(|p| p.kind()).unwrap_or("none"),
            "envelope accepted"
        );
    }
}
