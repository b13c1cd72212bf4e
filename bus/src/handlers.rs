use axum::extract::State;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Extension, Json};
use bytes::Bytes;
use sentrygrid_wire::Ack;
use std::sync::Arc;
use std::time::Instant;
use tracing::instrument;

use crate::pipeline::process_envelope;
use crate::state::AppState;
use crate::tls::PeerIdentity;

/// `POST /v1/publish` — unary ingestion: decode, validate, authenticate, admit, dedup,
/// hand off to the sink, ack.
#[instrument(skip_all)]
pub async fn publish(
    State(state): State<AppState>,
    Extension(peer): Extension<PeerIdentity>,
    body: Bytes,
) -> impl IntoResponse {
    let started = Instant::now();
    let source_hint = peer.0.clone().unwrap_or_else(|| "unknown".to_string());

    let ack = process_envelope(&state, &body, peer.0.as_deref(), &source_hint).await;
    state.metrics.record_publish_latency(started.elapsed().as_micros() as u64);
    ack_response(StatusCode::OK, ack)
}

fn ack_response(status: StatusCode, ack: Ack) -> axum::response::Response {
    match ack.to_bytes() {
        Ok(bytes) => (status, Bytes::from(bytes)).into_response(),
        Err(e) => {
            tracing::error!(error = %e, "failed to encode ack");
            StatusCode::INTERNAL_SERVER_ERROR.into_response()
        }
    }
}

pub async fn healthz() -> StatusCode {
    StatusCode::OK
}

pub async fn ready(State(state): State<AppState>) -> StatusCode {
    if state.trust_map.is_empty() || state.sink_tx.is_closed() {
        StatusCode::SERVICE_UNAVAILABLE
    } else {
        StatusCode::OK
    }
}

pub async fn metrics(State(state): State<AppState>) -> Json<crate::metrics::MetricsSnapshot> {
    Json(state.metrics.snapshot(state.dedup.len()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::admission::AdmissionController;
    use crate::dedup::DedupCache;
    use crate::metrics::Metrics;
    use ed25519_dalek::SigningKey;
    use rand::rngs::OsRng;
    use sentrygrid_crypto::{Signer, TrustEntry, TrustMap};
    use sentrygrid_wire::{AckStatus, Envelope, FlowRecord, Payload};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_state(trust_map: Arc<TrustMap>, sink_capacity: usize) -> (AppState, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(sink_capacity);
        let state = AppState {
            trust_map,
            admission: Arc::new(AdmissionController::new(100, 200, 0.8)),
            dedup: Arc::new(DedupCache::new(Duration::from_secs(300), 1000)),
            metrics: Arc::new(Metrics::new()),
            sink_tx: tx,
            max_envelope_bytes: sentrygrid_wire::MAX_ENVELOPE_BYTES,
        };
        (state, rx)
    }

    fn trust_map_with(identity: &str, public_key: ed25519_dalek::VerifyingKey) -> Arc<TrustMap> {
        let mut entries = HashMap::new();
        entries.insert(
            identity.to_string(),
            TrustEntry {
                public_key,
                not_before_ns: 0,
                not_after_ns: None,
            },
        );
        Arc::new(TrustMap::from_entries(entries))
    }

    fn signed_envelope(signer: &Signer, source_identity: &str, key: &str) -> Bytes {
        let envelope = Envelope {
            version: sentrygrid_wire::CURRENT_VERSION.to_string(),
            timestamp_ns: 1,
            idempotency_key: key.to_string(),
            source_identity: source_identity.to_string(),
            payload: Some(Payload::Flow(FlowRecord {
                src_ip: "10.0.0.1".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 1,
                dst_port: 2,
                protocol: "tcp".into(),
                bytes_sent: 0,
                bytes_recv: 0,
            })),
            signature: vec![],
            prev_signature: vec![],
        };
        Bytes::from(signer.sign_envelope(envelope).to_bytes().unwrap())
    }

    async fn ack_of(response: axum::response::Response) -> Ack {
        let body = axum::body::to_bytes(response.into_body(), usize::MAX).await.unwrap();
        Ack::from_bytes(&body).unwrap()
    }

    #[tokio::test]
    async fn accepts_a_well_formed_signed_envelope() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let trust_map = trust_map_with("a1", key.verifying_key());
        let (state, mut rx) = test_state(trust_map, 4);

        let body = signed_envelope(&signer, "a1", "k1");
        let response = publish(State(state), Extension(PeerIdentity(Some("a1".into()))), body)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Ok);
        assert!(rx.try_recv().is_ok(), "accepted envelope is handed to the sink");
    }

    #[tokio::test]
    async fn second_delivery_of_same_key_is_a_duplicate_ok() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let trust_map = trust_map_with("a1", key.verifying_key());
        let (state, _rx) = test_state(trust_map, 4);

        let body = signed_envelope(&signer, "a1", "k1");
        let first = publish(
            State(state.clone()),
            Extension(PeerIdentity(Some("a1".into()))),
            body.clone(),
        )
        .await
        .into_response();
        assert_eq!(ack_of(first).await.status(), AckStatus::Ok);

        let second = publish(State(state), Extension(PeerIdentity(Some("a1".into()))), body)
            .await
            .into_response();
        let ack = ack_of(second).await;
        assert_eq!(ack.status(), AckStatus::Ok);
        assert_eq!(ack.reason, "duplicate");
    }

    #[tokio::test]
    async fn claimed_identity_must_match_the_tls_peer() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let trust_map = trust_map_with("a1", key.verifying_key());
        let (state, _rx) = test_state(trust_map, 4);

        let body = signed_envelope(&signer, "a1", "k1");
        let response = publish(State(state), Extension(PeerIdentity(Some("someone-else".into()))), body)
            .await
            .into_response();

        assert_eq!(response.status(), StatusCode::OK);
        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Unauthorized);
        assert_eq!(ack.reason, "identity_mismatch");
    }

    #[tokio::test]
    async fn unknown_identity_is_rejected_as_unauthorized() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key);
        let (state, _rx) = test_state(Arc::new(TrustMap::empty()), 4);

        let body = signed_envelope(&signer, "ghost", "k1");
        let response = publish(State(state), Extension(PeerIdentity(Some("ghost".into()))), body)
            .await
            .into_response();

        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Unauthorized);
        assert_eq!(ack.reason, "unknown_identity");
    }

    #[tokio::test]
    async fn expired_identity_is_rejected_as_unauthorized() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let mut entries = HashMap::new();
        entries.insert(
            "a1".to_string(),
            TrustEntry {
                public_key: key.verifying_key(),
                not_before_ns: 0,
                not_after_ns: Some(1), // revoked long before the current wall clock
            },
        );
        let (state, _rx) = test_state(Arc::new(TrustMap::from_entries(entries)), 4);

        let body = signed_envelope(&signer, "a1", "k1");
        let response = publish(State(state), Extension(PeerIdentity(Some("a1".into()))), body)
            .await
            .into_response();
        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Unauthorized);
        assert_eq!(ack.reason, "identity_expired");
    }

    #[tokio::test]
    async fn tampered_signature_is_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let trust_map = trust_map_with("a1", key.verifying_key());
        let (state, _rx) = test_state(trust_map, 4);

        let mut envelope = Envelope::from_bytes(&signed_envelope(&signer, "a1", "k1")).unwrap();
        envelope.signature[0] ^= 0xFF;
        let body = Bytes::from(envelope.to_bytes().unwrap());

        let response = publish(State(state), Extension(PeerIdentity(Some("a1".into()))), body)
            .await
            .into_response();
        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Unauthorized);
        assert_eq!(ack.reason, "bad_signature");
    }

    #[tokio::test]
    async fn oversize_body_is_invalid_before_decoding() {
        let key = SigningKey::generate(&mut OsRng);
        let (state, _rx) = test_state(Arc::new(TrustMap::empty()), 4);
        let oversized = Bytes::from(vec![0u8; state.max_envelope_bytes + 1]);
        let _ = key;

        let response = publish(State(state), Extension(PeerIdentity(Some("a1".into()))), oversized)
            .await
            .into_response();
        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Invalid);
        assert_eq!(ack.reason, "oversize");
    }

    #[tokio::test]
    async fn full_sink_returns_retry() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let trust_map = trust_map_with("a1", key.verifying_key());
        let (state, _rx) = test_state(trust_map, 1);

        // Fill the sink channel so the next handoff observes it full.
        state.sink_tx.try_send(Envelope::from_bytes(&signed_envelope(&signer, "a1", "filler")).unwrap()).unwrap();

        let body = signed_envelope(&signer, "a1", "k2");
        let response = publish(State(state), Extension(PeerIdentity(Some("a1".into()))), body)
            .await
            .into_response();
        let ack = ack_of(response).await;
        assert_eq!(ack.status(), AckStatus::Retry);
        assert_eq!(ack.reason, "sink_full");
    }

    #[tokio::test]
    async fn healthz_is_always_ok() {
        assert_eq!(healthz().await, StatusCode::OK);
    }

    #[tokio::test]
    async fn ready_reflects_trust_map_and_sink_state() {
        let (state, rx) = test_state(Arc::new(TrustMap::empty()), 4);
        assert_eq!(ready(State(state.clone())).await, StatusCode::SERVICE_UNAVAILABLE);

        let key = SigningKey::generate(&mut OsRng);
        let trust_map = trust_map_with("a1", key.verifying_key());
        let (state2, rx2) = test_state(trust_map, 4);
        assert_eq!(ready(State(state2)).await, StatusCode::OK);
        drop(rx);
        drop(rx2);
    }
}
