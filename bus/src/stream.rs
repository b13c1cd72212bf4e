//! Raw TCP+TLS listener for `PublishStream`: one connection, one peer identity, a
//! length-delimited frame per envelope/ack for as long as the session lives. There is no
//! HTTP/2 framing here — `axum-server` only fronts the unary `/v1/publish` path, so this
//! listener terminates TLS itself with the same server config and walks the same
//! validate → identity → trust → verify → admit → dedup → sink pipeline per frame.

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Instant;

use futures::{SinkExt, StreamExt};
use sentrygrid_wire::{codec::frame_codec, Ack};
use tokio::net::TcpListener;
use tokio_rustls::TlsAcceptor;
use tokio_util::codec::Framed;
use tracing::{info, instrument, warn};

use crate::pipeline::process_envelope;
use crate::state::AppState;
use crate::tls::common_name_from_der;

#[instrument(skip_all, fields(addr = %addr))]
pub async fn serve(
    addr: SocketAddr,
    tls_config: Arc<rustls::ServerConfig>,
    state: AppState,
) -> std::io::Result<()> {
    let listener = TcpListener::bind(addr).await?;
    let acceptor = TlsAcceptor::from(tls_config);
    info!("PublishStream listener bound");

    loop {
        let (socket, peer_addr) = listener.accept().await?;
        let acceptor = acceptor.clone();
        let state = state.clone();
        tokio::spawn(async move {
            let tls_stream = match acceptor.accept(socket).await {
                Ok(s) => s,
                Err(e) => {
                    warn!(peer = %peer_addr, error = %e, "tls handshake failed");
                    return;
                }
            };

            let identity = {
                let (_, session) = tls_stream.get_ref();
                session
                    .peer_certificates()
                    .and_then(|certs| certs.first())
                    .and_then(|cert| common_name_from_der(cert.as_ref()))
            };
            let Some(identity) = identity else {
                warn!(peer = %peer_addr, "stream session rejected: no client certificate identity");
                return;
            };

            if let Err(e) = handle_session(tls_stream, &identity, &state).await {
                warn!(peer = %peer_addr, identity = %identity, error = %e, "stream session ended with error");
            }
        });
    }
}

async fn handle_session(
    tls_stream: tokio_rustls::server::TlsStream<tokio::net::TcpStream>,
    bound_identity: &str,
    state: &AppState,
) -> std::io::Result<()> {
    let mut framed = Framed::new(tls_stream, frame_codec());

    while let Some(frame) = framed.next().await {
        let bytes = frame?;
        let ack = process_frame(&bytes, bound_identity, state).await;
        match ack.to_bytes() {
            Ok(buf) => framed.send(buf.into()).await?,
            Err(e) => {
                warn!(error = %e, "failed to encode ack on stream");
                break;
            }
        }
    }
    Ok(())
}

async fn process_frame(bytes: &[u8], bound_identity: &str, state: &AppState) -> Ack {
    let started = Instant::now();
    let ack = process_envelope(state, bytes, Some(bound_identity), bound_identity).await;
    state.metrics.record_publish_latency(started.elapsed().as_micros() as u64);
    ack
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
    use sentrygrid_wire::{AckStatus, Envelope, FlowRecord, Payload, CURRENT_VERSION};
    use std::collections::HashMap;
    use std::time::Duration;
    use tokio::sync::mpsc;

    fn test_state(trust_map: TrustMap) -> (AppState, mpsc::Receiver<Envelope>) {
        let (tx, rx) = mpsc::channel(4);
        let state = AppState {
            trust_map: Arc::new(trust_map),
            admission: Arc::new(AdmissionController::new(100, 200, 0.8)),
            dedup: Arc::new(DedupCache::new(Duration::from_secs(300), 1000)),
            metrics: Arc::new(Metrics::new()),
            sink_tx: tx,
            max_envelope_bytes: sentrygrid_wire::MAX_ENVELOPE_BYTES,
        };
        (state, rx)
    }

    fn sample_envelope(source_identity: &str, key: &str) -> Envelope {
        Envelope {
            version: CURRENT_VERSION.to_string(),
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
        }
    }

    #[tokio::test]
    async fn accepts_a_frame_bound_to_the_session_identity() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let mut entries = HashMap::new();
        entries.insert(
            "a1".to_string(),
            TrustEntry {
                public_key: key.verifying_key(),
                not_before_ns: 0,
                not_after_ns: None,
            },
        );
        let (state, mut rx) = test_state(TrustMap::from_entries(entries));

        let envelope = signer.sign_envelope(sample_envelope("a1", "k1"));
        let bytes = envelope.to_bytes().unwrap();
        let ack = process_frame(&bytes, "a1", &state).await;

        assert_eq!(ack.status(), AckStatus::Ok);
        assert!(rx.try_recv().is_ok());
    }

    #[tokio::test]
    async fn frame_claiming_a_different_identity_than_the_session_is_rejected() {
        let key = SigningKey::generate(&mut OsRng);
        let signer = Signer::new(key.clone());
        let mut entries = HashMap::new();
        entries.insert(
            "a1".to_string(),
            TrustEntry {
                public_key: key.verifying_key(),
                not_before_ns: 0,
                not_after_ns: None,
            },
        );
        let (state, _rx) = test_state(TrustMap::from_entries(entries));

        let envelope = signer.sign_envelope(sample_envelope("a1", "k1"));
        let bytes = envelope.to_bytes().unwrap();
        // The TLS session was bound to "someone-else", not the envelope's own identity.
        let ack = process_frame(&bytes, "someone-else", &state).await;

        assert_eq!(ack.status(), AckStatus::Unauthorized);
        assert_eq!(ack.reason, "identity_mismatch");
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
        let (state, _rx) = test_state(TrustMap::from_entries(entries));

        let envelope = signer.sign_envelope(sample_envelope("a1", "k1"));
        let bytes = envelope.to_bytes().unwrap();
        let ack = process_frame(&bytes, "a1", &state).await;

        assert_eq!(ack.status(), AckStatus::Unauthorized);
        assert_eq!(ack.reason, "identity_expired");
    }

    #[tokio::test]
    async fn oversize_frame_is_invalid() {
        let (state, _rx) = test_state(TrustMap::empty());
        let bytes = vec![0u8; state.max_envelope_bytes + 1];
        let ack = process_frame(&bytes, "a1", &state).await;
        assert_eq!(ack.status(), AckStatus::Invalid);
        assert_eq!(ack.reason, "oversize");
    }
}
