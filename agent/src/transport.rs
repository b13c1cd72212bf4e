//! Blocking mTLS client for the `Publish` RPC, built the same way the load test tool
//! builds its client: a `reqwest::blocking::Client`, configured once and reused across
//! calls. The drain loop runs on its own OS thread (the WAL and circuit breaker are
//! synchronous), so a blocking client is the natural fit rather than pulling the send
//! path onto the tokio runtime that only hosts the metrics/health surface.

use std::time::Duration;

use sentrygrid_wire::{Ack, AckStatus};

use crate::error::{AgentError, PublishOutcome};

const RPC_DEADLINE: Duration = Duration::from_secs(5);

pub struct BusClient {
    client: reqwest::blocking::Client,
    publish_url: String,
}

impl BusClient {
    pub fn new(
        bus_address: &str,
        ca_path: &std::path::Path,
        cert_path: &std::path::Path,
        key_path: &std::path::Path,
    ) -> Result<Self, AgentError> {
        let ca_pem = std::fs::read(ca_path)?;
        let cert_pem = std::fs::read(cert_path)?;
        let key_pem = std::fs::read(key_path)?;

        let mut identity_pem = cert_pem;
        identity_pem.extend_from_slice(&key_pem);
        let identity = reqwest::Identity::from_pem(&identity_pem)
            .map_err(|e| AgentError::KeyLoad(e.to_string()))?;
        let ca_cert = reqwest::Certificate::from_pem(&ca_pem)
            .map_err(|e| AgentError::KeyLoad(e.to_string()))?;

        let client = reqwest::blocking::Client::builder()
            .use_rustls_tls()
            .identity(identity)
            .add_root_certificate(ca_cert)
            .timeout(RPC_DEADLINE)
            .build()?;

        Ok(Self {
            client,
            publish_url: format!("https://{bus_address}/v1/publish"),
        })
    }

    /// Sends one already-signed, already-serialized envelope and interprets the ack.
    /// Every non-application failure (timeout, connection reset, TLS handshake failure,
    /// malformed ack body) collapses to `PublishOutcome::Transport`, which the drain loop
    /// treats as retryable and counts toward the circuit breaker.
    pub fn publish(&self, serialized_envelope: &[u8]) -> PublishOutcome {
        let response = match self
            .client
            .post(&self.publish_url)
            .body(serialized_envelope.to_vec())
            .send()
        {
            Ok(r) => r,
            Err(e) => return PublishOutcome::Transport(e.to_string()),
        };

        let body = match response.bytes() {
            Ok(b) => b,
            Err(e) => return PublishOutcome::Transport(e.to_string()),
        };

        let ack = match Ack::from_bytes(&body) {
            Ok(a) => a,
            Err(e) => return PublishOutcome::Transport(format!("malformed ack: {e}")),
        };

        match ack.status() {
            AckStatus::Ok => PublishOutcome::Ok,
            AckStatus::Retry => PublishOutcome::Retry {
                reason: ack.reason,
                backoff_hint_ms: ack.backoff_hint_ms,
            },
            AckStatus::Invalid => PublishOutcome::Invalid { reason: ack.reason },
            AckStatus::Unauthorized => PublishOutcome::Unauthorized { reason: ack.reason },
        }
    }
}
