//! The decode → validate → identity-bind → trust-lookup → verify → admit → dedup → sink
//! pipeline walked by both the unary `/v1/publish` handler and the `PublishStream` frame
//! loop. Keeping it in one place means the two ingestion surfaces can never drift apart on
//! what counts as a valid, authorized, admissible envelope.

use std::time::{Instant, SystemTime, UNIX_EPOCH};

use sentrygrid_crypto::verifier;
use sentrygrid_wire::{Ack, Envelope, WireError};
use tokio::sync::mpsc::error::TrySendError;
use tracing::{info, warn};

use crate::admission::AdmitDecision;
use crate::state::AppState;

fn now_ns() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}

fn structural_reason(e: &WireError) -> &'static str {
    match e {
        WireError::MissingField(_) => "missing_field",
        WireError::InvalidField(_) => "invalid_field",
        WireError::UnknownVersion(_) => "unknown_version",
        WireError::Oversize { .. } => "oversize",
        WireError::Decode(_) => "malformed",
        WireError::Encode(_) => "malformed",
    }
}

/// Walks the full ingestion pipeline for one envelope and returns the ack to send back.
///
/// `bound_identity` is the identity the transport has already authenticated (the mTLS
/// peer certificate's common name) — `None` means the transport has no verified identity
/// to bind to, which always fails identity-binding. `source_hint` is used for metrics
/// labeling and defaults to `bound_identity` on the streaming path.
pub async fn process_envelope(
    state: &AppState,
    body: &[u8],
    bound_identity: Option<&str>,
    source_hint: &str,
) -> Ack {
    state.metrics.record_received(source_hint);

    // Step 2: size check.
    if body.len() > state.max_envelope_bytes {
        state.metrics.record_invalid("oversize");
        warn!(size = body.len(), max = state.max_envelope_bytes, "oversize_envelope");
        return Ack::invalid("oversize");
    }

    // Step 3: decode + structural validation.
    let envelope = match Envelope::from_bytes(body) {
        Ok(e) => e,
        Err(e) => {
            state.metrics.record_invalid("malformed");
            warn!(error = %e, "malformed_envelope");
            return Ack::invalid("malformed");
        }
    };
    if let Err(e) = envelope.validate_structure() {
        let reason = structural_reason(&e);
        state.metrics.record_invalid(reason);
        warn!(reason, "structurally_invalid_envelope");
        return Ack::invalid(reason);
    }

    // Step 4: identity binding.
    match bound_identity {
        Some(identity) if identity == envelope.source_identity => {}
        _ => {
            state.metrics.record_unauthorized("identity_mismatch");
            warn!(
                claimed = %envelope.source_identity,
                bound = ?bound_identity,
                "identity_mismatch"
            );
            return Ack::unauthorized("identity_mismatch");
        }
    }

    // Step 5: trust lookup.
    let Some(entry) = state.trust_map.lookup(&envelope.source_identity) else {
        state.metrics.record_unauthorized("unknown_identity");
        warn!(identity = %envelope.source_identity, "unknown_identity");
        return Ack::unauthorized("unknown_identity");
    };

    // Step 6: validity window, then signature.
    if !entry.valid_at(now_ns()) {
        state.metrics.record_unauthorized("identity_expired");
        warn!(identity = %envelope.source_identity, "identity_expired");
        return Ack::unauthorized("identity_expired");
    }
    if verifier::verify_with_entry(&entry, &envelope).is_err() {
        state.metrics.record_unauthorized("bad_signature");
        warn!(identity = %envelope.source_identity, "bad_signature");
        return Ack::unauthorized("bad_signature");
    }

    // Step 7: admission.
    match state.admission.try_admit() {
        AdmitDecision::RejectHard => {
            state.metrics.record_retry(&envelope.source_identity, "hard_overload");
            warn!(identity = %envelope.source_identity, "hard_overload");
            return Ack::retry("hard_overload", 1000);
        }
        AdmitDecision::RejectSoft => {
            state.metrics.record_retry(&envelope.source_identity, "soft_overload");
            warn!(identity = %envelope.source_identity, "soft_overload");
            return Ack::retry("soft_overload", 250);
        }
        AdmitDecision::Admit => {}
    }

    let ack = admit_dedup_and_sink(state, envelope, source_hint).await;
    state.admission.release();
    ack
}

async fn admit_dedup_and_sink(state: &AppState, envelope: Envelope, source_hint: &str) -> Ack {
    // Step 8: dedup.
    if state.dedup.check_and_insert(&envelope.idempotency_key, Instant::now()) {
        state.metrics.record_dedup_hit();
        state.metrics.record_ok(source_hint);
        info!(idempotency_key = %envelope.idempotency_key, "duplicate_accepted");
        return Ack::ok("duplicate");
    }

    // Step 9: handoff to the downstream sink before acking OK.
    match state.sink_tx.try_send(envelope) {
        Ok(()) => {
            state.metrics.record_ok(source_hint);
            Ack::ok("")
        }
        Err(TrySendError::Full(_)) => {
            state.metrics.record_retry(source_hint, "sink_full");
            warn!("sink_full — returning RETRY");
            Ack::retry("sink_full", 500)
        }
        Err(TrySendError::Closed(_)) => {
            state.metrics.record_retry(source_hint, "sink_closed");
            warn!("sink_closed — returning RETRY");
            Ack::retry("sink_closed", 1000)
        }
    }
}
