//! Ed25519 verification against trust-map entries.

use ed25519_dalek::{Signature, Verifier as _};
use sentrygrid_wire::{canonicalize, Envelope};

use crate::error::CryptoError;
use crate::trust_map::{TrustEntry, TrustMap};

/// Verifies `envelope`'s embedded signature against the trust map entry for
/// `envelope.source_identity`.
pub fn verify(trust_map: &TrustMap, envelope: &Envelope) -> Result<(), CryptoError> {
    let entry = trust_map
        .lookup(&envelope.source_identity)
        .ok_or_else(|| CryptoError::UnknownIdentity(envelope.source_identity.clone()))?;
    verify_with_entry(&entry, envelope)
}

/// Verifies against an already-resolved trust entry (avoids a second map lookup when the
/// caller already has one, e.g. after identity-binding checks at the Bus).
pub fn verify_with_entry(entry: &TrustEntry, envelope: &Envelope) -> Result<(), CryptoError> {
    let sig_bytes: [u8; 64] = envelope
        .signature
        .as_slice()
        .try_into()
        .map_err(|_| CryptoError::BadSignature)?;
    let signature = Signature::from_bytes(&sig_bytes);
    let canonical = canonicalize(envelope);
    entry
        .public_key
        .verify(&canonical, &signature)
        .map_err(|_| CryptoError::BadSignature)
}
