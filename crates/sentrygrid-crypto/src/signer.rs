//! Ed25519 signing over canonical envelope bytes.

use ed25519_dalek::{Signer as _, SigningKey};
use sentrygrid_wire::{canonicalize, Envelope};

/// Wraps a private key and signs envelopes over their canonical bytes.
pub struct Signer {
    key: SigningKey,
}

impl Signer {
    pub fn new(key: SigningKey) -> Self {
        Self { key }
    }

    pub fn from_bytes(bytes: &[u8; 32]) -> Self {
        Self::new(SigningKey::from_bytes(bytes))
    }

    pub fn verifying_key_bytes(&self) -> [u8; 32] {
        self.key.verifying_key().to_bytes()
    }

    /// Signs `envelope`'s canonical bytes (every field but `signature`) and returns the
    /// raw 64-byte Ed25519 signature. Does not mutate `envelope`; callers attach the
    /// signature themselves.
    pub fn sign(&self, envelope: &Envelope) -> [u8; 64] {
        let bytes = canonicalize(envelope);
        self.key.sign(&bytes).to_bytes()
    }

    /// Signs and attaches the signature to a clone of `envelope`.
    pub fn sign_envelope(&self, mut envelope: Envelope) -> Envelope {
        let sig = self.sign(&envelope);
        envelope.signature = sig.to_vec();
        envelope
    }
}
