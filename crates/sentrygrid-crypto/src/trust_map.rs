//! Peer identity → public key lookup, atomically reloadable.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use arc_swap::ArcSwap;
use ed25519_dalek::VerifyingKey;
use serde::Deserialize;

use crate::error::CryptoError;

#[derive(Debug, Clone, Deserialize)]
struct RawEntry {
    identity: String,
    /// Hex-encoded 32-byte Ed25519 public key.
    public_key_hex: String,
    not_before_ns: u64,
    not_after_ns: Option<u64>,
}

#[derive(Debug, Clone)]
pub struct TrustEntry {
    pub public_key: VerifyingKey,
    pub not_before_ns: u64,
    pub not_after_ns: Option<u64>,
}

impl TrustEntry {
    pub fn valid_at(&self, now_ns: u64) -> bool {
        now_ns >= self.not_before_ns && self.not_after_ns.map_or(true, |end| now_ns < end)
    }
}

/// Static, reloadable mapping from peer identity to Ed25519 public key.
///
/// Reloads are atomic pointer swaps via [`arc_swap::ArcSwap`], so in-flight lookups
/// never observe a torn map.
pub struct TrustMap {
    inner: ArcSwap<HashMap<String, TrustEntry>>,
}

impl TrustMap {
    pub fn empty() -> Self {
        Self {
            inner: ArcSwap::from_pointee(HashMap::new()),
        }
    }

    pub fn from_entries(entries: HashMap<String, TrustEntry>) -> Self {
        Self {
            inner: ArcSwap::from_pointee(entries),
        }
    }

    /// Loads a JSON array of entries from `path` (the `trust_map_path` config value).
    pub fn load_from_file(path: impl AsRef<Path>) -> Result<Self, CryptoError> {
        let path_ref = path.as_ref();
        let text = std::fs::read_to_string(path_ref).map_err(|source| CryptoError::Load {
            path: path_ref.display().to_string(),
            source,
        })?;
        let raw: Vec<RawEntry> = serde_json::from_str(&text)?;
        let mut entries = HashMap::with_capacity(raw.len());
        for r in raw {
            let key_bytes = hex::decode(&r.public_key_hex)
                .map_err(|_| CryptoError::MalformedKey("public_key_hex not valid hex"))?;
            let key_arr: [u8; 32] = key_bytes
                .try_into()
                .map_err(|_| CryptoError::MalformedKey("public key must be 32 bytes"))?;
            let public_key = VerifyingKey::from_bytes(&key_arr)
                .map_err(|_| CryptoError::MalformedKey("invalid Ed25519 public key"))?;
            entries.insert(
                r.identity,
                TrustEntry {
                    public_key,
                    not_before_ns: r.not_before_ns,
                    not_after_ns: r.not_after_ns,
                },
            );
        }
        Ok(Self::from_entries(entries))
    }

    /// Atomically replaces the map in place from `path` without interrupting in-flight
    /// lookups against the previous snapshot.
    pub fn reload_from_file(&self, path: impl AsRef<Path>) -> Result<(), CryptoError> {
        let fresh = Self::load_from_file(path)?;
        self.inner.store(fresh.inner.load_full());
        Ok(())
    }

    /// Looks up `identity`. An absent identity is untrusted: callers should translate
    /// `None` into `UNAUTHORIZED`, never `RETRY`.
    pub fn lookup(&self, identity: &str) -> Option<Arc<TrustEntry>> {
        let snapshot = self.inner.load();
        snapshot.get(identity).cloned().map(Arc::new)
    }

    pub fn len(&self) -> usize {
        self.inner.load().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
