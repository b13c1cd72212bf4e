//! Ed25519 signing/verification and the peer-identity trust map.

pub mod error;
pub mod signer;
pub mod trust_map;
pub mod verifier;

pub use error::CryptoError;
pub use signer::Signer;
pub use trust_map::{TrustEntry, TrustMap};
pub use verifier::{verify, verify_with_entry};
