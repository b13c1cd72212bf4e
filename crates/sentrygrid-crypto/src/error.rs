use thiserror::Error;

#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("signature verification failed")]
    BadSignature,
    #[error("no trust-map entry for identity {0:?}")]
    UnknownIdentity(String),
    #[error("trust-map entry for {identity:?} is not yet valid or has expired")]
    IdentityNotValid { identity: String },
    #[error("malformed key material: {0}")]
    MalformedKey(&'static str),
    #[error("failed to load trust map from {path}: {source}")]
    Load {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse trust map: {0}")]
    Parse(#[from] serde_json::Error),
}
