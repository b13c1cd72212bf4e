use thiserror::Error;

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("failed to load key material: {0}")]
    KeyLoad(String),
    #[error("failed to build TLS client: {0}")]
    Tls(#[from] reqwest::Error),
    #[error("WAL error: {0}")]
    Wal(#[from] sentrygrid_wal::WalError),
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
}

/// The bounded set of outcomes a publish attempt can produce, mirroring the ack statuses
/// the bus can return plus transport-layer failure.
#[derive(Debug, Clone)]
pub enum PublishOutcome {
    Ok,
    Retry { reason: String, backoff_hint_ms: u32 },
    Invalid { reason: String },
    Unauthorized { reason: String },
    Transport(String),
}
