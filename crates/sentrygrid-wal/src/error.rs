use thiserror::Error;

#[derive(Debug, Error)]
pub enum WalError {
    #[error("wal storage I/O error: {0}")]
    Io(#[from] sled::Error),
    #[error("failed to (de)serialize wal record: {0}")]
    Serde(#[from] serde_json::Error),
}
