use thiserror::Error;

#[derive(Debug, Error)]
pub enum WireError {
    #[error("missing required field: {0}")]
    MissingField(&'static str),
    #[error("invalid field: {0}")]
    InvalidField(&'static str),
    #[error("unrecognized envelope version: {0}")]
    UnknownVersion(String),
    #[error("envelope exceeds max size of {max} bytes (was {actual})")]
    Oversize { max: usize, actual: usize },
    #[error("prost decode error: {0}")]
    Decode(#[from] prost::DecodeError),
    #[error("prost encode error: {0}")]
    Encode(#[from] prost::EncodeError),
}
