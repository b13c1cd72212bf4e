//! The bus's reply to a publish.

use crate::error::WireError;

#[derive(Clone, Copy, Debug, PartialEq, Eq, prost::Enumeration)]
#[repr(i32)]
pub enum AckStatus {
    Ok = 0,
    Retry = 1,
    Invalid = 2,
    Unauthorized = 3,
}

#[derive(Clone, PartialEq, prost::Message)]
pub struct Ack {
    #[prost(enumeration = "AckStatus", tag = "1")]
    pub status: i32,
    #[prost(string, tag = "2")]
    pub reason: String,
    #[prost(uint32, tag = "3")]
    pub backoff_hint_ms: u32,
}

impl Ack {
    pub fn ok(reason: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Ok as i32,
            reason: reason.into(),
            backoff_hint_ms: 0,
        }
    }

    pub fn retry(reason: impl Into<String>, backoff_hint_ms: u32) -> Self {
        Self {
            status: AckStatus::Retry as i32,
            reason: reason.into(),
            backoff_hint_ms,
        }
    }

    pub fn invalid(reason: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Invalid as i32,
            reason: reason.into(),
            backoff_hint_ms: 0,
        }
    }

    pub fn unauthorized(reason: impl Into<String>) -> Self {
        Self {
            status: AckStatus::Unauthorized as i32,
            reason: reason.into(),
            backoff_hint_ms: 0,
        }
    }

    pub fn status(&self) -> AckStatus {
        AckStatus::from_i32(self.status).unwrap_or(AckStatus::Retry)
    }

    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(prost::Message::encoded_len(self));
        prost::Message::encode(self, &mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, WireError> {
        Ok(<Self as prost::Message>::decode(buf)?)
    }
}
