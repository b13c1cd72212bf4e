//! The envelope: the unit of transport between an agent and the event bus.

use crate::error::WireError;
use crate::payload::Payload;

/// Format tag recognized by this implementation. Any other `version` value is INVALID.
pub const CURRENT_VERSION: &str = "v1";

/// Maximum serialized envelope size. Exceeding this is INVALID.
pub const MAX_ENVELOPE_BYTES: usize = 131_072;

/// Maximum length of `idempotency_key` in bytes.
pub const MAX_IDEMPOTENCY_KEY_BYTES: usize = 128;

#[derive(Clone, PartialEq, prost::Message)]
pub struct Envelope {
    #[prost(string, tag = "1")]
    pub version: String,
    #[prost(uint64, tag = "2")]
    pub timestamp_ns: u64,
    #[prost(string, tag = "3")]
    pub idempotency_key: String,
    #[prost(string, tag = "4")]
    pub source_identity: String,
    #[prost(oneof = "Payload", tags = "5,6,7,8,9,10")]
    pub payload: Option<Payload>,
    #[prost(bytes, tag = "11")]
    pub signature: Vec<u8>,
    /// Signature of the previous envelope from the same source. Preserved for
    /// out-of-band chain verification; never enforced by the core.
    #[prost(bytes, tag = "12")]
    pub prev_signature: Vec<u8>,
}

impl Envelope {
    /// Structural validation: required fields present and non-empty, version recognized,
    /// idempotency key within bounds, payload present and valid, serialized size within
    /// bound. Does not check signature or identity binding — those are separate steps in
    /// the bus's admission pipeline.
    pub fn validate_structure(&self) -> Result<(), WireError> {
        if self.version.is_empty() {
            return Err(WireError::MissingField("version"));
        }
        if self.version != CURRENT_VERSION {
            return Err(WireError::UnknownVersion(self.version.clone()));
        }
        if self.idempotency_key.is_empty() {
            return Err(WireError::MissingField("idempotency_key"));
        }
        if self.idempotency_key.len() > MAX_IDEMPOTENCY_KEY_BYTES {
            return Err(WireError::InvalidField("idempotency_key"));
        }
        if self.source_identity.is_empty() {
            return Err(WireError::MissingField("source_identity"));
        }
        if self.timestamp_ns == 0 {
            return Err(WireError::MissingField("timestamp_ns"));
        }
        let payload = self
            .payload
            .as_ref()
            .ok_or(WireError::MissingField("payload"))?;
        payload.validate()?;

        let size = prost::Message::encoded_len(self);
        if size > MAX_ENVELOPE_BYTES {
            return Err(WireError::Oversize {
                max: MAX_ENVELOPE_BYTES,
                actual: size,
            });
        }
        Ok(())
    }

    /// Encode to the wire representation (length-prefix-free; framing is the codec's job).
    pub fn to_bytes(&self) -> Result<Vec<u8>, WireError> {
        let mut buf = Vec::with_capacity(prost::Message::encoded_len(self));
        prost::Message::encode(self, &mut buf)?;
        Ok(buf)
    }

    pub fn from_bytes(buf: &[u8]) -> Result<Self, WireError> {
        Ok(<Self as prost::Message>::decode(buf)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::payload::FlowRecord;

    fn sample() -> Envelope {
        Envelope {
            version: CURRENT_VERSION.to_string(),
            timestamp_ns: 1,
            idempotency_key: "k1".to_string(),
            source_identity: "agent-1".to_string(),
            payload: Some(Payload::Flow(FlowRecord {
                src_ip: "10.0.0.1".into(),
                dst_ip: "10.0.0.2".into(),
                src_port: 1,
                dst_port: 2,
                protocol: "tcp".into(),
                bytes_sent: 0,
                bytes_recv: 0,
            })),
            signature: vec![0u8; 64],
            prev_signature: vec![],
        }
    }

    #[test]
    fn rejects_unrecognized_version() {
        let mut e = sample();
        e.version = "v99".to_string();
        assert!(matches!(
            e.validate_structure(),
            Err(WireError::UnknownVersion(_))
        ));
    }

    #[test]
    fn rejects_missing_payload() {
        let mut e = sample();
        e.payload = None;
        assert!(e.validate_structure().is_err());
    }

    #[test]
    fn rejects_oversize_idempotency_key() {
        let mut e = sample();
        e.idempotency_key = "k".repeat(MAX_IDEMPOTENCY_KEY_BYTES + 1);
        assert!(e.validate_structure().is_err());
    }

    #[test]
    fn accepts_well_formed_envelope() {
        assert!(sample().validate_structure().is_ok());
    }

    #[test]
    fn roundtrips_through_wire_bytes() {
        let e = sample();
        let bytes = e.to_bytes().unwrap();
        let back = Envelope::from_bytes(&bytes).unwrap();
        assert_eq!(e, back);
    }
}
