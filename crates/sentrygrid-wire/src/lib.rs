//! Envelope/Ack data model, canonical byte serialization, and wire codec for the
//! sentrygrid telemetry fabric.

pub mod ack;
pub mod canonical;
pub mod codec;
pub mod envelope;
pub mod error;
pub mod payload;

pub use ack::{Ack, AckStatus};
pub use canonical::canonicalize;
pub use envelope::{Envelope, CURRENT_VERSION, MAX_ENVELOPE_BYTES, MAX_IDEMPOTENCY_KEY_BYTES};
pub use error::WireError;
pub use payload::{
    AuthRecord, DnsRecord, FileChangeRecord, FlowRecord, Payload, PeripheralRecord, ProcessRecord,
};
