use serde::{Deserialize, Serialize};

/// On-disk representation of one envelope awaiting delivery to the bus.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WalRecord {
    pub idempotency_key: String,
    pub serialized_envelope: Vec<u8>,
    pub retry_count: u32,
    pub last_attempt_ns: u64,
    pub created_ns: u64,
    pub state: RecordState,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum RecordState {
    Pending,
    InFlight,
    Delivered,
}
