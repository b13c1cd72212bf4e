mod error;
mod record;
mod wal;

pub use error::WalError;
pub use record::{RecordState, WalRecord};
pub use wal::{AppendOutcome, Wal, WalConfig};
