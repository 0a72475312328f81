//! File-backed persistence: the tuning state document and the receipt log.

pub mod receipts;
pub mod state;

pub use receipts::{AdaptationReceipt, AdaptationRecord, ReceiptLog, ReceiptRecord, RoundReceipt};
pub use state::{PersistedState, StateStore};
