//! mev-data: ledger types, telemetry persistence and relay access.

pub mod receipts;
pub mod relay;
pub mod secrets;
pub mod store;
pub mod types;

pub use relay::{BundleSubmission, BundleSubmitter, RelayClient, RelayConfig, RelayError};
pub use store::{DocumentStore, Store};
pub use types::{BlockHeader, LogRecord, ReceiptSummary, Transaction};
