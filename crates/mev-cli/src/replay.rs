//! Offline replay of captured mempool and log events through the dispatcher.
//!
//! Events are JSON lines, one object per line, tagged by `kind`:
//!
//! ```text
//! {"kind":"pending","transactions":[{...}]}
//! {"kind":"logs","logs":[{...}]}
//! {"kind":"receipt","receipt":{...}}
//! ```
//!
//! Receipts are collected up front so telemetry can resolve them no matter
//! where they appear in the file.

use alloy::primitives::B256;
use color_eyre::eyre::{Context, Result};
use mev_data::receipts::{InMemoryReceipts, ReceiptLookup, RpcReceipts};
use mev_data::relay::{
    BundleSubmission, BundleSubmitter, RelayClient, RelayError, SubmitBundleResult,
};
use mev_data::types::{LogRecord, ReceiptSummary, Transaction};
use serde::Deserialize;
use std::io::BufRead;
use std::path::Path;
use tokio::sync::mpsc;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ReplayEvent {
    Pending { transactions: Vec<Transaction> },
    Logs { logs: Vec<LogRecord> },
    Receipt { receipt: ReceiptSummary },
}

#[derive(Deserialize)]
#[serde(rename_all = "lowercase")]
enum EventKind {
    Pending,
    Logs,
    Receipt,
}

#[derive(Deserialize)]
struct EventHeader {
    kind: EventKind,
}

#[derive(Deserialize)]
struct PendingBody {
    transactions: Vec<Transaction>,
}

#[derive(Deserialize)]
struct LogsBody {
    logs: Vec<LogRecord>,
}

#[derive(Deserialize)]
struct ReceiptBody {
    receipt: ReceiptSummary,
}

impl ReplayEvent {
    /// Parses one event line.
    ///
    /// The `kind` is read first and the line is then decoded straight into
    /// its body type. Internally tagged enums buffer the whole object, and
    /// that buffer cannot hold the `u128` gas prices.
    pub fn parse(line: &str) -> serde_json::Result<Self> {
        let header: EventHeader = serde_json::from_str(line)?;
        Ok(match header.kind {
            EventKind::Pending => {
                let body: PendingBody = serde_json::from_str(line)?;
                Self::Pending {
                    transactions: body.transactions,
                }
            }
            EventKind::Logs => {
                let body: LogsBody = serde_json::from_str(line)?;
                Self::Logs { logs: body.logs }
            }
            EventKind::Receipt => {
                let body: ReceiptBody = serde_json::from_str(line)?;
                Self::Receipt {
                    receipt: body.receipt,
                }
            }
        })
    }
}

/// Parsed event file, split by destination.
#[derive(Debug, Default)]
pub struct ReplayInput {
    pub pending: Vec<Vec<Transaction>>,
    pub logs: Vec<Vec<LogRecord>>,
    pub receipts: InMemoryReceipts,
}

impl ReplayInput {
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut input = Self::default();
        for (idx, line) in reader.lines().enumerate() {
            let line = line.wrap_err("failed to read event line")?;
            let line = line.trim();
            if line.is_empty() || line.starts_with('#') {
                continue;
            }
            let event = ReplayEvent::parse(line)
                .wrap_err_with(|| format!("invalid event on line {}", idx + 1))?;
            match event {
                ReplayEvent::Pending { transactions } => input.pending.push(transactions),
                ReplayEvent::Logs { logs } => input.logs.push(logs),
                ReplayEvent::Receipt { receipt } => input.receipts.insert(receipt),
            }
        }
        Ok(input)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let file = std::fs::File::open(path)
            .wrap_err_with(|| format!("failed to open events {}", path.display()))?;
        let input = Self::from_reader(std::io::BufReader::new(file))?;
        tracing::info!(
            path = %path.display(),
            pending_batches = input.pending.len(),
            log_batches = input.logs.len(),
            receipts = input.receipts.len(),
            "loaded replay events"
        );
        Ok(input)
    }

    /// Queues every batch and closes both channels, so the dispatcher stops once drained.
    pub fn into_channels(
        self,
    ) -> (
        mpsc::UnboundedReceiver<Vec<Transaction>>,
        mpsc::UnboundedReceiver<Vec<LogRecord>>,
        InMemoryReceipts,
    ) {
        let (pending_tx, pending_rx) = mpsc::unbounded_channel();
        let (logs_tx, logs_rx) = mpsc::unbounded_channel();
        for batch in self.pending {
            // receivers are alive until we return
            let _ = pending_tx.send(batch);
        }
        for batch in self.logs {
            let _ = logs_tx.send(batch);
        }
        (pending_rx, logs_rx, self.receipts)
    }
}

/// Receipts from the event file, falling back to a node when one is configured.
pub struct ReplayReceipts {
    recorded: InMemoryReceipts,
    rpc: Option<RpcReceipts>,
}

impl ReplayReceipts {
    pub fn new(recorded: InMemoryReceipts, rpc: Option<RpcReceipts>) -> Self {
        Self { recorded, rpc }
    }
}

impl ReceiptLookup for ReplayReceipts {
    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>> {
        if let Some(receipt) = self.recorded.receipt(tx_hash).await? {
            return Ok(Some(receipt));
        }
        match &self.rpc {
            Some(rpc) => rpc.receipt(tx_hash).await,
            None => Ok(None),
        }
    }
}

/// Where built bundles go during a replay.
pub enum ReplayRelay {
    Live(RelayClient),
    /// Logs the bundle and reports no hash.
    DryRun,
}

impl BundleSubmitter for ReplayRelay {
    async fn submit_bundle(
        &self,
        submission: BundleSubmission,
    ) -> Result<SubmitBundleResult, RelayError> {
        match self {
            Self::Live(client) => client.submit_bundle(submission).await,
            Self::DryRun => {
                tracing::info!(
                    block_number = submission.block_number,
                    blocks_count = submission.blocks_count,
                    tx_count = submission.transactions.len(),
                    reverting = submission.reverting_hashes.len(),
                    "dry run, bundle not sent"
                );
                Ok(SubmitBundleResult { bundle_hash: None })
            }
        }
    }
}
