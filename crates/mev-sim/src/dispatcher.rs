//! Single-task event loop feeding the strategy and the telemetry recorder.
//!
//! Pending-transaction batches and log batches arrive on two unbounded
//! queues. Each event is handled to completion before the next one is taken,
//! and the loop owns the only handle to the ledger state.

use mev_data::receipts::ReceiptLookup;
use mev_data::relay::BundleSubmitter;
use mev_data::store::DocumentStore;
use mev_data::types::{BlockHeader, LogRecord, Transaction};
use serde::Serialize;
use tokio::sync::mpsc::UnboundedReceiver;

use crate::engine::ExecutionEngine;
use crate::signer::Signer;
use crate::strategies::sandwich::{PendingOutcome, SandwichStrategy};
use crate::strategies::telemetry::SwapTelemetry;

/// Counters reported when the loop exits.
#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize)]
pub struct DispatchStats {
    pub pending_seen: u64,
    pub watched: u64,
    pub discarded: u64,
    pub submitted: u64,
    pub failed: u64,
    pub log_batches: u64,
    pub swap_events_stored: u64,
}

pub struct Dispatcher<E: ExecutionEngine, S, R, D, L> {
    strategy: SandwichStrategy<E, S, R, D>,
    telemetry: SwapTelemetry<L, D>,
    state: E::State,
    header: BlockHeader,
    stats: DispatchStats,
}

impl<E, S, R, D, L> Dispatcher<E, S, R, D, L>
where
    E: ExecutionEngine,
    S: Signer,
    R: BundleSubmitter,
    D: DocumentStore,
    L: ReceiptLookup,
{
    pub fn new(
        strategy: SandwichStrategy<E, S, R, D>,
        telemetry: SwapTelemetry<L, D>,
        state: E::State,
        header: BlockHeader,
    ) -> Self {
        Self {
            strategy,
            telemetry,
            state,
            header,
            stats: DispatchStats::default(),
        }
    }

    /// Header used for replays and bundle windows from now on.
    pub fn set_header(&mut self, header: BlockHeader) {
        self.header = header;
    }

    pub fn stats(&self) -> &DispatchStats {
        &self.stats
    }

    pub fn state(&self) -> &E::State {
        &self.state
    }

    /// Consumes both queues until each is closed and drained.
    pub async fn run(
        mut self,
        mut pending_rx: UnboundedReceiver<Vec<Transaction>>,
        mut logs_rx: UnboundedReceiver<Vec<LogRecord>>,
    ) -> DispatchStats {
        let mut pending_open = true;
        let mut logs_open = true;

        loop {
            tokio::select! {
                batch = pending_rx.recv(), if pending_open => match batch {
                    Some(txs) => self.handle_pending(&txs).await,
                    None => pending_open = false,
                },
                batch = logs_rx.recv(), if logs_open => match batch {
                    Some(logs) => self.handle_logs(&logs).await,
                    None => logs_open = false,
                },
                else => break,
            }
        }

        tracing::info!(
            pending_seen = self.stats.pending_seen,
            submitted = self.stats.submitted,
            swap_events = self.stats.swap_events_stored,
            "dispatcher stopped"
        );
        self.stats
    }

    /// Runs every transaction of a batch through the strategy, in order.
    pub async fn handle_pending(&mut self, txs: &[Transaction]) {
        for tx in txs {
            self.stats.pending_seen += 1;
            match self
                .strategy
                .on_pending_transaction(&mut self.state, &self.header, tx)
                .await
            {
                Ok(PendingOutcome::Ignored) => {}
                Ok(PendingOutcome::Discarded) => {
                    self.stats.watched += 1;
                    self.stats.discarded += 1;
                }
                Ok(PendingOutcome::Submitted(_)) => {
                    self.stats.watched += 1;
                    self.stats.submitted += 1;
                }
                Err(e) => {
                    self.stats.watched += 1;
                    self.stats.failed += 1;
                    tracing::warn!(tx_hash = %tx.hash, error = %e, "opportunity skipped");
                }
            }
        }
    }

    pub async fn handle_logs(&mut self, logs: &[LogRecord]) {
        self.stats.log_batches += 1;
        match self.telemetry.on_swap_events(logs).await {
            Ok(stored) => self.stats.swap_events_stored += stored as u64,
            Err(e) => tracing::warn!(error = %e, "swap telemetry failed"),
        }
    }
}
