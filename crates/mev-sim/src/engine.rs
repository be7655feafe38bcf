//! Seams between the bundle simulator and whatever executes transactions.
//!
//! The simulator never touches an EVM directly. It reads balances and takes
//! snapshots through [`LedgerState`] and applies transactions through
//! [`ExecutionEngine`]; [`crate::evm`] provides the revm-backed implementation.

use alloy::primitives::{Address, Bytes, U256};
use mev_data::types::{BlockHeader, LogRecord, Transaction};
use std::fmt;

/// Opaque handle returned by [`LedgerState::snapshot`].
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SnapshotId(pub u64);

impl fmt::Display for SnapshotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

#[derive(Debug, thiserror::Error)]
pub enum EngineError {
    /// The transaction could not be executed at all (bad nonce, insufficient funds, ...).
    #[error("invalid transaction: {0}")]
    InvalidTransaction(String),

    #[error("block gas limit reached: requested {requested}, remaining {remaining}")]
    GasLimitReached { requested: u64, remaining: u64 },

    #[error("unknown snapshot {0}")]
    UnknownSnapshot(SnapshotId),

    #[error("state access failed: {0}")]
    Database(String),
}

/// Mutable ledger state the simulator runs against.
///
/// Reverting to a snapshot restores the state as it was when the snapshot was
/// taken and invalidates that snapshot and every later one.
pub trait LedgerState {
    fn balance(&self, address: Address) -> Result<U256, EngineError>;

    fn nonce(&self, address: Address) -> Result<u64, EngineError>;

    fn snapshot(&mut self) -> SnapshotId;

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), EngineError>;
}

/// Outcome of one applied transaction.
///
/// A failed receipt still consumed gas and still changed state (fees were
/// charged); only an `Err` from the engine means nothing happened.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Receipt {
    pub success: bool,
    pub gas_used: u64,
    pub logs: Vec<LogRecord>,
    /// Revert payload returned by the callee, if any.
    pub revert: Option<Bytes>,
    /// Execution error message for failed transactions.
    pub error: Option<String>,
}

/// Applies single transactions to a [`LedgerState`].
pub trait ExecutionEngine {
    type State: LedgerState;

    fn apply_transaction(
        &self,
        state: &mut Self::State,
        header: &BlockHeader,
        tx: &Transaction,
        gas_pool: &mut GasPool,
    ) -> Result<Receipt, EngineError>;
}

/// Block gas remaining for the transactions of one simulation.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct GasPool {
    remaining: u64,
}

impl GasPool {
    pub fn new(limit: u64) -> Self {
        Self { remaining: limit }
    }

    /// Pool sized to the header's gas limit.
    pub fn for_block(header: &BlockHeader) -> Self {
        Self::new(header.gas_limit)
    }

    pub fn remaining(&self) -> u64 {
        self.remaining
    }

    /// Checks that a transaction with `gas_limit` still fits in the block.
    pub fn check(&self, gas_limit: u64) -> Result<(), EngineError> {
        if gas_limit > self.remaining {
            return Err(EngineError::GasLimitReached {
                requested: gas_limit,
                remaining: self.remaining,
            });
        }
        Ok(())
    }

    /// Deducts gas actually used by an executed transaction.
    pub fn consume(&mut self, gas_used: u64) {
        self.remaining = self.remaining.saturating_sub(gas_used);
    }
}
