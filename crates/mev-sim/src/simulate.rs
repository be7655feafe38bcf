//! Recursive bundle simulation with per-element producer profit accounting.

use alloy::primitives::{Bytes, B256, I256, U256};
use mev_data::types::BlockHeader;
use serde::{Deserialize, Serialize};

use crate::bundle::{BodyLogs, Bundle, BundleElement, SimulationResult};
use crate::engine::{EngineError, ExecutionEngine, GasPool, LedgerState};

/// Nesting depth allowed when none is configured.
pub const DEFAULT_MAX_DEPTH: usize = 5;

#[derive(Debug, thiserror::Error)]
pub enum SimError {
    #[error("height {height} outside inclusion window [{min}, {max}]")]
    OutOfWindow { height: u64, min: u64, max: u64 },

    #[error("element {index} ({tx_hash}) failed and may not revert: {reason}")]
    ElementFailed {
        index: usize,
        tx_hash: B256,
        reason: String,
    },

    #[error("invalid bundle element: {0}")]
    InvalidElement(String),

    #[error("bundle used no gas; effective price is undefined")]
    ZeroGasUsed,

    #[error(transparent)]
    Engine(#[from] EngineError),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimConfig {
    /// Deepest nesting level accepted; the top-level bundle is depth 0.
    pub max_depth: usize,
}

impl Default for SimConfig {
    fn default() -> Self {
        Self {
            max_depth: DEFAULT_MAX_DEPTH,
        }
    }
}

/// Aggregate of one bundle level before the effective price is derived.
#[derive(Debug, Default)]
struct Partial {
    profit: I256,
    refundable: U256,
    gas_used: u64,
    logs: Vec<BodyLogs>,
    revert: Option<Bytes>,
    exec_error: Option<String>,
}

impl Partial {
    /// Keeps the first revert payload and error seen; later ones are dropped.
    fn capture(&mut self, revert: Option<Bytes>, exec_error: Option<String>) {
        if self.revert.is_none() {
            self.revert = revert;
        }
        if self.exec_error.is_none() {
            self.exec_error = exec_error;
        }
    }

    fn finish(self) -> Result<SimulationResult, SimError> {
        if self.gas_used == 0 {
            return Err(SimError::ZeroGasUsed);
        }
        let effective_price = self.profit / I256::from_raw(U256::from(self.gas_used));
        Ok(SimulationResult {
            total_profit: self.profit,
            refundable_value: self.refundable,
            gas_used: self.gas_used,
            effective_price,
            body_logs: self.logs,
            revert: self.revert,
            exec_error: self.exec_error,
        })
    }
}

/// Executes bundles element by element against an [`ExecutionEngine`].
#[derive(Clone, Debug)]
pub struct BundleSimulator<E> {
    engine: E,
    config: SimConfig,
}

impl<E: ExecutionEngine> BundleSimulator<E> {
    pub fn new(engine: E, config: SimConfig) -> Self {
        Self { engine, config }
    }

    pub fn engine(&self) -> &E {
        &self.engine
    }

    pub fn config(&self) -> &SimConfig {
        &self.config
    }

    /// Simulates `bundle` on top of `state` at `header`.
    ///
    /// The whole bundle tree is validated before anything executes, so a
    /// window, depth or refund violation leaves `state` untouched. On success
    /// the state keeps every applied transaction. On an execution failure the
    /// state keeps whatever ran before it; snapshot first when that matters.
    pub fn simulate(
        &self,
        state: &mut E::State,
        bundle: &Bundle,
        header: &BlockHeader,
        gas_pool: &mut GasPool,
        collect_logs: bool,
    ) -> Result<SimulationResult, SimError> {
        self.validate(bundle, header.number, 0)?;
        let partial = self.run(state, bundle, header, gas_pool, collect_logs)?;

        let result = partial.finish()?;
        tracing::debug!(
            block_number = header.number,
            gas_used = result.gas_used,
            profit = %result.total_profit,
            "simulated bundle"
        );
        Ok(result)
    }

    /// Simulates on a snapshot and always rolls it back.
    pub fn simulate_isolated(
        &self,
        state: &mut E::State,
        bundle: &Bundle,
        header: &BlockHeader,
        gas_pool: &mut GasPool,
        collect_logs: bool,
    ) -> Result<SimulationResult, SimError> {
        let snapshot = state.snapshot();
        let outcome = self.simulate(state, bundle, header, gas_pool, collect_logs);
        state.revert_to(snapshot)?;
        outcome
    }

    fn validate(&self, bundle: &Bundle, height: u64, depth: usize) -> Result<(), SimError> {
        if depth > self.config.max_depth {
            return Err(SimError::InvalidElement(format!(
                "nesting depth {depth} exceeds maximum {}",
                self.config.max_depth
            )));
        }

        let window = bundle.inclusion;
        if !window.contains(height) {
            return Err(SimError::OutOfWindow {
                height,
                min: window.min_height,
                max: window.max_height,
            });
        }

        for constraint in &bundle.validity.refund {
            if constraint.body_idx >= bundle.body.len() {
                return Err(SimError::InvalidElement(format!(
                    "refund references element {} of {}",
                    constraint.body_idx,
                    bundle.body.len()
                )));
            }
            if constraint.percent > 100 {
                return Err(SimError::InvalidElement(format!(
                    "refund percent {} above 100",
                    constraint.percent
                )));
            }
        }

        for element in &bundle.body {
            if let BundleElement::Bundle(inner) = element {
                self.validate(inner, height, depth + 1)?;
            }
        }
        Ok(())
    }

    fn run(
        &self,
        state: &mut E::State,
        bundle: &Bundle,
        header: &BlockHeader,
        gas_pool: &mut GasPool,
        collect_logs: bool,
    ) -> Result<Partial, SimError> {
        let mut partial = Partial::default();
        let track_refunds = !bundle.validity.refund.is_empty();

        for (index, element) in bundle.body.iter().enumerate() {
            let before = state.balance(header.coinbase)?;

            match element {
                BundleElement::Tx { tx, can_revert } => {
                    let receipt = self.engine.apply_transaction(state, header, tx, gas_pool)?;

                    if !receipt.success && !can_revert {
                        return Err(SimError::ElementFailed {
                            index,
                            tx_hash: tx.hash,
                            reason: receipt
                                .error
                                .unwrap_or_else(|| "transaction failed".to_string()),
                        });
                    }

                    partial.gas_used += receipt.gas_used;
                    partial.capture(receipt.revert, receipt.error);
                    if collect_logs {
                        partial.logs.push(BodyLogs::TxLogs(receipt.logs));
                    }
                }
                BundleElement::Bundle(inner) => {
                    let nested = self.run(state, inner, header, gas_pool, collect_logs)?;

                    partial.gas_used += nested.gas_used;
                    partial.capture(nested.revert, nested.exec_error);
                    if collect_logs {
                        partial.logs.push(BodyLogs::BundleLogs(nested.logs));
                    }
                }
            }

            let after = state.balance(header.coinbase)?;
            let delta = I256::from_raw(after.wrapping_sub(before));
            partial.profit += delta;

            if track_refunds && delta.is_positive() && !bundle.validity.is_refund_target(index) {
                partial.refundable += delta.into_raw();
            }
            tracing::trace!(index, delta = %delta, "element applied");
        }

        Ok(partial)
    }
}
