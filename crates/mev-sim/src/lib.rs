//! mev-sim: bundle simulation and sandwich construction.
//!
//! Bundles (possibly nested) are executed element by element against a
//! mutable ledger state, accumulating the block producer's profit, gas and
//! logs. The sandwich strategy replays watched pending swaps, builds signed
//! front/back/bribe legs around them and submits the bundle to a relay.

pub mod bundle;
pub mod decoder;
pub mod dispatcher;
pub mod engine;
pub mod evm;
pub mod signer;
pub mod simulate;
pub mod strategies;

pub use bundle::{Bundle, BundleElement, InclusionWindow, SimulationResult};
pub use engine::{EngineError, ExecutionEngine, GasPool, LedgerState, Receipt, SnapshotId};
pub use evm::{ForkState, RevmEngine};
pub use simulate::{BundleSimulator, SimConfig, SimError};
