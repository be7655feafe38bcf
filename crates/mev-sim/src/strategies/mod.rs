//! Strategies driven by the dispatcher.

pub mod sandwich;
pub mod telemetry;
