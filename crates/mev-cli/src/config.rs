//! TOML configuration for the `mev-sandwich` binary.
//!
//! Only non-secret parameters live here; credentials come from the
//! environment through [`mev_data::secrets::SecretProvider`].

use color_eyre::eyre::{Context, Result};
use mev_data::relay::RelayConfig;
use mev_sim::strategies::sandwich::SandwichConfig;
use mev_sim::strategies::telemetry::TelemetryConfig;
use mev_sim::SimConfig;
use serde::Deserialize;
use std::path::Path;

/// BSC mainnet.
pub const DEFAULT_CHAIN_ID: u64 = 56;

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    pub chain_id: u64,
    pub db_path: String,
    /// Node endpoint for receipt lookups; replay uses the event file instead.
    pub rpc_url: Option<String>,
    pub relay: RelayConfig,
    pub sim: SimConfig,
    pub sandwich: SandwichConfig,
    pub telemetry: TelemetryConfig,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            chain_id: DEFAULT_CHAIN_ID,
            db_path: "data/mev.sqlite".to_string(),
            rpc_url: None,
            relay: RelayConfig::default(),
            sim: SimConfig::default(),
            sandwich: SandwichConfig::default(),
            telemetry: TelemetryConfig::default(),
        }
    }
}

impl AppConfig {
    /// Reads `path`, or returns defaults when no path is given.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            tracing::debug!("no config file given, using defaults");
            return Ok(Self::default());
        };

        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read config {}", path.display()))?;
        let config: Self = toml::from_str(&raw)
            .wrap_err_with(|| format!("invalid config {}", path.display()))?;

        tracing::info!(
            path = %path.display(),
            chain_id = config.chain_id,
            watched = config.sandwich.watch_list.len(),
            "loaded config"
        );
        Ok(config)
    }
}
