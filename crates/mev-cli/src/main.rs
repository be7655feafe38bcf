mod config;
mod replay;

use alloy::primitives::{Address, Bytes};
use clap::{ArgAction, Args, Parser, Subcommand};
use color_eyre::eyre::{eyre, Context, Result};
use comfy_table::presets::UTF8_BORDERS_ONLY;
use comfy_table::Table;
use indicatif::{ProgressBar, ProgressStyle};
use mev_data::receipts::RpcReceipts;
use mev_data::relay::{RelayClient, SimulateBundleParams};
use mev_data::secrets::{EnvSecrets, SecretProvider};
use mev_data::store::{Store, SWAP_EVENTS, TRANSACTIONS};
use mev_data::types::BlockHeader;
use mev_sim::bundle::Bundle;
use mev_sim::dispatcher::{DispatchStats, Dispatcher};
use mev_sim::signer::{LocalSigner, Signer};
use mev_sim::strategies::sandwich::SandwichStrategy;
use mev_sim::strategies::telemetry::SwapTelemetry;
use mev_sim::{BundleSimulator, ForkState, GasPool, RevmEngine, SimulationResult};
use std::path::{Path, PathBuf};
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::replay::{ReplayInput, ReplayReceipts, ReplayRelay};

#[derive(Parser, Debug)]
#[command(name = "mev-sandwich")]
#[command(about = "Sandwich bundle simulation and relay submission")]
#[command(version)]
struct Cli {
    #[arg(long, short = 'v', action = ArgAction::Count, global = true)]
    verbose: u8,

    #[arg(long, short = 'q', global = true)]
    quiet: bool,

    /// TOML config file; defaults apply when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Overrides `db_path` from the config file.
    #[arg(long, global = true)]
    db_path: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// List validators currently accepting bundles.
    Validators,
    /// Ask the relay to simulate raw signed transactions as one bundle.
    SimulateRemote(SimulateRemoteArgs),
    /// Simulate a bundle file against a local allocation.
    SimulateLocal(SimulateLocalArgs),
    /// Feed captured pending transactions and logs through the strategy.
    Replay(ReplayArgs),
}

/// Header fields for local execution.
#[derive(Args, Debug, Clone)]
struct HeaderArgs {
    #[arg(long)]
    block: u64,

    /// Unix seconds; defaults to now.
    #[arg(long)]
    timestamp: Option<u64>,

    #[arg(long, default_value_t = Address::ZERO)]
    coinbase: Address,

    #[arg(long, default_value_t = 140_000_000)]
    gas_limit: u64,

    #[arg(long, default_value_t = 0)]
    base_fee: u128,
}

impl HeaderArgs {
    fn header(&self) -> BlockHeader {
        BlockHeader {
            number: self.block,
            timestamp: self.timestamp.unwrap_or_else(now_secs),
            gas_limit: self.gas_limit,
            base_fee: self.base_fee,
            coinbase: self.coinbase,
        }
    }
}

#[derive(Args, Debug)]
struct SimulateRemoteArgs {
    #[arg(long)]
    block: u64,

    /// Raw signed transaction as hex, repeat for each bundle member.
    #[arg(long = "tx", required = true)]
    txs: Vec<String>,

    /// Unix seconds; defaults to now.
    #[arg(long)]
    timestamp: Option<i64>,
}

#[derive(Args, Debug)]
struct SimulateLocalArgs {
    /// JSON allocation seeding the ledger state.
    #[arg(long)]
    alloc: PathBuf,

    /// JSON bundle to simulate.
    #[arg(long)]
    bundle: PathBuf,

    #[command(flatten)]
    header: HeaderArgs,

    /// Output format: table (default) or json.
    #[arg(long, default_value = "table")]
    output: String,
}

#[derive(Args, Debug)]
struct ReplayArgs {
    /// JSON allocation seeding the ledger state.
    #[arg(long)]
    alloc: PathBuf,

    /// JSON-lines event capture.
    #[arg(long)]
    events: PathBuf,

    /// Build and simulate bundles without sending them.
    #[arg(long)]
    dry_run: bool,

    #[command(flatten)]
    header: HeaderArgs,
}

#[tokio::main]
async fn main() -> Result<()> {
    color_eyre::install()?;

    let cli = Cli::parse();
    init_tracing(cli.verbose, cli.quiet)?;

    let mut config = AppConfig::load(cli.config.as_deref())?;
    if let Some(db_path) = cli.db_path {
        config.db_path = db_path;
    }

    match cli.command {
        Commands::Validators => handle_validators(&config).await,
        Commands::SimulateRemote(args) => handle_simulate_remote(&config, args).await,
        Commands::SimulateLocal(args) => handle_simulate_local(&config, args),
        Commands::Replay(args) => handle_replay(&config, args).await,
    }
}

fn init_tracing(verbose: u8, quiet: bool) -> Result<()> {
    let level = if quiet {
        Level::WARN
    } else {
        match verbose {
            0 => Level::INFO,
            1 => Level::DEBUG,
            _ => Level::TRACE,
        }
    };

    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(level.as_str()))
        .wrap_err("failed to initialize tracing filter")?;

    tracing_subscriber::fmt().with_env_filter(filter).init();
    Ok(())
}

fn now_secs() -> u64 {
    u64::try_from(chrono::Utc::now().timestamp()).unwrap_or_default()
}

fn relay_client(config: &AppConfig, secrets: &impl SecretProvider) -> Result<RelayClient> {
    let authorization = secrets
        .relay_authorization()
        .wrap_err("relay credential is required")?;
    RelayClient::new(config.relay.clone(), authorization).wrap_err("failed to build relay client")
}

async fn handle_validators(config: &AppConfig) -> Result<()> {
    let relay = relay_client(config, &EnvSecrets::load())?;
    let validators = relay
        .validators(&relay.next_request_id())
        .await
        .wrap_err("validator query failed")?;

    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["#", "Validator"]);
    for (idx, validator) in validators.iter().enumerate() {
        table.add_row(vec![(idx + 1).to_string(), validator.clone()]);
    }
    println!("{table}");
    info!(
        count = validators.len(),
        network = %config.relay.validators_network,
        "validators listed"
    );
    Ok(())
}

async fn handle_simulate_remote(config: &AppConfig, args: SimulateRemoteArgs) -> Result<()> {
    let relay = relay_client(config, &EnvSecrets::load())?;
    let txs = args
        .txs
        .iter()
        .map(|tx| tx.trim_start_matches("0x").to_string())
        .collect();
    let timestamp = args.timestamp.unwrap_or_else(|| chrono::Utc::now().timestamp());
    let params = SimulateBundleParams::new(
        txs,
        config.relay.bundle_network.clone(),
        args.block,
        timestamp,
    );

    let result = relay
        .simulate_bundle(&relay.next_request_id(), params)
        .await
        .wrap_err("relay simulation failed")?;
    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}

fn handle_simulate_local(config: &AppConfig, args: SimulateLocalArgs) -> Result<()> {
    let mut state = ForkState::from_alloc_file(&args.alloc)?;
    let bundle = read_bundle(&args.bundle)?;
    let header = args.header.header();

    let simulator = BundleSimulator::new(RevmEngine::new(config.chain_id), config.sim.clone());
    let mut gas_pool = GasPool::for_block(&header);
    let result = simulator
        .simulate(&mut state, &bundle, &header, &mut gas_pool, true)
        .wrap_err("bundle simulation failed")?;

    match args.output.as_str() {
        "json" => println!("{}", serde_json::to_string_pretty(&result)?),
        "table" => println!("{}", simulation_table(&result)),
        other => return Err(eyre!("unknown output format '{other}', expected table or json")),
    }
    Ok(())
}

fn read_bundle(path: &Path) -> Result<Bundle> {
    let raw = std::fs::read_to_string(path)
        .wrap_err_with(|| format!("failed to read bundle {}", path.display()))?;
    serde_json::from_str(&raw).wrap_err_with(|| format!("invalid bundle {}", path.display()))
}

fn simulation_table(result: &SimulationResult) -> Table {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Total Profit (wei)".to_string(), result.total_profit.to_string()]);
    table.add_row(vec![
        "Refundable Value (wei)".to_string(),
        result.refundable_value.to_string(),
    ]);
    table.add_row(vec!["Gas Used".to_string(), result.gas_used.to_string()]);
    table.add_row(vec![
        "Effective Price (wei/gas)".to_string(),
        result.effective_price.to_string(),
    ]);
    table.add_row(vec![
        "Top-level Elements".to_string(),
        result.body_logs.len().to_string(),
    ]);
    table.add_row(vec![
        "Revert".to_string(),
        result
            .revert
            .as_ref()
            .map_or_else(|| "-".to_string(), Bytes::to_string),
    ]);
    table.add_row(vec![
        "Error".to_string(),
        result.exec_error.clone().unwrap_or_else(|| "-".to_string()),
    ]);
    table
}

async fn handle_replay(config: &AppConfig, args: ReplayArgs) -> Result<()> {
    let secrets = EnvSecrets::load();
    let signer = LocalSigner::from_hex(
        &secrets.signer_key().wrap_err("signing key is required for replay")?,
        config.chain_id,
    )?;
    let relay = if args.dry_run {
        ReplayRelay::DryRun
    } else {
        ReplayRelay::Live(relay_client(config, &secrets)?)
    };
    let rpc = match &config.rpc_url {
        Some(url) => Some(RpcReceipts::connect(url).await?),
        None => None,
    };

    let state = ForkState::from_alloc_file(&args.alloc)?;
    let input = ReplayInput::from_file(&args.events)?;
    let (pending_rx, logs_rx, recorded) = input.into_channels();
    let store = Store::new(&config.db_path).wrap_err("failed to open SQLite store")?;

    info!(
        signer = %signer.address(),
        block = args.header.block,
        dry_run = args.dry_run,
        "starting replay"
    );

    let simulator = BundleSimulator::new(RevmEngine::new(config.chain_id), config.sim.clone());
    let strategy = SandwichStrategy::new(config.sandwich.clone(), simulator, signer, relay, &store);
    let telemetry = SwapTelemetry::new(
        config.telemetry.clone(),
        ReplayReceipts::new(recorded, rpc),
        &store,
    );
    let dispatcher = Dispatcher::new(strategy, telemetry, state, args.header.header());

    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::with_template("{spinner:.green} {msg}")
            .wrap_err("failed to create progress style")?,
    );
    pb.set_message("replaying captured events");
    pb.enable_steady_tick(std::time::Duration::from_millis(100));

    let stats = dispatcher.run(pending_rx, logs_rx).await;
    pb.finish_with_message("replay complete");

    println!("{}", stats_table(&stats, &store)?);
    Ok(())
}

fn stats_table(stats: &DispatchStats, store: &Store) -> Result<Table> {
    let mut table = Table::new();
    table.load_preset(UTF8_BORDERS_ONLY);
    table.set_header(vec!["Metric", "Value"]);
    table.add_row(vec!["Pending Seen", &stats.pending_seen.to_string()]);
    table.add_row(vec!["Watched", &stats.watched.to_string()]);
    table.add_row(vec!["Discarded", &stats.discarded.to_string()]);
    table.add_row(vec!["Bundles Submitted", &stats.submitted.to_string()]);
    table.add_row(vec!["Failed", &stats.failed.to_string()]);
    table.add_row(vec!["Log Batches", &stats.log_batches.to_string()]);
    table.add_row(vec![
        "Swap Events Stored",
        &stats.swap_events_stored.to_string(),
    ]);
    table.add_row(vec![
        "Stored Transactions (total)",
        &store.count(TRANSACTIONS)?.to_string(),
    ]);
    table.add_row(vec![
        "Stored Swap Events (total)",
        &store.count(SWAP_EVENTS)?.to_string(),
    ]);
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{I256, U256};

    #[test]
    fn header_args_fill_every_field() {
        let cli = Cli::try_parse_from([
            "mev-sandwich",
            "simulate-local",
            "--alloc",
            "alloc.json",
            "--bundle",
            "bundle.json",
            "--block",
            "42",
            "--timestamp",
            "1700000000",
            "--coinbase",
            "0x00000000000000000000000000000000000000cb",
        ])
        .expect("args parse");

        let Commands::SimulateLocal(args) = cli.command else {
            panic!("wrong subcommand");
        };
        let header = args.header.header();
        assert_eq!(header.number, 42);
        assert_eq!(header.timestamp, 1_700_000_000);
        assert_eq!(header.gas_limit, 140_000_000);
        assert_eq!(header.coinbase, Address::left_padding_from(&[0xcb]));
        assert_eq!(args.output, "table");
    }

    #[test]
    fn simulate_remote_requires_a_transaction() {
        let parsed = Cli::try_parse_from(["mev-sandwich", "simulate-remote", "--block", "1"]);
        assert!(parsed.is_err());
    }

    #[test]
    fn replay_flags_are_global_aware() {
        let cli = Cli::try_parse_from([
            "mev-sandwich",
            "replay",
            "--alloc",
            "a.json",
            "--events",
            "e.jsonl",
            "--block",
            "9",
            "--dry-run",
            "-vv",
            "--db-path",
            ":memory:",
        ])
        .expect("args parse");
        assert_eq!(cli.verbose, 2);
        assert_eq!(cli.db_path.as_deref(), Some(":memory:"));
        let Commands::Replay(args) = cli.command else {
            panic!("wrong subcommand");
        };
        assert!(args.dry_run);
    }

    #[test]
    fn simulation_table_shows_aggregates() {
        let result = SimulationResult {
            total_profit: I256::try_from(5i64).expect("fits"),
            refundable_value: U256::ZERO,
            gas_used: 21_000,
            effective_price: I256::ZERO,
            body_logs: Vec::new(),
            revert: None,
            exec_error: None,
        };
        let rendered = simulation_table(&result).to_string();
        assert!(rendered.contains("21000"));
        assert!(rendered.contains("Effective Price"));
    }
}
