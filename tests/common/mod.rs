//! Shared test helpers and utilities.
//!
//! Provides a scripted ledger and execution engine, factory functions for
//! transactions and headers, and a loopback HTTP responder for relay tests.

#![allow(dead_code)]

use alloy::primitives::{aliases::I24, aliases::U160, Address, Bytes, B256, I256, U256};
use alloy::sol_types::SolEvent;
use mev_data::relay::{BundleSubmission, BundleSubmitter, RelayError, SubmitBundleResult};
use mev_data::store::Store;
use mev_data::types::{BlockHeader, LogRecord, Transaction};
use mev_sim::decoder::Swap;
use mev_sim::{EngineError, ExecutionEngine, GasPool, LedgerState, Receipt, SnapshotId};
use std::cell::RefCell;
use std::collections::HashMap;
use std::rc::Rc;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

/// Block producer used by every sample header.
pub const PRODUCER: Address = Address::new([0xc0; 20]);

/// Signing key of the strategy account in sandwich tests.
pub const STRATEGY_KEY: &str =
    "0x59c6995e998f97a5a0044966f0945389dc9e86dae88c7a8412f4603b6b78690d";

/// Creates an in-memory SQLite Store for integration tests.
///
/// # Panics
/// Panics if the in-memory database cannot be created (should never happen).
pub fn test_store() -> Store {
    Store::new(":memory:").expect("in-memory store should always open")
}

pub fn sample_header(number: u64) -> BlockHeader {
    BlockHeader {
        number,
        timestamp: 1_700_000_000 + number * 3, // ~3 second blocks
        gas_limit: 140_000_000,
        base_fee: 0,
        coinbase: PRODUCER,
    }
}

/// Plain value transfer with a hash derived from `id`.
pub fn sample_tx(id: u8, from: Address, to: Address, value: u64) -> Transaction {
    Transaction {
        hash: B256::with_last_byte(id),
        from,
        to: Some(to),
        value: U256::from(value),
        gas_limit: 21_000,
        gas_price: 0,
        nonce: 0,
        input: Bytes::new(),
        raw: Bytes::from(vec![0xf8, id]),
    }
}

/// Pool `Swap` log emitted by `pool` with the given pool-side amounts.
pub fn swap_log(pool: Address, tx_hash: B256, amount0: I256, amount1: I256) -> LogRecord {
    let event = Swap {
        sender: Address::repeat_byte(0x11),
        recipient: Address::repeat_byte(0x22),
        amount0,
        amount1,
        sqrtPriceX96: U160::from(1u64) << 96,
        liquidity: 5_000_000,
        tick: I24::ZERO,
        protocolFeesToken0: 250,
        protocolFeesToken1: 0,
    };
    let data = event.encode_log_data();
    LogRecord {
        address: pool,
        topics: data.topics().to_vec(),
        data: data.data,
        tx_hash,
        block_hash: B256::ZERO,
        block_number: 0,
    }
}

/// `n` whole units with 18 decimals.
pub fn ether(n: u64) -> U256 {
    U256::from(n) * U256::from(1_000_000_000_000_000_000u64)
}

/// Balances and nonces with a snapshot stack.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ScriptedState {
    pub balances: HashMap<Address, U256>,
    pub nonces: HashMap<Address, u64>,
    snapshots: Vec<(SnapshotId, HashMap<Address, U256>, HashMap<Address, u64>)>,
    next_snapshot: u64,
}

impl ScriptedState {
    pub fn fund(&mut self, address: Address, amount: U256) {
        *self.balances.entry(address).or_default() += amount;
    }

    pub fn set_nonce(&mut self, address: Address, nonce: u64) {
        self.nonces.insert(address, nonce);
    }

    pub fn snapshot_depth(&self) -> usize {
        self.snapshots.len()
    }
}

impl LedgerState for ScriptedState {
    fn balance(&self, address: Address) -> Result<U256, EngineError> {
        Ok(self.balances.get(&address).copied().unwrap_or_default())
    }

    fn nonce(&self, address: Address) -> Result<u64, EngineError> {
        Ok(self.nonces.get(&address).copied().unwrap_or_default())
    }

    fn snapshot(&mut self) -> SnapshotId {
        let id = SnapshotId(self.next_snapshot);
        self.next_snapshot += 1;
        self.snapshots
            .push((id, self.balances.clone(), self.nonces.clone()));
        id
    }

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), EngineError> {
        let pos = self
            .snapshots
            .iter()
            .position(|(snap, _, _)| *snap == id)
            .ok_or(EngineError::UnknownSnapshot(id))?;
        let (_, balances, nonces) = self.snapshots.swap_remove(pos);
        self.snapshots.truncate(pos);
        self.balances = balances;
        self.nonces = nonces;
        Ok(())
    }
}

/// Predetermined outcome for one transaction hash.
#[derive(Clone, Debug, Default)]
pub struct Scripted {
    pub success: bool,
    pub gas_used: u64,
    /// Paid straight to the header's coinbase.
    pub producer_payment: U256,
    pub logs: Vec<LogRecord>,
    pub revert: Option<Bytes>,
    pub error: Option<String>,
}

impl Scripted {
    pub fn ok(gas_used: u64) -> Self {
        Self {
            success: true,
            gas_used,
            ..Default::default()
        }
    }

    pub fn failed(gas_used: u64, error: &str) -> Self {
        Self {
            success: false,
            gas_used,
            revert: Some(Bytes::from_static(&[0x08, 0xc3, 0x79, 0xa0])),
            error: Some(error.to_string()),
            ..Default::default()
        }
    }

    pub fn paying(mut self, amount: U256) -> Self {
        self.producer_payment = amount;
        self
    }

    pub fn with_logs(mut self, logs: Vec<LogRecord>) -> Self {
        self.logs = logs;
        self
    }
}

/// Engine whose receipts come from a script keyed by transaction hash.
///
/// Every transaction must carry its sender's ledger nonce. Unscripted
/// transactions are value transfers that use exactly their gas limit.
/// Every applied hash is recorded in order.
#[derive(Debug, Default)]
pub struct ScriptedEngine {
    script: HashMap<B256, Scripted>,
    applied: RefCell<Vec<B256>>,
}

impl ScriptedEngine {
    pub fn script(mut self, hash: B256, outcome: Scripted) -> Self {
        self.script.insert(hash, outcome);
        self
    }

    pub fn applied(&self) -> Vec<B256> {
        self.applied.borrow().clone()
    }
}

impl ExecutionEngine for ScriptedEngine {
    type State = ScriptedState;

    fn apply_transaction(
        &self,
        state: &mut ScriptedState,
        header: &BlockHeader,
        tx: &Transaction,
        gas_pool: &mut GasPool,
    ) -> Result<Receipt, EngineError> {
        gas_pool.check(tx.gas_limit)?;

        let expected = state.nonce(tx.from)?;
        if tx.nonce != expected {
            return Err(EngineError::InvalidTransaction(format!(
                "nonce {} of {} does not match ledger nonce {expected}",
                tx.nonce, tx.hash
            )));
        }

        let receipt = match self.script.get(&tx.hash) {
            Some(outcome) => {
                if !outcome.producer_payment.is_zero() {
                    state.fund(header.coinbase, outcome.producer_payment);
                }
                Receipt {
                    success: outcome.success,
                    gas_used: outcome.gas_used,
                    logs: outcome.logs.clone(),
                    revert: outcome.revert.clone(),
                    error: outcome.error.clone(),
                }
            }
            None => {
                let balance = state.balance(tx.from)?;
                if balance < tx.value {
                    return Err(EngineError::InvalidTransaction(format!(
                        "insufficient funds for {}",
                        tx.hash
                    )));
                }
                state.balances.insert(tx.from, balance - tx.value);
                if let Some(to) = tx.to {
                    state.fund(to, tx.value);
                }
                Receipt {
                    success: true,
                    gas_used: tx.gas_limit,
                    ..Default::default()
                }
            }
        };

        *state.nonces.entry(tx.from).or_default() += 1;
        gas_pool.consume(receipt.gas_used);
        self.applied.borrow_mut().push(tx.hash);
        Ok(receipt)
    }
}

/// Relay double that keeps every submission and answers with a fixed hash.
#[derive(Clone, Debug, Default)]
pub struct RecordingRelay {
    pub submissions: Rc<RefCell<Vec<BundleSubmission>>>,
}

impl BundleSubmitter for RecordingRelay {
    async fn submit_bundle(
        &self,
        submission: BundleSubmission,
    ) -> Result<SubmitBundleResult, RelayError> {
        self.submissions.borrow_mut().push(submission);
        Ok(SubmitBundleResult {
            bundle_hash: Some("0xb0b".to_string()),
        })
    }
}

/// Serves exactly one HTTP request on a loopback port.
///
/// Returns the base URL and a handle yielding the raw request (head and body).
pub async fn one_shot_responder(status: u16, body: String) -> (String, JoinHandle<String>) {
    let listener = TcpListener::bind("127.0.0.1:0")
        .await
        .expect("loopback bind");
    let url = format!("http://{}", listener.local_addr().expect("local addr"));

    let handle = tokio::spawn(async move {
        let (mut socket, _) = listener.accept().await.expect("accept");
        let request = read_request(&mut socket).await;

        let response = format!(
            "HTTP/1.1 {status} Status\r\ncontent-type: application/json\r\ncontent-length: {}\r\nconnection: close\r\n\r\n{body}",
            body.len()
        );
        socket
            .write_all(response.as_bytes())
            .await
            .expect("write response");
        socket.shutdown().await.ok();
        request
    });

    (url, handle)
}

async fn read_request(socket: &mut tokio::net::TcpStream) -> String {
    let mut buf = Vec::new();
    let mut chunk = [0u8; 4096];
    loop {
        let n = socket.read(&mut chunk).await.expect("read request");
        if n == 0 {
            break;
        }
        buf.extend_from_slice(&chunk[..n]);

        let text = String::from_utf8_lossy(&buf);
        if let Some(head_end) = text.find("\r\n\r\n") {
            let content_length = text[..head_end]
                .lines()
                .find_map(|line| {
                    let (name, value) = line.split_once(':')?;
                    name.eq_ignore_ascii_case("content-length")
                        .then(|| value.trim().parse::<usize>().ok())
                        .flatten()
                })
                .unwrap_or(0);
            if buf.len() >= head_end + 4 + content_length {
                break;
            }
        }
    }
    String::from_utf8_lossy(&buf).into_owned()
}
