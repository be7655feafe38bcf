//! revm-backed ledger state and execution engine.
//!
//! [`ForkState`] is an in-memory `CacheDB` seeded from a genesis-style
//! allocation; snapshots are full clones kept on a stack. [`RevmEngine`]
//! executes one transaction per call with `transact_commit`.

use alloy::primitives::{Address, Bytes, B256, U256};
use eyre::{Context, Result};
use mev_data::types::{BlockHeader, LogRecord, Transaction};
use revm::db::{CacheDB, DatabaseRef, EmptyDB};
use revm::primitives::{
    AccountInfo, BlobExcessGasAndPrice, BlockEnv, Bytecode, EVMError, ExecutionResult, Log,
    TransactTo, TxEnv,
};
use revm::Evm;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;

use crate::engine::{EngineError, ExecutionEngine, GasPool, LedgerState, Receipt, SnapshotId};

/// One account of an allocation file.
#[derive(Clone, Debug, Default, Deserialize)]
pub struct GenesisAccount {
    #[serde(default)]
    pub balance: U256,
    #[serde(default)]
    pub nonce: u64,
    #[serde(default)]
    pub code: Option<Bytes>,
    #[serde(default)]
    pub storage: BTreeMap<U256, U256>,
}

/// Address-keyed account allocation, as found in genesis files.
pub type Alloc = HashMap<Address, GenesisAccount>;

/// Mutable in-memory fork with a stack of snapshots.
#[derive(Clone, Debug, Default)]
pub struct ForkState {
    db: CacheDB<EmptyDB>,
    snapshots: Vec<(SnapshotId, CacheDB<EmptyDB>)>,
    next_snapshot: u64,
}

impl ForkState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Builds a fork holding every account of `alloc`.
    ///
    /// # Errors
    /// Returns error if a storage slot cannot be written.
    pub fn from_alloc(alloc: &Alloc) -> Result<Self> {
        let mut state = Self::new();
        for (address, account) in alloc {
            state.insert_account(*address, account)?;
        }
        tracing::debug!(accounts = alloc.len(), "seeded fork state");
        Ok(state)
    }

    /// Reads a JSON allocation file and seeds a fork from it.
    ///
    /// # Errors
    /// Returns error if the file is unreadable or not a valid allocation.
    pub fn from_alloc_file(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .wrap_err_with(|| format!("failed to read alloc file {}", path.display()))?;
        let alloc: Alloc = serde_json::from_str(&raw)
            .wrap_err_with(|| format!("invalid alloc file {}", path.display()))?;
        Self::from_alloc(&alloc)
    }

    /// Inserts or replaces one account.
    ///
    /// # Errors
    /// Returns error if a storage slot cannot be written.
    pub fn insert_account(&mut self, address: Address, account: &GenesisAccount) -> Result<()> {
        let mut info = AccountInfo {
            balance: account.balance,
            nonce: account.nonce,
            ..Default::default()
        };
        if let Some(code) = &account.code {
            let bytecode = Bytecode::new_raw(code.clone());
            info.code_hash = bytecode.hash_slow();
            info.code = Some(bytecode);
        }
        self.db.insert_account_info(address, info);

        for (slot, value) in &account.storage {
            self.db
                .insert_account_storage(address, *slot, *value)
                .map_err(|e| eyre::eyre!("failed to seed storage of {address}: {e}"))?;
        }
        Ok(())
    }

    /// Credits `amount` to `address`, creating the account if needed.
    pub fn fund(&mut self, address: Address, amount: U256) {
        let mut info = self
            .db
            .basic_ref(address)
            .ok()
            .flatten()
            .unwrap_or_default();
        info.balance = info.balance.saturating_add(amount);
        self.db.insert_account_info(address, info);
    }

    /// Live snapshots, oldest first.
    pub fn snapshot_depth(&self) -> usize {
        self.snapshots.len()
    }

    fn account(&self, address: Address) -> Result<Option<AccountInfo>, EngineError> {
        self.db
            .basic_ref(address)
            .map_err(|e| EngineError::Database(e.to_string()))
    }
}

impl LedgerState for ForkState {
    fn balance(&self, address: Address) -> Result<U256, EngineError> {
        Ok(self.account(address)?.map(|a| a.balance).unwrap_or_default())
    }

    fn nonce(&self, address: Address) -> Result<u64, EngineError> {
        Ok(self.account(address)?.map(|a| a.nonce).unwrap_or_default())
    }

    fn snapshot(&mut self) -> SnapshotId {
        let id = SnapshotId(self.next_snapshot);
        self.next_snapshot += 1;
        self.snapshots.push((id, self.db.clone()));
        id
    }

    fn revert_to(&mut self, id: SnapshotId) -> Result<(), EngineError> {
        let position = self
            .snapshots
            .iter()
            .position(|(taken, _)| *taken == id)
            .ok_or(EngineError::UnknownSnapshot(id))?;

        if let Some((_, db)) = self.snapshots.drain(position..).next() {
            self.db = db;
        }
        tracing::trace!(snapshot = %id, "reverted fork state");
        Ok(())
    }
}

/// Executes transactions with revm against a [`ForkState`].
#[derive(Clone, Copy, Debug)]
pub struct RevmEngine {
    chain_id: u64,
}

impl RevmEngine {
    pub fn new(chain_id: u64) -> Self {
        Self { chain_id }
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }

    fn block_env(header: &BlockHeader) -> BlockEnv {
        BlockEnv {
            number: U256::from(header.number),
            coinbase: header.coinbase,
            timestamp: U256::from(header.timestamp),
            gas_limit: U256::from(header.gas_limit),
            basefee: U256::from(header.base_fee),
            difficulty: U256::ZERO,
            prevrandao: Some(B256::ZERO),
            // revm rejects a Cancun header without blob gas pricing
            blob_excess_gas_and_price: Some(BlobExcessGasAndPrice::new(0, false)),
        }
    }

    /// Maps a ledger transaction to revm's transaction environment.
    fn tx_to_env(tx: &Transaction) -> TxEnv {
        TxEnv {
            caller: tx.from,
            transact_to: tx.to.map_or(TransactTo::Create, TransactTo::Call),
            value: tx.value,
            data: tx.input.clone(),
            gas_limit: tx.gas_limit,
            gas_price: U256::from(tx.gas_price),
            gas_priority_fee: None,
            nonce: Some(tx.nonce),
            ..Default::default()
        }
    }

    fn log_record(log: &Log, tx: &Transaction, header: &BlockHeader) -> LogRecord {
        LogRecord {
            address: log.address,
            topics: log.data.topics().to_vec(),
            data: log.data.data.clone(),
            tx_hash: tx.hash,
            block_hash: B256::ZERO,
            block_number: header.number,
        }
    }
}

impl ExecutionEngine for RevmEngine {
    type State = ForkState;

    fn apply_transaction(
        &self,
        state: &mut ForkState,
        header: &BlockHeader,
        tx: &Transaction,
        gas_pool: &mut GasPool,
    ) -> Result<Receipt, EngineError> {
        gas_pool.check(tx.gas_limit)?;

        let block_env = Self::block_env(header);
        let tx_env = Self::tx_to_env(tx);
        let chain_id = self.chain_id;

        let outcome = {
            let mut evm = Evm::builder()
                .with_db(&mut state.db)
                .modify_cfg_env(|cfg| cfg.chain_id = chain_id)
                .modify_block_env(|block| *block = block_env)
                .modify_tx_env(|env| *env = tx_env)
                .build();
            evm.transact_commit()
        };

        let result = outcome.map_err(|e| match e {
            EVMError::Transaction(invalid) => EngineError::InvalidTransaction(format!("{invalid:?}")),
            other => EngineError::Database(other.to_string()),
        })?;

        let receipt = match result {
            ExecutionResult::Success { gas_used, logs, .. } => Receipt {
                success: true,
                gas_used,
                logs: logs
                    .iter()
                    .map(|log| Self::log_record(log, tx, header))
                    .collect(),
                revert: None,
                error: None,
            },
            ExecutionResult::Revert { gas_used, output } => Receipt {
                success: false,
                gas_used,
                logs: Vec::new(),
                revert: Some(output),
                error: Some("execution reverted".to_string()),
            },
            ExecutionResult::Halt { reason, gas_used } => Receipt {
                success: false,
                gas_used,
                logs: Vec::new(),
                revert: None,
                error: Some(format!("{reason:?}")),
            },
        };

        gas_pool.consume(receipt.gas_used);
        tracing::trace!(
            tx_hash = %tx.hash,
            success = receipt.success,
            gas_used = receipt.gas_used,
            "applied transaction"
        );
        Ok(receipt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    const ALICE: Address = address!("00000000000000000000000000000000000a11ce");
    const BOB: Address = address!("0000000000000000000000000000000000000b0b");
    const PRODUCER: Address = address!("00000000000000000000000000000000000c0ffe");

    fn header() -> BlockHeader {
        BlockHeader {
            number: 100,
            timestamp: 1_700_000_000,
            gas_limit: 30_000_000,
            base_fee: 0,
            coinbase: PRODUCER,
        }
    }

    fn transfer(nonce: u64, value: u64, gas_price: u128) -> Transaction {
        Transaction {
            hash: B256::with_last_byte(nonce as u8 + 1),
            from: ALICE,
            to: Some(BOB),
            value: U256::from(value),
            gas_limit: 21_000,
            gas_price,
            nonce,
            input: Bytes::new(),
            raw: Bytes::new(),
        }
    }

    fn funded() -> ForkState {
        let mut state = ForkState::new();
        state.fund(ALICE, U256::from(10u64).pow(U256::from(18u64)));
        state
    }

    #[test]
    fn transfer_pays_producer_and_recipient() {
        let mut state = funded();
        let mut pool = GasPool::for_block(&header());

        let receipt = RevmEngine::new(1)
            .apply_transaction(&mut state, &header(), &transfer(0, 7, 2), &mut pool)
            .expect("transfer executes");

        assert!(receipt.success);
        assert_eq!(receipt.gas_used, 21_000);
        assert_eq!(state.balance(BOB).expect("balance"), U256::from(7u64));
        assert_eq!(
            state.balance(PRODUCER).expect("balance"),
            U256::from(42_000u64)
        );
        assert_eq!(state.nonce(ALICE).expect("nonce"), 1);
        assert_eq!(pool.remaining(), 30_000_000 - 21_000);
    }

    #[test]
    fn bad_nonce_is_invalid_transaction() {
        let mut state = funded();
        let mut pool = GasPool::for_block(&header());

        let err = RevmEngine::new(1)
            .apply_transaction(&mut state, &header(), &transfer(5, 1, 1), &mut pool)
            .expect_err("nonce gap must be rejected");
        assert!(matches!(err, EngineError::InvalidTransaction(_)));
    }

    #[test]
    fn revert_restores_snapshot_and_drops_later_ones() {
        let mut state = funded();
        let engine = RevmEngine::new(1);
        let mut pool = GasPool::for_block(&header());

        let first = state.snapshot();
        engine
            .apply_transaction(&mut state, &header(), &transfer(0, 9, 1), &mut pool)
            .expect("transfer executes");
        let second = state.snapshot();
        assert_eq!(state.snapshot_depth(), 2);

        state.revert_to(first).expect("live snapshot");
        assert_eq!(state.balance(BOB).expect("balance"), U256::ZERO);
        assert_eq!(state.snapshot_depth(), 0);
        assert!(matches!(
            state.revert_to(second),
            Err(EngineError::UnknownSnapshot(id)) if id == second
        ));
    }

    #[test]
    fn alloc_seeds_code_and_storage() {
        let json = r#"{
            "0x0000000000000000000000000000000000000b0b": {
                "balance": "0x64",
                "nonce": 3,
                "code": "0x60006000fd",
                "storage": { "0x1": "0x2a" }
            }
        }"#;
        let alloc: Alloc = serde_json::from_str(json).expect("alloc parses");
        let state = ForkState::from_alloc(&alloc).expect("alloc seeds");

        assert_eq!(state.balance(BOB).expect("balance"), U256::from(100u64));
        assert_eq!(state.nonce(BOB).expect("nonce"), 3);
        let slot = state
            .db
            .storage_ref(BOB, U256::from(1u64))
            .expect("storage readable");
        assert_eq!(slot, U256::from(42u64));
    }
}
