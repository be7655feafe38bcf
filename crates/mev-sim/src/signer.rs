//! Transaction signing and nonce sequencing for the strategy's own legs.

use alloy::consensus::{SignableTransaction, TxEnvelope, TxLegacy};
use alloy::eips::eip2718::Encodable2718;
use alloy::network::TxSignerSync;
use alloy::primitives::{Address, Bytes, TxKind, U256};
use alloy::signers::local::PrivateKeySigner;
use mev_data::types::Transaction;

#[derive(Debug, thiserror::Error)]
#[error("signing failed: {0}")]
pub struct SigningError(pub String);

/// Fields of a transaction before signing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct UnsignedTx {
    pub to: Address,
    pub value: U256,
    pub input: Bytes,
    pub gas_limit: u64,
    pub gas_price: u128,
    pub nonce: u64,
}

/// Turns unsigned transactions into signed ledger transactions.
///
/// Key material stays behind this trait.
pub trait Signer {
    fn address(&self) -> Address;

    fn sign(&self, tx: UnsignedTx) -> Result<Transaction, SigningError>;
}

/// Signs EIP-155 legacy transactions with an in-process private key.
#[derive(Clone, Debug)]
pub struct LocalSigner {
    signer: PrivateKeySigner,
    chain_id: u64,
}

impl LocalSigner {
    pub fn new(signer: PrivateKeySigner, chain_id: u64) -> Self {
        Self { signer, chain_id }
    }

    /// Parses a hex private key, with or without `0x`.
    pub fn from_hex(key: &str, chain_id: u64) -> Result<Self, SigningError> {
        let signer = key
            .trim()
            .parse::<PrivateKeySigner>()
            .map_err(|e| SigningError(format!("invalid private key: {e}")))?;
        Ok(Self::new(signer, chain_id))
    }

    pub fn chain_id(&self) -> u64 {
        self.chain_id
    }
}

impl Signer for LocalSigner {
    fn address(&self) -> Address {
        self.signer.address()
    }

    fn sign(&self, unsigned: UnsignedTx) -> Result<Transaction, SigningError> {
        let mut tx = TxLegacy {
            chain_id: Some(self.chain_id),
            nonce: unsigned.nonce,
            gas_price: unsigned.gas_price,
            gas_limit: unsigned.gas_limit,
            to: TxKind::Call(unsigned.to),
            value: unsigned.value,
            input: unsigned.input.clone(),
        };

        let sig = TxSignerSync::sign_transaction_sync(&self.signer, &mut tx)
            .map_err(|e| SigningError(e.to_string()))?;
        let signed: TxEnvelope = tx.into_signed(sig).into();
        let raw = signed.encoded_2718();

        Ok(Transaction {
            hash: *signed.tx_hash(),
            from: self.signer.address(),
            to: Some(unsigned.to),
            value: unsigned.value,
            gas_limit: unsigned.gas_limit,
            gas_price: unsigned.gas_price,
            nonce: unsigned.nonce,
            input: unsigned.input,
            raw: raw.into(),
        })
    }
}

/// Hands out account nonces for the strategy's own transactions.
///
/// At most one reservation is outstanding. The ledger nonce is authoritative:
/// [`NonceManager::sync`] settles the outstanding reservation, so a bundle
/// that never landed does not push later opportunities past the ledger.
#[derive(Debug)]
pub struct NonceManager {
    next: u64,
    outstanding: Option<(u64, u64)>,
}

impl NonceManager {
    pub fn new(next: u64) -> Self {
        Self {
            next,
            outstanding: None,
        }
    }

    pub fn peek(&self) -> u64 {
        self.next
    }

    /// Reserves `count` consecutive nonces and returns the first.
    pub fn reserve(&mut self, count: u64) -> u64 {
        let first = self.next;
        self.next += count;
        self.outstanding = Some((first, count));
        first
    }

    /// Gives back the outstanding reservation; any other range is ignored.
    pub fn release(&mut self, first: u64, count: u64) {
        if self.outstanding == Some((first, count)) {
            self.next = first;
            self.outstanding = None;
        }
    }

    /// Restarts from the account's on-ledger nonce and drops the outstanding reservation.
    pub fn sync(&mut self, ledger_nonce: u64) {
        self.next = ledger_nonce;
        self.outstanding = None;
    }
}
