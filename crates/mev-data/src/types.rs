//! Type definitions for ledger data consumed by the sandwich engine.

use alloy::primitives::{Address, Bytes, B256, U256};
use serde::{Deserialize, Serialize};

/// A ledger transaction, either observed pending or produced by the signer.
///
/// Every bundle leaf is one of these. `raw` holds the signed EIP-2718 bytes
/// that are forwarded to the relay untouched.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Transaction hash.
    pub hash: B256,
    /// Sender address (recovered or known from the signer).
    pub from: Address,
    /// Recipient address (None for contract creation).
    pub to: Option<Address>,
    /// Value transferred in Wei.
    pub value: U256,
    /// Gas limit.
    pub gas_limit: u64,
    /// Gas price in Wei.
    pub gas_price: u128,
    /// Sender nonce.
    pub nonce: u64,
    /// Call data.
    #[serde(default)]
    pub input: Bytes,
    /// Signed raw transaction bytes.
    #[serde(default)]
    pub raw: Bytes,
}

impl Transaction {
    /// Raw bytes as lowercase hex without the `0x` prefix, the form relays expect.
    pub fn raw_hex(&self) -> String {
        alloy::hex::encode(&self.raw)
    }
}

/// Header context a bundle is simulated under.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockHeader {
    /// Block height.
    pub number: u64,
    /// Timestamp in unix seconds.
    pub timestamp: u64,
    /// Block gas limit.
    pub gas_limit: u64,
    /// Base fee per gas in Wei.
    #[serde(default)]
    pub base_fee: u128,
    /// Block producer (coinbase) receiving fees and bribes.
    pub coinbase: Address,
}

/// Event log delivered by the log subscription or emitted during execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct LogRecord {
    /// Emitting contract.
    pub address: Address,
    /// Indexed topics; topic0 is the event signature.
    pub topics: Vec<B256>,
    /// Non-indexed data.
    #[serde(default)]
    pub data: Bytes,
    /// Transaction that emitted this log.
    #[serde(default)]
    pub tx_hash: B256,
    /// Block containing the transaction (zero while pending).
    #[serde(default)]
    pub block_hash: B256,
    /// Block number containing the transaction.
    #[serde(default)]
    pub block_number: u64,
}

/// Receipt fields needed for swap telemetry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReceiptSummary {
    /// Transaction hash.
    pub tx_hash: B256,
    /// Sender address.
    pub from: Address,
    /// Recipient (None for contract creation).
    pub to: Option<Address>,
    /// Gas consumed.
    pub gas_used: u64,
    /// Effective gas price paid in Wei.
    pub effective_gas_price: u128,
    /// Timestamp of the including block in unix seconds.
    pub block_timestamp: u64,
}

/// Document written to the `transactions` collection for watched pending txs.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct PendingTxDoc {
    pub hash: String,
    pub to: String,
    pub value: String,
    pub gas: u64,
    #[serde(rename = "gasPrice")]
    pub gas_price: String,
    pub nonce: u64,
    /// RFC 3339 observation time.
    pub timestamp: String,
}

impl PendingTxDoc {
    /// Builds the document for a watched transaction observed at `timestamp`.
    pub fn from_tx(tx: &Transaction, timestamp: String) -> Self {
        Self {
            hash: tx.hash.to_string(),
            to: tx.to.map(|to| to.to_checksum(None)).unwrap_or_default(),
            value: tx.value.to_string(),
            gas: tx.gas_limit,
            gas_price: tx.gas_price.to_string(),
            nonce: tx.nonce,
            timestamp,
        }
    }
}

/// Sender and recipient of the transaction that emitted a swap.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TxInfo {
    pub transaction_hash: String,
    pub from: String,
    pub to: String,
}

/// Document written to the `swap_events` collection.
///
/// Scaled amounts assume 18 decimals on both legs; the `_origin` fields keep
/// the raw on-chain integers as decimal strings so nothing is truncated.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SwapEventDoc {
    pub pair: String,
    pub token0: String,
    pub token1: String,
    pub transaction_info: TxInfo,
    pub sender: String,
    pub recipient: String,
    pub tick: i32,
    pub amount0: f64,
    pub amount0_origin: String,
    pub amount1: f64,
    pub amount1_origin: String,
    pub sqrt_price_x96: String,
    pub liquidity: String,
    pub fee_amount0: f64,
    pub fee_amount0_origin: String,
    pub fee_amount1: f64,
    pub fee_amount1_origin: String,
    /// Realized fee ratio on the net-positive leg.
    pub fee: f64,
    pub gas_fee: String,
    pub gas_used: u64,
    pub gas_price: String,
    /// RFC 3339 block timestamp.
    pub timestamp: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::address;

    #[test]
    fn raw_hex_has_no_prefix() {
        let tx = Transaction {
            hash: B256::ZERO,
            from: Address::ZERO,
            to: None,
            value: U256::ZERO,
            gas_limit: 21_000,
            gas_price: 1,
            nonce: 0,
            input: Bytes::new(),
            raw: Bytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        };
        assert_eq!(tx.raw_hex(), "deadbeef");
    }

    #[test]
    fn pending_doc_uses_checksum_destination() {
        let tx = Transaction {
            hash: B256::repeat_byte(0x11),
            from: Address::ZERO,
            to: Some(address!("36696169C63e42cd08ce11f5deeBbCeBae652050")),
            value: U256::from(5u64),
            gas_limit: 300_000,
            gas_price: 1_000_000_000,
            nonce: 7,
            input: Bytes::new(),
            raw: Bytes::new(),
        };
        let doc = PendingTxDoc::from_tx(&tx, "2024-01-01T00:00:00+00:00".to_string());
        assert_eq!(doc.to, "0x36696169C63e42cd08ce11f5deeBbCeBae652050");
        assert_eq!(doc.value, "5");
        assert_eq!(doc.gas_price, "1000000000");
        assert_eq!(doc.nonce, 7);

        let json = serde_json::to_value(&doc).expect("doc serializes");
        assert!(json.get("gasPrice").is_some());
    }
}
