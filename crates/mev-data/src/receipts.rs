//! Receipt lookups for swap telemetry.
//!
//! The live implementation asks the node over HTTP via the Alloy provider;
//! replay uses a map filled from the event file.

use alloy::primitives::B256;
use alloy::providers::{Provider, RootProvider};
use eyre::{Context, Result};
use std::collections::HashMap;

use crate::types::ReceiptSummary;

/// Resolves the receipt fields telemetry needs for a mined transaction.
#[allow(async_fn_in_trait)]
pub trait ReceiptLookup {
    /// Returns `Ok(None)` when the node does not know the transaction.
    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>>;
}

/// Fetches receipts and block timestamps from an RPC endpoint.
pub struct RpcReceipts {
    provider: RootProvider,
}

impl RpcReceipts {
    /// Connects to the RPC endpoint and checks it answers `eth_blockNumber`.
    ///
    /// # Errors
    /// Returns error if the URL is malformed or the node is unreachable.
    #[tracing::instrument(skip_all, fields(rpc_url = %rpc_url))]
    pub async fn connect(rpc_url: &str) -> Result<Self> {
        let provider = RootProvider::new_http(rpc_url.parse().wrap_err("invalid RPC URL format")?);

        let block_number = provider
            .get_block_number()
            .await
            .wrap_err("failed to test RPC connectivity with eth_blockNumber")?;
        tracing::info!(latest_block = block_number, "RPC connection successful");

        Ok(Self { provider })
    }
}

impl ReceiptLookup for RpcReceipts {
    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>> {
        let receipt = match self
            .provider
            .get_transaction_receipt(tx_hash)
            .await
            .wrap_err_with(|| format!("failed to fetch receipt {tx_hash}"))?
        {
            Some(receipt) => receipt,
            None => return Ok(None),
        };

        let block_timestamp = match receipt.block_hash {
            Some(block_hash) => self
                .provider
                .get_block_by_hash(block_hash)
                .await
                .wrap_err_with(|| format!("failed to fetch block {block_hash}"))?
                .map(|block| block.header.timestamp)
                .unwrap_or_default(),
            None => 0,
        };

        Ok(Some(ReceiptSummary {
            tx_hash,
            from: receipt.from,
            to: receipt.to,
            gas_used: receipt.gas_used,
            effective_gas_price: receipt.effective_gas_price,
            block_timestamp,
        }))
    }
}

/// Receipts known up front, keyed by transaction hash.
#[derive(Debug, Default)]
pub struct InMemoryReceipts {
    receipts: HashMap<B256, ReceiptSummary>,
}

impl InMemoryReceipts {
    pub fn insert(&mut self, receipt: ReceiptSummary) {
        self.receipts.insert(receipt.tx_hash, receipt);
    }

    pub fn len(&self) -> usize {
        self.receipts.len()
    }

    pub fn is_empty(&self) -> bool {
        self.receipts.is_empty()
    }
}

impl FromIterator<ReceiptSummary> for InMemoryReceipts {
    fn from_iter<I: IntoIterator<Item = ReceiptSummary>>(iter: I) -> Self {
        let mut receipts = Self::default();
        for receipt in iter {
            receipts.insert(receipt);
        }
        receipts
    }
}

impl ReceiptLookup for InMemoryReceipts {
    async fn receipt(&self, tx_hash: B256) -> Result<Option<ReceiptSummary>> {
        Ok(self.receipts.get(&tx_hash).cloned())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::Address;

    #[tokio::test]
    async fn in_memory_lookup_by_hash() {
        let hash = B256::repeat_byte(0xab);
        let receipts: InMemoryReceipts = vec![ReceiptSummary {
            tx_hash: hash,
            from: Address::ZERO,
            to: None,
            gas_used: 120_000,
            effective_gas_price: 3_000_000_000,
            block_timestamp: 1_700_000_000,
        }]
        .into_iter()
        .collect();

        let found = receipts.receipt(hash).await.expect("lookup");
        assert_eq!(found.map(|r| r.gas_used), Some(120_000));
        assert!(receipts
            .receipt(B256::ZERO)
            .await
            .expect("lookup")
            .is_none());
    }
}
