//! Swap telemetry: decoded pool swaps with their realized fee and gas cost.

use alloy::primitives::{Address, I256};
use eyre::{eyre, Context, Result};
use mev_data::receipts::ReceiptLookup;
use mev_data::store::{DocumentStore, SWAP_EVENTS};
use mev_data::types::{LogRecord, SwapEventDoc, TxInfo};
use serde::{Deserialize, Serialize};

use crate::decoder::{addresses, decode_swap_log, SwapEvent};

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TelemetryConfig {
    pub pool: Address,
    pub token0_symbol: String,
    pub token1_symbol: String,
    /// Decimals used to scale amounts and fees of both tokens.
    pub decimals: u8,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            pool: addresses::USDT_WBNB_POOL,
            token0_symbol: "USDT".to_string(),
            token1_symbol: "BNB".to_string(),
            decimals: 18,
        }
    }
}

/// Fee paid relative to the amount traded on the leg the pool received.
///
/// Uses token0 when the pool's amount0 delta is positive, token1 otherwise.
/// Zero when the chosen leg's amount is zero.
pub fn realized_fee_ratio(swap: &SwapEvent) -> f64 {
    let (fee, amount) = if swap.amount0.is_positive() {
        (swap.protocol_fees_token0, swap.amount0)
    } else {
        (swap.protocol_fees_token1, swap.amount1)
    };

    let amount = signed_to_f64(amount);
    if amount == 0.0 {
        return 0.0;
    }
    fee as f64 / amount
}

fn signed_to_f64(value: I256) -> f64 {
    value.to_string().parse().unwrap_or_default()
}

pub struct SwapTelemetry<L, D> {
    config: TelemetryConfig,
    receipts: L,
    store: D,
}

impl<L: ReceiptLookup, D: DocumentStore> SwapTelemetry<L, D> {
    pub fn new(config: TelemetryConfig, receipts: L, store: D) -> Self {
        Self {
            config,
            receipts,
            store,
        }
    }

    /// Decodes and stores one batch of logs; logs that are not pool swaps are skipped.
    ///
    /// Returns how many documents were written.
    pub async fn on_swap_events(&self, logs: &[LogRecord]) -> Result<usize> {
        let mut docs = Vec::with_capacity(logs.len());
        for log in logs {
            match self.document(log).await {
                Ok(Some(doc)) => docs.push(doc),
                Ok(None) => {}
                Err(e) => tracing::warn!(tx_hash = %log.tx_hash, error = %e, "skipping swap event"),
            }
        }

        if docs.is_empty() {
            return Ok(0);
        }
        self.store
            .bulk_put(&docs, SWAP_EVENTS)
            .wrap_err("failed to store swap events")?;
        Ok(docs.len())
    }

    /// Builds the telemetry document for one log.
    pub async fn document(&self, log: &LogRecord) -> Result<Option<SwapEventDoc>> {
        if log.address != self.config.pool {
            return Ok(None);
        }
        let Some(swap) = decode_swap_log(log) else {
            return Ok(None);
        };

        let receipt = self
            .receipts
            .receipt(log.tx_hash)
            .await?
            .ok_or_else(|| eyre!("no receipt for {}", log.tx_hash))?;

        let gas_fee = u128::from(receipt.gas_used)
            .checked_mul(receipt.effective_gas_price)
            .ok_or_else(|| eyre!("gas fee overflows for {}", log.tx_hash))?;
        let timestamp = i64::try_from(receipt.block_timestamp)
            .ok()
            .and_then(|secs| chrono::DateTime::from_timestamp(secs, 0))
            .map(|t| t.to_rfc3339())
            .unwrap_or_default();

        let scale = 10f64.powi(i32::from(self.config.decimals));
        let fee = realized_fee_ratio(&swap);
        tracing::debug!(tx_hash = %log.tx_hash, fee, gas_fee, "swap observed");

        Ok(Some(SwapEventDoc {
            pair: self.config.pool.to_checksum(None),
            token0: self.config.token0_symbol.clone(),
            token1: self.config.token1_symbol.clone(),
            transaction_info: TxInfo {
                transaction_hash: log.tx_hash.to_string(),
                from: receipt.from.to_checksum(None),
                to: receipt
                    .to
                    .map(|to| to.to_checksum(None))
                    .unwrap_or_else(|| "Contract Creation".to_string()),
            },
            sender: swap.sender.to_checksum(None),
            recipient: swap.recipient.to_checksum(None),
            tick: swap.tick,
            amount0: signed_to_f64(swap.amount0) / scale,
            amount0_origin: swap.amount0.to_string(),
            amount1: signed_to_f64(swap.amount1) / scale,
            amount1_origin: swap.amount1.to_string(),
            sqrt_price_x96: swap.sqrt_price_x96.to_string(),
            liquidity: swap.liquidity.to_string(),
            fee_amount0: swap.protocol_fees_token0 as f64 / scale,
            fee_amount0_origin: swap.protocol_fees_token0.to_string(),
            fee_amount1: swap.protocol_fees_token1 as f64 / scale,
            fee_amount1_origin: swap.protocol_fees_token1.to_string(),
            fee,
            gas_fee: gas_fee.to_string(),
            gas_used: receipt.gas_used,
            gas_price: receipt.effective_gas_price.to_string(),
            timestamp,
        }))
    }
}
