//! Bundle data model: inclusion window, ordered elements, refund constraints.
//!
//! Construction performs no validation. Windows, refund indices and nesting
//! depth are checked when the bundle is simulated.

use alloy::primitives::{Bytes, I256, U256};
use mev_data::relay::{BundleSubmission, MAX_BLOCKS_COUNT};
use mev_data::types::{LogRecord, Transaction};
use serde::{Deserialize, Serialize};

/// Ledger heights at which a bundle is eligible, inclusive on both ends.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InclusionWindow {
    pub min_height: u64,
    pub max_height: u64,
}

impl InclusionWindow {
    pub fn new(min_height: u64, max_height: u64) -> Self {
        Self {
            min_height,
            max_height,
        }
    }

    /// Window covering exactly one height.
    pub fn at(height: u64) -> Self {
        Self::new(height, height)
    }

    pub fn contains(&self, height: u64) -> bool {
        self.min_height <= height && height <= self.max_height
    }

    /// Number of heights covered, zero when the window is inverted.
    pub fn span(&self) -> u64 {
        if self.max_height < self.min_height {
            0
        } else {
            self.max_height - self.min_height + 1
        }
    }
}

/// Share of realized profit owed back to the element at `body_idx`.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RefundConstraint {
    pub body_idx: usize,
    pub percent: u64,
}

/// Where refunds are paid.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RefundConfig {
    pub address: alloy::primitives::Address,
    pub percent: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ValidityConstraints {
    #[serde(default)]
    pub refund: Vec<RefundConstraint>,
    #[serde(default)]
    pub refund_config: Vec<RefundConfig>,
}

impl ValidityConstraints {
    pub fn is_empty(&self) -> bool {
        self.refund.is_empty() && self.refund_config.is_empty()
    }

    pub(crate) fn is_refund_target(&self, index: usize) -> bool {
        self.refund.iter().any(|r| r.body_idx == index)
    }
}

/// One position in a bundle: a leaf transaction or a nested bundle.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawElement", into = "RawElement")]
pub enum BundleElement {
    Tx { tx: Transaction, can_revert: bool },
    Bundle(Box<Bundle>),
}

impl BundleElement {
    pub fn tx(tx: Transaction) -> Self {
        Self::Tx {
            tx,
            can_revert: false,
        }
    }

    pub fn revertible(tx: Transaction) -> Self {
        Self::Tx {
            tx,
            can_revert: true,
        }
    }

    pub fn nested(bundle: Bundle) -> Self {
        Self::Bundle(Box::new(bundle))
    }
}

/// Wire shape of an element: `{"tx": .., "canRevert": ..}` or `{"bundle": ..}`.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct RawElement {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    tx: Option<Transaction>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    bundle: Option<Box<Bundle>>,
    #[serde(default, skip_serializing_if = "std::ops::Not::not")]
    can_revert: bool,
}

#[derive(Debug, thiserror::Error)]
#[error("bundle element must hold exactly one of `tx` or `bundle`")]
pub struct InvalidElementShape;

impl TryFrom<RawElement> for BundleElement {
    type Error = InvalidElementShape;

    fn try_from(raw: RawElement) -> Result<Self, Self::Error> {
        match (raw.tx, raw.bundle) {
            (Some(tx), None) => Ok(Self::Tx {
                tx,
                can_revert: raw.can_revert,
            }),
            (None, Some(bundle)) if !raw.can_revert => Ok(Self::Bundle(bundle)),
            _ => Err(InvalidElementShape),
        }
    }
}

impl From<BundleElement> for RawElement {
    fn from(element: BundleElement) -> Self {
        match element {
            BundleElement::Tx { tx, can_revert } => Self {
                tx: Some(tx),
                bundle: None,
                can_revert,
            },
            BundleElement::Bundle(bundle) => Self {
                tx: None,
                bundle: Some(bundle),
                can_revert: false,
            },
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Bundle {
    pub inclusion: InclusionWindow,
    pub body: Vec<BundleElement>,
    #[serde(default, skip_serializing_if = "ValidityConstraints::is_empty")]
    pub validity: ValidityConstraints,
}

impl Bundle {
    /// Flat bundle of non-revertible leaves valid in `[min_height, max_height]`.
    pub fn from_transactions(txs: Vec<Transaction>, min_height: u64, max_height: u64) -> Self {
        Self {
            inclusion: InclusionWindow::new(min_height, max_height),
            body: txs.into_iter().map(BundleElement::tx).collect(),
            validity: ValidityConstraints::default(),
        }
    }

    pub fn new(inclusion: InclusionWindow, body: Vec<BundleElement>) -> Self {
        Self {
            inclusion,
            body,
            validity: ValidityConstraints::default(),
        }
    }

    pub fn with_validity(mut self, validity: ValidityConstraints) -> Self {
        self.validity = validity;
        self
    }

    /// Leaf transactions in execution order, descending into nested bundles.
    pub fn leaves(&self) -> Vec<(&Transaction, bool)> {
        let mut out = Vec::new();
        self.collect_leaves(&mut out);
        out
    }

    fn collect_leaves<'a>(&'a self, out: &mut Vec<(&'a Transaction, bool)>) {
        for element in &self.body {
            match element {
                BundleElement::Tx { tx, can_revert } => out.push((tx, *can_revert)),
                BundleElement::Bundle(inner) => inner.collect_leaves(out),
            }
        }
    }

    /// Relay submission for this bundle, flattened to its leaves.
    pub fn submission(&self) -> BundleSubmission {
        let leaves = self.leaves();
        BundleSubmission {
            transactions: leaves.iter().map(|(tx, _)| tx.raw_hex()).collect(),
            block_number: self.inclusion.min_height,
            blocks_count: self.inclusion.span().clamp(1, MAX_BLOCKS_COUNT),
            reverting_hashes: leaves
                .iter()
                .filter(|(_, can_revert)| *can_revert)
                .map(|(tx, _)| tx.hash.to_string())
                .collect(),
        }
    }
}

/// Logs of one bundle element, mirroring the bundle's nesting.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum BodyLogs {
    TxLogs(Vec<LogRecord>),
    BundleLogs(Vec<BodyLogs>),
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SimulationResult {
    /// Net change of the block producer's balance, summed per element.
    pub total_profit: I256,
    pub refundable_value: U256,
    pub gas_used: u64,
    /// `total_profit / gas_used`, truncated toward zero.
    pub effective_price: I256,
    pub body_logs: Vec<BodyLogs>,
    /// First revert payload seen anywhere in the bundle tree.
    pub revert: Option<Bytes>,
    /// First execution error seen anywhere in the bundle tree.
    pub exec_error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;
    use alloy::primitives::{Address, B256};

    fn leaf(byte: u8) -> Transaction {
        Transaction {
            hash: B256::repeat_byte(byte),
            from: Address::repeat_byte(byte),
            to: Some(Address::repeat_byte(0xee)),
            value: U256::ZERO,
            gas_limit: 21_000,
            gas_price: 1,
            nonce: 0,
            input: Bytes::new(),
            raw: Bytes::from(vec![byte, byte]),
        }
    }

    #[test]
    fn flat_bundle_keeps_order_and_window() {
        let bundle = Bundle::from_transactions(vec![leaf(1), leaf(2)], 100, 102);
        assert_eq!(bundle.inclusion, InclusionWindow::new(100, 102));
        assert_eq!(bundle.body.len(), 2);
        assert!(matches!(
            &bundle.body[0],
            BundleElement::Tx { tx, can_revert: false } if tx.hash == B256::repeat_byte(1)
        ));
    }

    #[test]
    fn window_bounds_are_inclusive() {
        let window = InclusionWindow::new(10, 12);
        assert!(!window.contains(9));
        assert!(window.contains(10));
        assert!(window.contains(12));
        assert!(!window.contains(13));
        assert_eq!(window.span(), 3);
        assert_eq!(InclusionWindow::new(5, 4).span(), 0);
    }

    #[test]
    fn submission_flattens_nested_leaves() {
        let inner = Bundle::new(
            InclusionWindow::at(100),
            vec![BundleElement::revertible(leaf(2))],
        );
        let outer = Bundle::new(
            InclusionWindow::new(100, 140),
            vec![
                BundleElement::tx(leaf(1)),
                BundleElement::nested(inner),
                BundleElement::tx(leaf(3)),
            ],
        );

        let submission = outer.submission();
        assert_eq!(submission.transactions, vec!["0101", "0202", "0303"]);
        assert_eq!(submission.block_number, 100);
        assert_eq!(submission.blocks_count, MAX_BLOCKS_COUNT);
        assert_eq!(
            submission.reverting_hashes,
            vec![B256::repeat_byte(2).to_string()]
        );
    }

    #[test]
    fn element_with_both_payloads_is_rejected() {
        let tx = serde_json::to_value(leaf(1)).expect("tx serializes");
        let inner = serde_json::to_value(Bundle::from_transactions(vec![], 1, 1))
            .expect("bundle serializes");

        let both = serde_json::json!({ "tx": tx, "bundle": inner });
        assert!(serde_json::from_value::<BundleElement>(both).is_err());

        let neither = serde_json::json!({ "canRevert": true });
        assert!(serde_json::from_value::<BundleElement>(neither).is_err());

        let ok = serde_json::json!({ "tx": tx, "canRevert": true });
        let element: BundleElement = serde_json::from_value(ok).expect("leaf parses");
        assert!(matches!(element, BundleElement::Tx { can_revert: true, .. }));
    }
}
