//! Private MEV relay client.
//!
//! Every call is a single HTTPS POST of a `{id, method, params}` envelope with
//! a static `Authorization` credential. The response must echo the request id
//! and carry either a result or an error. There is no automatic retry: the
//! caller decides whether to resubmit on a later block.

use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

/// bloXroute MEV endpoint used when the config does not name one.
pub const DEFAULT_RELAY_URL: &str = "https://mev.api.blxrbdn.com";

/// Upper bound the relay accepts for `blocks_count`.
pub const MAX_BLOCKS_COUNT: u64 = 20;

const METHOD_VALIDATORS: &str = "bsc_mev_validators";
const METHOD_SUBMIT_BUNDLE: &str = "blxr_submit_bundle";
const METHOD_SIMULATE_BUNDLE: &str = "blxr_simulate_bundle";

/// Relay failures surfaced to the caller.
#[derive(Debug, thiserror::Error)]
pub enum RelayError {
    /// Non-2xx transport status.
    #[error("relay returned status {status}: {body}")]
    Status { status: u16, body: String },
    /// Body could not be decoded as a response envelope.
    #[error("undecodable relay response (status {status}): {reason}; body: {body}")]
    Decode {
        status: u16,
        body: String,
        reason: String,
    },
    /// Response echoed a different request id.
    #[error("relay response id {actual:?} does not match request id {expected:?}")]
    IdMismatch { expected: String, actual: String },
    /// Relay answered with an error object.
    #[error("relay error {code}: {message}")]
    Rpc { code: i64, message: String },
    /// Envelope carried neither result nor error.
    #[error("relay response for {method} carried no result")]
    MissingResult { method: String },
    /// Parameters rejected before sending.
    #[error("invalid relay parameters: {0}")]
    InvalidParams(String),
    #[error("relay transport failed: {0}")]
    Transport(#[from] reqwest::Error),
    #[error("failed to encode relay request: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Relay endpoint settings. The credential is injected separately.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RelayConfig {
    pub url: String,
    /// Network name used by validator discovery.
    pub validators_network: String,
    /// Network name used by bundle submission and simulation.
    pub bundle_network: String,
    /// Optional per-request timeout. None leaves the call unbounded.
    pub timeout_secs: Option<u64>,
}

impl Default for RelayConfig {
    fn default() -> Self {
        Self {
            url: DEFAULT_RELAY_URL.to_string(),
            validators_network: "BSC-Mainnet".to_string(),
            bundle_network: "bsc".to_string(),
            timeout_secs: None,
        }
    }
}

/// Common request envelope.
#[derive(Clone, Debug, Serialize)]
pub struct RelayRequest<P> {
    pub id: String,
    pub method: String,
    pub params: P,
}

/// Error object inside a response envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct RelayRpcError {
    #[serde(default)]
    pub code: i64,
    pub message: String,
}

/// Common response envelope.
#[derive(Clone, Debug, Deserialize)]
pub struct RelayResponse<R> {
    pub id: String,
    pub jsonrpc: Option<String>,
    pub result: Option<R>,
    pub error: Option<RelayRpcError>,
}

#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct ValidatorsParams {
    pub blockchain_network: String,
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct ValidatorsResult {
    #[serde(default)]
    pub validators: Vec<String>,
}

/// Parameters of `blxr_submit_bundle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SubmitBundleParams {
    /// Raw signed transactions as hex without `0x`.
    pub transaction: Vec<String>,
    pub blockchain_network: String,
    /// Target block number as `0x`-prefixed hex.
    pub block_number: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_timestamp: Option<i64>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub reverting_hashes: Vec<String>,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub dropping_hashes: Vec<String>,
    pub blocks_count: u64,
    pub mev_builders: BTreeMap<String, String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub avoid_mixed_bundles: bool,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub end_of_block: bool,
}

impl SubmitBundleParams {
    /// Submission with relay defaults: one block, all builders, mixing allowed.
    pub fn new(transaction: Vec<String>, blockchain_network: String, block_number: u64) -> Self {
        let mut mev_builders = BTreeMap::new();
        mev_builders.insert("all".to_string(), String::new());

        Self {
            transaction,
            blockchain_network,
            block_number: format!("{block_number:#x}"),
            min_timestamp: None,
            max_timestamp: None,
            reverting_hashes: Vec::new(),
            dropping_hashes: Vec::new(),
            blocks_count: 1,
            mev_builders,
            avoid_mixed_bundles: false,
            end_of_block: false,
        }
    }

    fn validate(&self) -> Result<(), RelayError> {
        if self.transaction.is_empty() {
            return Err(RelayError::InvalidParams(
                "bundle has no transactions".to_string(),
            ));
        }
        if !(1..=MAX_BLOCKS_COUNT).contains(&self.blocks_count) {
            return Err(RelayError::InvalidParams(format!(
                "blocks_count {} outside 1..={MAX_BLOCKS_COUNT}",
                self.blocks_count
            )));
        }
        Ok(())
    }
}

/// Result of `blxr_submit_bundle`.
#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
pub struct SubmitBundleResult {
    #[serde(default, rename = "bundleHash")]
    pub bundle_hash: Option<String>,
}

/// Parameters of `blxr_simulate_bundle`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize)]
pub struct SimulateBundleParams {
    pub transaction: Vec<String>,
    pub block_number: String,
    pub state_block_number: String,
    pub timestamp: i64,
    pub blockchain_network: String,
}

impl SimulateBundleParams {
    /// Simulation against the latest state.
    pub fn new(
        transaction: Vec<String>,
        blockchain_network: String,
        block_number: u64,
        timestamp: i64,
    ) -> Self {
        Self {
            transaction,
            block_number: format!("{block_number:#x}"),
            state_block_number: "latest".to_string(),
            timestamp,
            blockchain_network,
        }
    }
}

/// A signed bundle ready for a relay, independent of the relay's network naming.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct BundleSubmission {
    /// Raw signed transactions as hex without `0x`, in execution order.
    pub transactions: Vec<String>,
    /// First block the bundle targets.
    pub block_number: u64,
    /// Number of consecutive blocks the bundle stays valid for.
    pub blocks_count: u64,
    /// Hashes of transactions allowed to revert.
    pub reverting_hashes: Vec<String>,
}

/// Anything that can take a signed bundle for inclusion.
#[allow(async_fn_in_trait)]
pub trait BundleSubmitter {
    async fn submit_bundle(
        &self,
        submission: BundleSubmission,
    ) -> Result<SubmitBundleResult, RelayError>;
}

pub struct RelayClient {
    http: reqwest::Client,
    config: RelayConfig,
    authorization: String,
    next_id: AtomicU64,
}

impl RelayClient {
    /// Creates a client for the configured relay.
    ///
    /// # Errors
    /// Returns error if the HTTP client cannot be built.
    pub fn new(config: RelayConfig, authorization: String) -> Result<Self, RelayError> {
        let mut builder = reqwest::Client::builder();
        if let Some(secs) = config.timeout_secs {
            builder = builder.timeout(Duration::from_secs(secs));
        }

        Ok(Self {
            http: builder.build()?,
            config,
            authorization,
            next_id: AtomicU64::new(1),
        })
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    /// Next identifier from the client's own sequence.
    pub fn next_request_id(&self) -> String {
        self.next_id.fetch_add(1, Ordering::Relaxed).to_string()
    }

    /// Sends one request and decodes the matching response.
    ///
    /// # Errors
    /// Any non-success status, undecodable body, id mismatch, or relay error object.
    #[tracing::instrument(skip(self, params), fields(relay = %self.config.url))]
    pub async fn call<P, R>(&self, id: &str, method: &str, params: P) -> Result<R, RelayError>
    where
        P: Serialize,
        R: DeserializeOwned,
    {
        let request = RelayRequest {
            id: id.to_string(),
            method: method.to_string(),
            params,
        };
        let payload = serde_json::to_vec(&request)?;

        let response = self
            .http
            .post(&self.config.url)
            .header(reqwest::header::CONTENT_TYPE, "application/json")
            .header(reqwest::header::AUTHORIZATION, &self.authorization)
            .body(payload)
            .send()
            .await?;

        let status = response.status().as_u16();
        let body = response.text().await?;
        tracing::debug!(status, bytes = body.len(), "relay responded");

        decode_response(id, method, status, &body)
    }

    /// Lists validators currently accepting bundles.
    ///
    /// # Errors
    /// See [`RelayClient::call`].
    pub async fn validators(&self, id: &str) -> Result<Vec<String>, RelayError> {
        let params = ValidatorsParams {
            blockchain_network: self.config.validators_network.clone(),
        };
        let result: ValidatorsResult = self.call(id, METHOD_VALIDATORS, params).await?;
        Ok(result.validators)
    }

    /// Submits a bundle under a caller-chosen id.
    ///
    /// # Errors
    /// Parameter validation failures and see [`RelayClient::call`].
    pub async fn submit_bundle_with_id(
        &self,
        id: &str,
        params: SubmitBundleParams,
    ) -> Result<SubmitBundleResult, RelayError> {
        params.validate()?;
        self.call(id, METHOD_SUBMIT_BUNDLE, params).await
    }

    /// Asks the relay to simulate a bundle. The result shape is relay-defined.
    ///
    /// # Errors
    /// See [`RelayClient::call`].
    pub async fn simulate_bundle(
        &self,
        id: &str,
        params: SimulateBundleParams,
    ) -> Result<serde_json::Value, RelayError> {
        if params.transaction.is_empty() {
            return Err(RelayError::InvalidParams(
                "bundle has no transactions".to_string(),
            ));
        }
        self.call(id, METHOD_SIMULATE_BUNDLE, params).await
    }
}

impl BundleSubmitter for RelayClient {
    async fn submit_bundle(
        &self,
        submission: BundleSubmission,
    ) -> Result<SubmitBundleResult, RelayError> {
        let mut params = SubmitBundleParams::new(
            submission.transactions,
            self.config.bundle_network.clone(),
            submission.block_number,
        );
        params.blocks_count = submission.blocks_count;
        params.reverting_hashes = submission.reverting_hashes;

        let id = self.next_request_id();
        tracing::info!(
            id = %id,
            block_number = submission.block_number,
            tx_count = params.transaction.len(),
            "submitting bundle to relay"
        );
        self.submit_bundle_with_id(&id, params).await
    }
}

/// Decodes a raw relay answer for the request `expected_id`.
///
/// # Errors
/// See [`RelayError`].
pub fn decode_response<R: DeserializeOwned>(
    expected_id: &str,
    method: &str,
    status: u16,
    body: &str,
) -> Result<R, RelayError> {
    if !(200..300).contains(&status) {
        return Err(RelayError::Status {
            status,
            body: body.to_string(),
        });
    }

    let envelope: RelayResponse<R> =
        serde_json::from_str(body).map_err(|e| RelayError::Decode {
            status,
            body: body.to_string(),
            reason: e.to_string(),
        })?;

    if envelope.id != expected_id {
        return Err(RelayError::IdMismatch {
            expected: expected_id.to_string(),
            actual: envelope.id,
        });
    }

    if let Some(error) = envelope.error {
        return Err(RelayError::Rpc {
            code: error.code,
            message: error.message,
        });
    }

    envelope.result.ok_or_else(|| RelayError::MissingResult {
        method: method.to_string(),
    })
}
