//! Relay client tests against a loopback HTTP responder.

mod common;

use common::*;
use mev_data::relay::{
    BundleSubmission, BundleSubmitter, RelayClient, RelayConfig, RelayError, SimulateBundleParams,
};

fn client(url: String) -> RelayClient {
    RelayClient::new(
        RelayConfig {
            url,
            timeout_secs: Some(5),
            ..RelayConfig::default()
        },
        "test-credential".to_string(),
    )
    .expect("client builds")
}

/// Request body of a raw HTTP request.
fn body(request: &str) -> serde_json::Value {
    let (_, body) = request.split_once("\r\n\r\n").expect("request has a body");
    serde_json::from_str(body).expect("body is json")
}

/// Validators query with id "1" against a responder echoing id "1".
#[tokio::test]
async fn validators_round_trip() {
    let (url, server) = one_shot_responder(
        200,
        r#"{"id":"1","result":{"validators":["0xaa","0xbb"]}}"#.to_string(),
    )
    .await;

    let validators = client(url).validators("1").await.expect("relay answers");
    assert_eq!(validators, vec!["0xaa".to_string(), "0xbb".to_string()]);

    let request = server.await.expect("responder finishes");
    assert!(request
        .to_ascii_lowercase()
        .contains("authorization: test-credential"));
    let sent = body(&request);
    assert_eq!(sent["id"], "1");
    assert_eq!(sent["method"], "bsc_mev_validators");
    assert_eq!(sent["params"]["blockchain_network"], "BSC-Mainnet");
}

#[tokio::test]
async fn mismatched_response_id_is_rejected() {
    let (url, server) = one_shot_responder(
        200,
        r#"{"id":"2","result":{"validators":[]}}"#.to_string(),
    )
    .await;

    let err = client(url).validators("1").await.expect_err("id differs");
    match err {
        RelayError::IdMismatch { expected, actual } => {
            assert_eq!(expected, "1");
            assert_eq!(actual, "2");
        }
        other => panic!("expected IdMismatch, got {other:?}"),
    }
    server.await.expect("responder finishes");
}

#[tokio::test]
async fn non_success_status_carries_body() {
    let (url, server) = one_shot_responder(500, "relay overloaded".to_string()).await;

    let err = client(url).validators("1").await.expect_err("500");
    assert!(matches!(
        err,
        RelayError::Status { status: 500, ref body } if body == "relay overloaded"
    ));
    server.await.expect("responder finishes");
}

#[tokio::test]
async fn relay_error_object_is_surfaced() {
    let (url, server) = one_shot_responder(
        200,
        r#"{"id":"1","error":{"code":-32602,"message":"bad block"}}"#.to_string(),
    )
    .await;

    let err = client(url).validators("1").await.expect_err("relay error");
    assert!(matches!(err, RelayError::Rpc { code: -32602, .. }));
    server.await.expect("responder finishes");
}

/// Submissions go out under the bundle network with a hex block number.
#[tokio::test]
async fn submission_uses_bundle_network_and_hex_block() {
    // the client's own sequence starts at 1
    let (url, server) = one_shot_responder(
        200,
        r#"{"id":"1","result":{"bundleHash":"0xfeed"}}"#.to_string(),
    )
    .await;

    let result = client(url)
        .submit_bundle(BundleSubmission {
            transactions: vec!["f86b01".to_string(), "f86b02".to_string()],
            block_number: 291,
            blocks_count: 3,
            reverting_hashes: vec!["0x02".to_string()],
        })
        .await
        .expect("bundle accepted");
    assert_eq!(result.bundle_hash.as_deref(), Some("0xfeed"));

    let sent = body(&server.await.expect("responder finishes"));
    assert_eq!(sent["method"], "blxr_submit_bundle");
    assert_eq!(sent["params"]["blockchain_network"], "bsc");
    assert_eq!(sent["params"]["block_number"], "0x123");
    assert_eq!(sent["params"]["blocks_count"], 3);
    assert_eq!(sent["params"]["transaction"][1], "f86b02");
    assert_eq!(sent["params"]["reverting_hashes"][0], "0x02");
}

/// Out-of-range parameters never reach the wire.
#[tokio::test]
async fn oversized_blocks_count_is_rejected_locally() {
    let relay = client("http://127.0.0.1:9".to_string());
    let err = relay
        .submit_bundle(BundleSubmission {
            transactions: vec!["f86b01".to_string()],
            block_number: 1,
            blocks_count: 21,
            reverting_hashes: Vec::new(),
        })
        .await
        .expect_err("over the relay limit");
    assert!(matches!(err, RelayError::InvalidParams(_)));
}

#[tokio::test]
async fn remote_simulation_returns_relay_payload() {
    let (url, server) = one_shot_responder(
        200,
        r#"{"id":"7","result":{"bundleGasPrice":"1","totalGasUsed":21000}}"#.to_string(),
    )
    .await;

    let params = SimulateBundleParams::new(vec!["f86b01".to_string()], "bsc".to_string(), 16, 1_700_000_000);
    let result = client(url)
        .simulate_bundle("7", params)
        .await
        .expect("simulation answered");
    assert_eq!(result["totalGasUsed"], 21_000);

    let sent = body(&server.await.expect("responder finishes"));
    assert_eq!(sent["method"], "blxr_simulate_bundle");
    assert_eq!(sent["params"]["block_number"], "0x10");
    assert_eq!(sent["params"]["state_block_number"], "latest");
}

#[tokio::test]
async fn empty_remote_simulation_is_rejected_locally() {
    let params = SimulateBundleParams::new(Vec::new(), "bsc".to_string(), 16, 0);
    let err = client("http://127.0.0.1:9".to_string())
        .simulate_bundle("1", params)
        .await
        .expect_err("nothing to simulate");
    assert!(matches!(err, RelayError::InvalidParams(_)));
}
