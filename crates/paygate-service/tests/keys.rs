//! API key integration tests.

mod common;

use axum::http::StatusCode;
use common::{TestHarness, SERVICE_KEY};
use serde_json::{json, Value};

#[tokio::test]
async fn create_list_revoke() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/v1/keys")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "name": "ci", "permissions": [] }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let created: Value = response.json();
    let secret = created["secret"].as_str().unwrap();
    assert!(secret.starts_with("sk_"));
    assert_eq!(
        created["permissions"],
        json!(["convert", "compress", "merge", "split"])
    );

    let listed: Value = harness
        .server
        .get("/v1/keys")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    let keys = listed["keys"].as_array().unwrap();
    assert_eq!(keys.len(), 1);
    assert!(keys[0].get("secret").is_none());
    assert!(secret.starts_with(keys[0]["key_prefix"].as_str().unwrap()));

    let key_id = created["id"].as_str().unwrap();
    harness
        .server
        .delete(&format!("/v1/keys/{key_id}"))
        .add_header("authorization", harness.user_auth_header())
        .await
        .assert_status(StatusCode::NO_CONTENT);

    let validation: Value = harness
        .server
        .post("/v1/keys/validate")
        .add_header("x-service-key", SERVICE_KEY)
        .json(&json!({ "api_key": secret, "operation": "merge" }))
        .await
        .json();
    assert_eq!(validation["valid"], false);
    assert_eq!(validation["error"], "invalid_key");
}

#[tokio::test]
async fn unfunded_account_gets_one_key() {
    let harness = TestHarness::new();
    harness.register().await;
    harness.issue_key(json!([])).await;

    let response = harness
        .server
        .post("/v1/keys")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "name": "second" }))
        .await;
    response.assert_status(StatusCode::FORBIDDEN);

    harness.fund(5.0, "order-1").await;
    harness.issue_key(json!(["*"])).await;
}

#[tokio::test]
async fn unknown_permission_is_rejected() {
    let harness = TestHarness::new();
    harness.register().await;

    harness
        .server
        .post("/v1/keys")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "name": "bad", "permissions": ["teleport"] }))
        .await
        .assert_status_bad_request();
}

#[tokio::test]
async fn validate_reports_owner_state() {
    let harness = TestHarness::new();
    harness.register().await;
    let secret = harness.issue_key(json!(["*"])).await;

    let body: Value = harness
        .server
        .post("/v1/keys/validate")
        .add_header("x-service-key", SERVICE_KEY)
        .add_header("x-api-key", secret)
        .json(&json!({ "operation": "ocr" }))
        .await
        .json();

    assert_eq!(body["valid"], true);
    assert_eq!(body["user_id"], harness.test_user_id.to_string());
    assert_eq!(body["free_operations_remaining"], 500);

    // Validation never charges.
    let balance: Value = harness
        .server
        .get("/v1/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(balance["free_operations_used"], 0);
}

#[tokio::test]
async fn revoking_someone_elses_key_is_not_found() {
    let harness = TestHarness::new();
    harness.register().await;

    let created: Value = harness
        .server
        .post("/v1/keys")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "name": "mine" }))
        .await
        .json();
    let key_id = created["id"].as_str().unwrap();

    let stranger = paygate_core::UserId::generate();
    harness
        .server
        .delete(&format!("/v1/keys/{key_id}"))
        .add_header("authorization", TestHarness::auth_header_for(&stranger))
        .await
        .assert_status_not_found();
}
