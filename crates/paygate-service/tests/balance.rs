//! Balance, transactions and deposit integration tests.

mod common;

use axum::http::StatusCode;
use common::TestHarness;
use serde_json::{json, Value};

#[tokio::test]
async fn balance_summary_for_new_account() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .get("/v1/balance")
        .add_header("authorization", harness.user_auth_header())
        .await;

    response.assert_status_ok();
    let body: Value = response.json();
    assert_eq!(body["balance_micros"], 0);
    assert_eq!(body["free_operations_used"], 0);
    assert_eq!(body["free_operations_remaining"], 500);
    assert_eq!(body["free_operations_total"], 500);
    assert_eq!(body["total_operations"], 0);
    assert!(body["transactions"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn balance_reflects_operations_and_deposits() {
    let harness = TestHarness::new();
    harness.register().await;
    harness.fund(10.0, "order-1").await;
    harness.charge("merge").await;
    harness.charge("merge").await;
    harness.charge("pdf").await;

    let body: Value = harness
        .server
        .get("/v1/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();

    assert_eq!(body["balance_micros"], 10_000_000);
    assert_eq!(body["balance_formatted"], "$10.000");
    assert_eq!(body["free_operations_used"], 3);
    assert_eq!(body["total_operations"], 2);
    assert_eq!(body["operation_counts"]["merge"], 2);
    assert!(body["operation_counts"].get("pdf").is_none());

    let transactions = body["transactions"].as_array().unwrap();
    assert_eq!(transactions.len(), 4);
    assert_eq!(transactions[0]["amount"], "Free");
    assert_eq!(transactions[3]["amount"], "+10.000");
    assert_eq!(transactions[3]["description"], "Deposit - completed");
}

#[tokio::test]
async fn transactions_paginate() {
    let harness = TestHarness::new();
    harness.register().await;
    for _ in 0..3 {
        harness.charge("split").await;
    }

    let body: Value = harness
        .server
        .get("/v1/transactions")
        .add_query_param("limit", 2)
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();

    assert_eq!(body["transactions"].as_array().unwrap().len(), 2);
    assert_eq!(body["has_more"], true);
    assert_eq!(body["transactions"][0]["description"], "Operation: split (Free)");
}

#[tokio::test]
async fn deposit_below_minimum_is_rejected() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/v1/deposits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount_usd": 4.99 }))
        .await;

    response.assert_status_bad_request();
}

#[tokio::test]
async fn pending_deposit_does_not_change_balance() {
    let harness = TestHarness::new();
    harness.register().await;

    let response = harness
        .server
        .post("/v1/deposits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount_usd": 25.0, "payment_reference": "order-9" }))
        .await;
    response.assert_status(StatusCode::CREATED);
    let body: Value = response.json();
    assert_eq!(body["status"], "pending");
    assert_eq!(body["amount_micros"], 25_000_000);

    let summary: Value = harness
        .server
        .get("/v1/balance")
        .add_header("authorization", harness.user_auth_header())
        .await
        .json();
    assert_eq!(summary["balance_micros"], 0);

    harness
        .server
        .post("/v1/deposits")
        .add_header("authorization", harness.user_auth_header())
        .json(&json!({ "amount_usd": 25.0, "payment_reference": "order-9" }))
        .await
        .assert_status(StatusCode::CONFLICT);
}
