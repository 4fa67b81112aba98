//! Concurrent charging and reconciliation tests.
//!
//! These drive the billing core directly from many tasks at once and check
//! that the account-level critical section admits exactly the right number
//! of winners.

mod common;

use std::sync::Arc;

use chrono::Utc;
use futures::future::join_all;

use common::{capture_event, test_config, TestHarness};
use paygate_core::{Account, PricingPolicy, UserId};
use paygate_service::{AppState, ServiceConfig};
use paygate_store::{
    AccountRepository, MemoryStore, PricingRepository, TransactionRepository, UsageStatRepository,
};

fn state_with_account(balance_micros: i64, free_used: u32) -> (Arc<MemoryStore>, AppState, UserId) {
    let store = Arc::new(MemoryStore::new());
    let mut account = Account::new(UserId::generate(), Utc::now());
    account.balance_micros = balance_micros;
    account.free_operations_used = free_used;
    store.put_account(&account).unwrap();

    let state = AppState::new(store.clone(), test_config());
    (store, state, account.user_id)
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn last_free_unit_is_spent_once() {
    let (store, state, user) = state_with_account(0, 499);

    let tasks = (0..20).map(|_| {
        let gate = state.gate.clone();
        tokio::spawn(async move { gate.process_operation(&user, "merge").await })
    });
    let results: Vec<_> = join_all(tasks)
        .await
        .into_iter()
        .map(|joined| joined.unwrap().unwrap())
        .collect();

    let winners = results.iter().filter(|r| r.success).count();
    assert_eq!(winners, 1);
    assert!(results
        .iter()
        .filter(|r| !r.success)
        .all(|r| r.error == Some(paygate_core::Rejection::InsufficientBalance)));

    let account = store.get_account(&user).unwrap().unwrap();
    assert_eq!(account.free_operations_used, 500);
    assert_eq!(store.list_transactions_by_user(&user, 100, 0).unwrap().len(), 1);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn balance_never_goes_negative() {
    let (store, state, user) = state_with_account(0, 0);
    store
        .put_pricing(&PricingPolicy::new(1_000_000, 0))
        .unwrap();

    // Fund through the ledger so the audit holds afterwards.
    state
        .reconciler
        .create_deposit(&user, 5_000_000, Some("order-1".into()))
        .await
        .unwrap();
    state
        .reconciler
        .handle_event(capture_event("PAYMENT.CAPTURE.COMPLETED", "order-1"))
        .await;

    let tasks = (0..20).map(|_| {
        let gate = state.gate.clone();
        tokio::spawn(async move { gate.process_operation(&user, "ocr").await })
    });
    let winners = join_all(tasks)
        .await
        .into_iter()
        .filter(|joined| joined.as_ref().unwrap().as_ref().unwrap().success)
        .count();

    assert_eq!(winners, 5);
    assert_eq!(store.get_account(&user).unwrap().unwrap().balance_micros, 0);
    assert_eq!(state.accounts.audit(&user).await.unwrap(), 0);

    let usage = store
        .list_usage_since(&user, Utc::now().date_naive())
        .unwrap();
    assert_eq!(usage[0].count, 5);
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn duplicate_callbacks_credit_once() {
    let harness = TestHarness::new();
    harness.register().await;
    let user = harness.test_user_id;

    harness
        .state
        .reconciler
        .create_deposit(&user, 10_000_000, Some("order-42".into()))
        .await
        .unwrap();

    let tasks = (0..10).map(|_| {
        let reconciler = harness.state.reconciler.clone();
        tokio::spawn(async move {
            reconciler
                .handle_event(capture_event("PAYMENT.CAPTURE.COMPLETED", "order-42"))
                .await
        })
    });
    let credited = join_all(tasks)
        .await
        .into_iter()
        .filter(|outcome| {
            matches!(
                outcome.as_ref().unwrap(),
                paygate_service::billing::ReconcileOutcome::Credited { .. }
            )
        })
        .count();

    assert_eq!(credited, 1);
    assert_eq!(
        harness.store.get_account(&user).unwrap().unwrap().balance_micros,
        10_000_000
    );
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn busy_account_times_out_as_retryable() {
    let store = Arc::new(MemoryStore::new());
    let config = ServiceConfig {
        lock_timeout_ms: 50,
        ..test_config()
    };
    let state = AppState::new(store.clone(), config);

    let user = state.accounts.register(&UserId::generate()).await.unwrap().user_id;
    let other = state.accounts.register(&UserId::generate()).await.unwrap().user_id;

    let held = state.locks.acquire(&user).await.unwrap();
    let err = state.gate.process_operation(&user, "merge").await.unwrap_err();
    assert!(err.is_retryable());
    assert!(store.list_transactions_by_user(&user, 10, 0).unwrap().is_empty());

    // Other accounts are unaffected.
    assert!(state.gate.process_operation(&other, "merge").await.unwrap().success);

    drop(held);
    assert!(state.gate.process_operation(&user, "merge").await.unwrap().success);
}
