//! Deposit creation and payment provider reconciliation.
//!
//! Providers deliver callbacks at least once and in any order. A deposit is
//! settled only while its ledger entry is still pending, and that check is
//! repeated inside the account's critical section, so replays are no-ops.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use paygate_core::{
    format_usd, BillingError, PaymentEventKind, ProviderEvent, Result, Transaction, TransactionId,
    UserId, WebhookEvent,
};
use paygate_store::{LedgerWrite, Store};

use super::locks::AccountLocks;

/// Smallest accepted deposit ($5).
pub const MIN_DEPOSIT_MICROS: i64 = 5_000_000;

/// What a callback did.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReconcileOutcome {
    /// A pending deposit was credited.
    Credited {
        /// The credited account.
        user_id: UserId,
        /// Deposit amount.
        amount_micros: i64,
        /// Balance after crediting.
        balance_micros: i64,
    },
    /// A pending deposit was marked failed.
    MarkedFailed {
        /// The deposit's account.
        user_id: UserId,
    },
    /// The deposit was already settled or never existed.
    NotPending,
    /// The payload carried no usable reference.
    MissingReference,
    /// The event type is not one we act on.
    Ignored,
    /// Processing failed; details were logged.
    Failed,
}

/// Creates pending deposits and settles them from provider callbacks.
#[derive(Clone)]
pub struct DepositReconciler {
    store: Arc<dyn Store>,
    locks: Arc<AccountLocks>,
}

impl DepositReconciler {
    /// Create a reconciler.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, locks: Arc<AccountLocks>) -> Self {
        Self { store, locks }
    }

    /// Record a pending deposit awaiting provider confirmation.
    ///
    /// Without a `payment_reference` a fresh one is generated. Runs inside
    /// the account's critical section so it cannot interleave with a delete.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidAmount` below [`MIN_DEPOSIT_MICROS`].
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    /// - `BillingError::DuplicateReference` if the reference is taken, even
    ///   by a deposit created concurrently.
    /// - `BillingError::TransactionConflict` if the account stayed locked too long.
    pub async fn create_deposit(
        &self,
        user_id: &UserId,
        amount_micros: i64,
        payment_reference: Option<String>,
    ) -> Result<Transaction> {
        if amount_micros < MIN_DEPOSIT_MICROS {
            return Err(BillingError::InvalidAmount(format!(
                "deposit must be at least {}",
                format_usd(MIN_DEPOSIT_MICROS)
            )));
        }

        let _guard = self.locks.acquire(user_id).await?;

        let account =
            self.store
                .get_account(user_id)?
                .ok_or_else(|| BillingError::AccountNotFound {
                    user_id: user_id.to_string(),
                })?;

        let reference = payment_reference
            .filter(|r| !r.trim().is_empty())
            .unwrap_or_else(|| format!("dep_{}", TransactionId::generate()));

        let tx = Transaction::pending_deposit(
            *user_id,
            amount_micros,
            account.balance_micros,
            reference,
            Utc::now(),
        );
        self.store.insert_with_unique_reference(&tx)?;

        tracing::info!(
            user_id = %user_id,
            transaction_id = %tx.id,
            amount_micros = amount_micros,
            "Pending deposit created"
        );
        Ok(tx)
    }

    /// Handle a raw provider callback. Never fails: the payload is stored
    /// for audit first, and any processing error is logged, not returned.
    pub async fn handle_event(&self, raw: Value) -> ReconcileOutcome {
        self.handle_event_at(raw, Utc::now()).await
    }

    /// [`Self::handle_event`] with an explicit clock.
    pub async fn handle_event_at(&self, raw: Value, now: DateTime<Utc>) -> ReconcileOutcome {
        let event = ProviderEvent::parse(&raw);

        let record = WebhookEvent::record(&event, raw, now);
        if let Err(e) = self.store.put_webhook_event(&record) {
            tracing::error!(
                event_id = ?event.event_id,
                event_type = %event.event_type,
                error = %e,
                "Failed to store webhook event"
            );
        }

        match self.apply(&event, now).await {
            Ok(outcome) => {
                tracing::info!(
                    event_type = %event.event_type,
                    reference = ?event.reference,
                    outcome = ?outcome,
                    "Webhook event processed"
                );
                outcome
            }
            Err(e) => {
                tracing::error!(
                    event_type = %event.event_type,
                    reference = ?event.reference,
                    error = %e,
                    "Webhook event processing failed"
                );
                ReconcileOutcome::Failed
            }
        }
    }

    async fn apply(&self, event: &ProviderEvent, now: DateTime<Utc>) -> Result<ReconcileOutcome> {
        if event.kind == PaymentEventKind::Ignored {
            return Ok(ReconcileOutcome::Ignored);
        }

        let Some(reference) = event.reference.as_deref() else {
            tracing::warn!(event_type = %event.event_type, "Webhook event without reference");
            return Ok(ReconcileOutcome::MissingReference);
        };

        let Some(found) = self.store.find_transaction_by_reference(reference)? else {
            tracing::info!(reference = %reference, "No deposit for webhook reference");
            return Ok(ReconcileOutcome::NotPending);
        };
        if !found.is_pending() {
            return Ok(ReconcileOutcome::NotPending);
        }

        let _guard = self.locks.acquire(&found.user_id).await?;

        // Another delivery may have settled it while we waited.
        let Some(mut tx) = self
            .store
            .get_transaction(&found.id)?
            .filter(Transaction::is_pending)
        else {
            return Ok(ReconcileOutcome::NotPending);
        };

        match event.kind {
            PaymentEventKind::Completed => {
                let mut account = self.store.get_account(&tx.user_id)?.ok_or_else(|| {
                    BillingError::AccountNotFound {
                        user_id: tx.user_id.to_string(),
                    }
                })?;

                account.balance_micros += tx.amount_micros;
                account.updated_at = now;
                tx.complete(account.balance_micros, now)?;

                let outcome = ReconcileOutcome::Credited {
                    user_id: tx.user_id,
                    amount_micros: tx.amount_micros,
                    balance_micros: account.balance_micros,
                };
                self.store.commit(&LedgerWrite::new(account, tx))?;
                Ok(outcome)
            }
            PaymentEventKind::Denied | PaymentEventKind::Refunded => {
                let user_id = tx.user_id;
                tx.fail(now)?;
                self.store.commit(&LedgerWrite::transaction_only(tx))?;
                Ok(ReconcileOutcome::MarkedFailed { user_id })
            }
            PaymentEventKind::Ignored => Ok(ReconcileOutcome::Ignored),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use paygate_core::{Account, TransactionStatus};
    use paygate_store::{
        AccountRepository, MemoryStore, TransactionRepository, WebhookEventRepository,
    };
    use serde_json::json;

    fn reconciler() -> (Arc<MemoryStore>, DepositReconciler) {
        let store = Arc::new(MemoryStore::new());
        let locks = Arc::new(AccountLocks::new(Duration::from_millis(500)));
        (store.clone(), DepositReconciler::new(store, locks))
    }

    fn seed(store: &MemoryStore) -> UserId {
        let account = Account::new(UserId::generate(), Utc::now());
        store.put_account(&account).unwrap();
        account.user_id
    }

    fn event(event_type: &str, order_id: &str) -> Value {
        json!({
            "id": format!("WH-{order_id}"),
            "event_type": event_type,
            "resource_type": "capture",
            "resource": {
                "id": "CAPTURE-1",
                "supplementary_data": { "related_ids": { "order_id": order_id } }
            }
        })
    }

    #[tokio::test]
    async fn deposit_validation() {
        let (store, reconciler) = reconciler();
        let user = seed(&store);

        assert!(matches!(
            reconciler.create_deposit(&user, 4_990_000, None).await,
            Err(BillingError::InvalidAmount(_))
        ));
        assert!(matches!(
            reconciler
                .create_deposit(&UserId::generate(), 10_000_000, None)
                .await,
            Err(BillingError::AccountNotFound { .. })
        ));

        let tx = reconciler
            .create_deposit(&user, 10_000_000, Some("order-1".into()))
            .await
            .unwrap();
        assert_eq!(tx.status, TransactionStatus::Pending);
        assert_eq!(tx.description, "Deposit - pending");
        assert_eq!(tx.balance_after_micros, 10_000_000);
        assert!(matches!(
            reconciler
                .create_deposit(&user, 10_000_000, Some("order-1".into()))
                .await,
            Err(BillingError::DuplicateReference { .. })
        ));

        let generated = reconciler
            .create_deposit(&user, 5_000_000, None)
            .await
            .unwrap();
        assert!(generated.payment_reference.unwrap().starts_with("dep_"));
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn racing_deposits_claim_a_reference_once() {
        let (store, reconciler) = reconciler();
        let alice = seed(&store);
        let bob = seed(&store);

        for round in 0..100 {
            let reference = format!("order-{round}");
            let tasks = [alice, alice, bob].map(|user| {
                let reconciler = reconciler.clone();
                let reference = reference.clone();
                tokio::spawn(async move {
                    reconciler
                        .create_deposit(&user, 10_000_000, Some(reference))
                        .await
                })
            });

            let mut accepted = Vec::new();
            for task in tasks {
                match task.await.unwrap() {
                    Ok(tx) => accepted.push(tx),
                    Err(e) => assert!(matches!(e, BillingError::DuplicateReference { .. })),
                }
            }
            assert_eq!(accepted.len(), 1);

            // The surviving entry is the one a callback will settle.
            let outcome = reconciler
                .handle_event(event("PAYMENT.CAPTURE.COMPLETED", &reference))
                .await;
            assert!(matches!(outcome, ReconcileOutcome::Credited { user_id, .. } if user_id == accepted[0].user_id));
        }

        for user in [alice, bob] {
            let pending = store
                .list_transactions_by_user(&user, 1_000, 0)
                .unwrap()
                .into_iter()
                .filter(Transaction::is_pending)
                .count();
            assert_eq!(pending, 0);
        }
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 2)]
    async fn deposit_never_outlives_a_concurrent_delete() {
        let (store, reconciler) = reconciler();

        for _ in 0..100 {
            let user = seed(&store);
            let deleting = {
                let store = store.clone();
                let locks = reconciler.locks.clone();
                tokio::spawn(async move {
                    let _guard = locks.acquire(&user).await.unwrap();
                    store.delete_account(&user).unwrap();
                })
            };
            let creating = {
                let reconciler = reconciler.clone();
                tokio::spawn(async move { reconciler.create_deposit(&user, 5_000_000, None).await })
            };

            deleting.await.unwrap();
            if let Err(e) = creating.await.unwrap() {
                assert!(matches!(e, BillingError::AccountNotFound { .. }));
            }
            // Created first and cascaded, or refused.
            assert!(store.list_transactions_by_user(&user, 10, 0).unwrap().is_empty());
        }
    }

    #[tokio::test]
    async fn completed_event_credits_once() {
        let (store, reconciler) = reconciler();
        let user = seed(&store);
        reconciler
            .create_deposit(&user, 10_000_000, Some("order-123".into()))
            .await
            .unwrap();

        let first = reconciler
            .handle_event(event("PAYMENT.CAPTURE.COMPLETED", "order-123"))
            .await;
        assert!(matches!(
            first,
            ReconcileOutcome::Credited { balance_micros: 10_000_000, .. }
        ));

        let second = reconciler
            .handle_event(event("PAYMENT.CAPTURE.COMPLETED", "order-123"))
            .await;
        assert_eq!(second, ReconcileOutcome::NotPending);

        assert_eq!(
            store.get_account(&user).unwrap().unwrap().balance_micros,
            10_000_000
        );
        let tx = store.find_transaction_by_reference("order-123").unwrap().unwrap();
        assert_eq!(tx.status, TransactionStatus::Completed);
        assert_eq!(tx.description, "Deposit - completed");
        assert_eq!(store.list_webhook_events(10).unwrap().len(), 2);
    }

    #[tokio::test]
    async fn denied_event_fails_without_credit() {
        let (store, reconciler) = reconciler();
        let user = seed(&store);
        reconciler
            .create_deposit(&user, 10_000_000, Some("order-7".into()))
            .await
            .unwrap();

        let outcome = reconciler
            .handle_event(event("PAYMENT.CAPTURE.DENIED", "order-7"))
            .await;
        assert_eq!(outcome, ReconcileOutcome::MarkedFailed { user_id: user });

        // A late completion for a failed deposit must not credit.
        let late = reconciler
            .handle_event(event("PAYMENT.CAPTURE.COMPLETED", "order-7"))
            .await;
        assert_eq!(late, ReconcileOutcome::NotPending);
        assert_eq!(store.get_account(&user).unwrap().unwrap().balance_micros, 0);
    }

    #[tokio::test]
    async fn unknown_and_irrelevant_events_are_acknowledged() {
        let (store, reconciler) = reconciler();

        assert_eq!(
            reconciler
                .handle_event(event("PAYMENT.CAPTURE.COMPLETED", "order-missing"))
                .await,
            ReconcileOutcome::NotPending
        );
        assert_eq!(
            reconciler
                .handle_event(event("BILLING.SUBSCRIPTION.CREATED", "order-1"))
                .await,
            ReconcileOutcome::Ignored
        );
        assert_eq!(
            reconciler
                .handle_event(json!({ "event_type": "PAYMENT.CAPTURE.COMPLETED" }))
                .await,
            ReconcileOutcome::MissingReference
        );
        assert_eq!(store.list_webhook_events(10).unwrap().len(), 3);
    }

    #[tokio::test]
    async fn store_outage_is_swallowed() {
        let (store, reconciler) = reconciler();
        store.set_unavailable(true);
        let outcome = reconciler
            .handle_event(event("PAYMENT.CAPTURE.COMPLETED", "order-1"))
            .await;
        assert_eq!(outcome, ReconcileOutcome::Failed);
    }
}
