//! The operation gate: charge one operation or refuse it.
//!
//! Load, price, quota check, mutate and ledger append all happen inside the
//! account's critical section, and the account row and the ledger entry are
//! committed in one write. Two concurrent calls can therefore never both
//! spend the last free unit or the last cent.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use paygate_core::{
    AuthorizationResult, BillingError, OperationResult, QuotaSnapshot, Rejection, Result,
    Transaction, UserId, ValidationResult,
};
use paygate_store::{LedgerWrite, Store};

use super::keys::{hash_secret, ApiKeyGate};
use super::locks::AccountLocks;
use super::pricing::PolicySource;

/// Charges operations against the free quota or the balance.
#[derive(Clone)]
pub struct OperationGate {
    store: Arc<dyn Store>,
    locks: Arc<AccountLocks>,
    pricing: PolicySource,
    keys: ApiKeyGate,
}

impl OperationGate {
    /// Create a gate.
    #[must_use]
    pub fn new(
        store: Arc<dyn Store>,
        locks: Arc<AccountLocks>,
        pricing: PolicySource,
        keys: ApiKeyGate,
    ) -> Self {
        Self {
            store,
            locks,
            pricing,
            keys,
        }
    }

    /// Charge one `operation` for `user_id`.
    ///
    /// A refusal (`InsufficientBalance`) is an `Ok` result with
    /// `success == false` and no state change.
    ///
    /// # Errors
    ///
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    /// - `BillingError::TransactionConflict` if the account stayed locked too long.
    /// - `BillingError::Storage` if the store failed; nothing was written.
    pub async fn process_operation(
        &self,
        user_id: &UserId,
        operation: &str,
    ) -> Result<OperationResult> {
        self.process_operation_at(user_id, operation, Utc::now()).await
    }

    /// [`Self::process_operation`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::process_operation`].
    pub async fn process_operation_at(
        &self,
        user_id: &UserId,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<OperationResult> {
        let _guard = self.locks.acquire(user_id).await?;
        self.charge_locked(user_id, operation, now)
    }

    /// Validate an API key and charge the operation in one critical section.
    ///
    /// A key revoked concurrently is either seen as revoked or charged
    /// before the revocation lands; never validated and then charged after.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only; refusals come back in the result.
    pub async fn authorize_and_charge(
        &self,
        secret: Option<&str>,
        operation: &str,
    ) -> Result<AuthorizationResult> {
        self.authorize_and_charge_at(secret, operation, Utc::now())
            .await
    }

    /// [`Self::authorize_and_charge`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::authorize_and_charge`].
    pub async fn authorize_and_charge_at(
        &self,
        secret: Option<&str>,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<AuthorizationResult> {
        let refused = |reason| AuthorizationResult {
            validation: ValidationResult::rejected(reason),
            charge: None,
        };

        let Some(secret) = secret.filter(|s| !s.is_empty()) else {
            return Ok(refused(Rejection::MissingKey));
        };
        let Some(key) = self.store.get_api_key_by_hash(&hash_secret(secret))? else {
            return Ok(refused(Rejection::InvalidKey));
        };

        let _guard = self.locks.acquire(&key.user_id).await?;

        let validation = self.keys.validate_at(Some(secret), operation, now)?;
        if !validation.valid {
            return Ok(AuthorizationResult {
                validation,
                charge: None,
            });
        }

        let charge = self.charge_locked(&key.user_id, operation, now)?;
        Ok(AuthorizationResult {
            validation,
            charge: Some(charge),
        })
    }

    /// The charge itself. The caller must hold the account's lock.
    fn charge_locked(
        &self,
        user_id: &UserId,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<OperationResult> {
        let mut account =
            self.store
                .get_account(user_id)?
                .ok_or_else(|| BillingError::AccountNotFound {
                    user_id: user_id.to_string(),
                })?;

        let policy = self.pricing.current()?;
        let cost = PolicySource::resolve(&policy, operation).cost_micros;
        let quota = QuotaSnapshot::evaluate(&account, policy.free_operations_monthly, now);

        if quota.rolled_over {
            tracing::debug!(
                user_id = %user_id,
                previous_used = account.free_operations_used,
                next_reset = %quota.reset_at,
                "Free operation quota rolled over"
            );
        }

        if quota.has_free_unit() {
            account.apply_quota(&quota);
            account.free_operations_used = quota.used + 1;
            account.updated_at = now;

            let tx = Transaction::free_operation(*user_id, operation, account.balance_micros, now);
            self.store.commit(&LedgerWrite::new(account.clone(), tx))?;
            self.record_usage(user_id, operation, now);

            let remaining = quota.limit - quota.used - 1;
            tracing::info!(
                user_id = %user_id,
                operation = %operation,
                free_remaining = remaining,
                "Free operation used"
            );
            return Ok(OperationResult::free(remaining, account.balance_micros, cost));
        }

        if !account.has_sufficient_balance(cost) {
            tracing::info!(
                user_id = %user_id,
                operation = %operation,
                balance_micros = account.balance_micros,
                cost_micros = cost,
                "Operation rejected: insufficient balance"
            );
            return Ok(OperationResult::insufficient(account.balance_micros, cost));
        }

        account.apply_quota(&quota);
        account.balance_micros -= cost;
        account.updated_at = now;

        let tx = Transaction::paid_operation(*user_id, operation, cost, account.balance_micros, now);
        self.store.commit(&LedgerWrite::new(account.clone(), tx))?;
        self.record_usage(user_id, operation, now);

        tracing::info!(
            user_id = %user_id,
            operation = %operation,
            cost_micros = cost,
            new_balance_micros = account.balance_micros,
            "Operation charged"
        );
        Ok(OperationResult::paid(account.balance_micros, cost))
    }

    /// Usage counters are reporting only; a failure must not undo the charge.
    fn record_usage(&self, user_id: &UserId, operation: &str, now: DateTime<Utc>) {
        if let Err(e) = self.store.increment_usage(user_id, operation, now) {
            tracing::warn!(
                user_id = %user_id,
                operation = %operation,
                error = %e,
                "Failed to record usage stat"
            );
        }
    }
}
