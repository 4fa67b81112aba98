//! Account lifecycle, balance summaries and ledger audits.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};

use paygate_core::{
    ledger, month_start, Account, BillingError, QuotaSnapshot, Result, Role, Transaction,
    UserId, HIDDEN_OPERATION,
};
use paygate_store::{Store, StoreError};

use super::locks::AccountLocks;
use super::pricing::PolicySource;

/// Entries included in a balance summary.
pub const RECENT_TRANSACTIONS: usize = 10;

/// A point-in-time view of an account for its owner.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct BalanceSummary {
    /// Spendable balance.
    pub balance_micros: i64,
    /// Free operations used this period.
    pub free_operations_used: u32,
    /// Free operations left this period.
    pub free_operations_remaining: u32,
    /// Monthly allowance.
    pub free_operations_total: u32,
    /// When the free quota next resets.
    pub next_reset_date: DateTime<Utc>,
    /// Newest ledger entries.
    pub recent_transactions: Vec<Transaction>,
    /// Operations recorded since the start of the month.
    pub total_operations: u64,
    /// Per-operation counts since the start of the month.
    pub operation_counts: BTreeMap<String, u64>,
}

/// Account management on top of the store.
#[derive(Clone)]
pub struct AccountService {
    store: Arc<dyn Store>,
    locks: Arc<AccountLocks>,
    pricing: PolicySource,
}

impl AccountService {
    /// Create an account service.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, locks: Arc<AccountLocks>, pricing: PolicySource) -> Self {
        Self {
            store,
            locks,
            pricing,
        }
    }

    /// Create an empty account for an authenticated user.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountAlreadyExists` if it already exists.
    pub async fn register(&self, user_id: &UserId) -> Result<Account> {
        let _guard = self.locks.acquire(user_id).await?;

        if self.store.get_account(user_id)?.is_some() {
            return Err(BillingError::AccountAlreadyExists {
                user_id: user_id.to_string(),
            });
        }

        let account = Account::new(*user_id, Utc::now());
        self.store.put_account(&account)?;

        tracing::info!(user_id = %user_id, "Account created");
        Ok(account)
    }

    /// Load an account.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if it doesn't exist.
    pub fn get(&self, user_id: &UserId) -> Result<Account> {
        self.store
            .get_account(user_id)?
            .ok_or_else(|| BillingError::AccountNotFound {
                user_id: user_id.to_string(),
            })
    }

    /// Delete an account and everything it owns.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if it doesn't exist.
    pub async fn delete(&self, user_id: &UserId) -> Result<()> {
        let _guard = self.locks.acquire(user_id).await?;

        match self.store.delete_account(user_id) {
            Ok(()) => {
                tracing::info!(user_id = %user_id, "Account deleted");
                Ok(())
            }
            Err(StoreError::NotFound) => Err(BillingError::AccountNotFound {
                user_id: user_id.to_string(),
            }),
            Err(e) => Err(e.into()),
        }
    }

    /// Change an account's role. Suspending takes effect on the next key
    /// validation.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if it doesn't exist.
    pub async fn set_role(&self, user_id: &UserId, role: Role) -> Result<Account> {
        let _guard = self.locks.acquire(user_id).await?;

        let mut account = self.get(user_id)?;
        account.role = role;
        account.updated_at = Utc::now();
        self.store.put_account(&account)?;

        tracing::info!(user_id = %user_id, role = ?role, "Account role changed");
        Ok(account)
    }

    /// A page of the account's ledger, newest first.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn transactions(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        self.get(user_id)?;
        Ok(self
            .store
            .list_transactions_by_user(user_id, limit, offset)?)
    }

    /// Balance, quota and this month's usage.
    ///
    /// The quota is projected to `now` without writing; a stale period shows
    /// as a fresh one.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::AccountNotFound` if the account doesn't exist.
    pub fn balance_summary(&self, user_id: &UserId, now: DateTime<Utc>) -> Result<BalanceSummary> {
        let account = self.get(user_id)?;
        let policy = self.pricing.current()?;
        let quota = QuotaSnapshot::evaluate(&account, policy.free_operations_monthly, now);

        let recent_transactions =
            self.store
                .list_transactions_by_user(user_id, RECENT_TRANSACTIONS, 0)?;

        let mut operation_counts = BTreeMap::new();
        for stat in self
            .store
            .list_usage_since(user_id, month_start(now).date_naive())?
        {
            if stat.operation == HIDDEN_OPERATION {
                continue;
            }
            *operation_counts.entry(stat.operation).or_insert(0) += stat.count;
        }
        let total_operations = operation_counts.values().sum();

        Ok(BalanceSummary {
            balance_micros: account.balance_micros,
            free_operations_used: quota.used,
            free_operations_remaining: quota.remaining(),
            free_operations_total: quota.limit,
            next_reset_date: quota.reset_at,
            recent_transactions,
            total_operations,
            operation_counts,
        })
    }

    /// Check that the completed ledger sums to the stored balance.
    ///
    /// # Errors
    ///
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    /// - `BillingError::InvariantViolation` if the ledger and balance disagree.
    pub async fn audit(&self, user_id: &UserId) -> Result<i64> {
        let _guard = self.locks.acquire(user_id).await?;

        let account = self.get(user_id)?;
        let ledger = self.store.list_transactions_by_user(user_id, usize::MAX, 0)?;

        ledger::audit(account.balance_micros, &ledger).inspect_err(|e| {
            tracing::error!(
                user_id = %user_id,
                balance_micros = account.balance_micros,
                entries = ledger.len(),
                error = %e,
                "Ledger audit failed"
            );
        })
    }
}
