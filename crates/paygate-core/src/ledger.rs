//! Ledger entries for paygate.
//!
//! Every balance-affecting event appends a [`Transaction`] that carries the
//! resulting balance. Summing the amounts of all completed entries for an
//! account, in creation order, must give the account's balance.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::format_signed;
use crate::{BillingError, Result, TransactionId, UserId};

/// A ledger entry.
///
/// Completed and failed entries are immutable. A pending entry (an
/// unconfirmed deposit) transitions exactly once.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Transaction {
    /// Unique transaction ID (ULID for time-ordering).
    pub id: TransactionId,

    /// The account this entry belongs to.
    pub user_id: UserId,

    /// Micro-dollars. Negative = charge, positive = deposit, zero = free operation.
    pub amount_micros: i64,

    /// Balance after this entry was applied. For pending entries, the balance
    /// at creation time.
    pub balance_after_micros: i64,

    /// Human-readable description.
    pub description: String,

    /// Payment provider reference (order id) for deposits.
    pub payment_reference: Option<String>,

    /// Lifecycle status.
    pub status: TransactionStatus,

    /// What produced the entry.
    pub kind: TransactionKind,

    /// Operation name for operation entries.
    pub operation: Option<String>,

    /// When the entry was created.
    pub created_at: DateTime<Utc>,

    /// When the status last changed.
    pub updated_at: DateTime<Utc>,
}

impl Transaction {
    /// A zero-amount entry for an operation covered by the free quota.
    #[must_use]
    pub fn free_operation(
        user_id: UserId,
        operation: &str,
        balance_micros: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_micros: 0,
            balance_after_micros: balance_micros,
            description: format!("Operation: {operation} (Free)"),
            payment_reference: None,
            status: TransactionStatus::Completed,
            kind: TransactionKind::Operation,
            operation: Some(operation.to_string()),
            created_at: at,
            updated_at: at,
        }
    }

    /// A charge for a paid operation.
    #[must_use]
    pub fn paid_operation(
        user_id: UserId,
        operation: &str,
        cost_micros: i64,
        balance_after_micros: i64,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_micros: -cost_micros.abs(), // Always negative for charges
            balance_after_micros,
            description: format!("Operation: {operation}"),
            payment_reference: None,
            status: TransactionStatus::Completed,
            kind: TransactionKind::Operation,
            operation: Some(operation.to_string()),
            created_at: at,
            updated_at: at,
        }
    }

    /// A deposit awaiting confirmation from the payment provider.
    ///
    /// The snapshot projects the balance as if the deposit had landed; it is
    /// rewritten with the actual balance on completion.
    #[must_use]
    pub fn pending_deposit(
        user_id: UserId,
        amount_micros: i64,
        current_balance_micros: i64,
        payment_reference: String,
        at: DateTime<Utc>,
    ) -> Self {
        Self {
            id: TransactionId::generate(),
            user_id,
            amount_micros,
            balance_after_micros: current_balance_micros.saturating_add(amount_micros),
            description: "Deposit - pending".to_string(),
            payment_reference: Some(payment_reference),
            status: TransactionStatus::Pending,
            kind: TransactionKind::Deposit,
            operation: None,
            created_at: at,
            updated_at: at,
        }
    }

    /// Whether the entry still awaits confirmation.
    #[must_use]
    pub fn is_pending(&self) -> bool {
        self.status == TransactionStatus::Pending
    }

    /// Confirm a pending deposit.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvariantViolation` if the entry is not pending.
    pub fn complete(&mut self, balance_after_micros: i64, at: DateTime<Utc>) -> Result<()> {
        self.transition(TransactionStatus::Completed, at)?;
        self.balance_after_micros = balance_after_micros;
        self.description = "Deposit - completed".to_string();
        Ok(())
    }

    /// Mark a pending deposit as failed. The balance is not touched.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvariantViolation` if the entry is not pending.
    pub fn fail(&mut self, at: DateTime<Utc>) -> Result<()> {
        self.transition(TransactionStatus::Failed, at)?;
        self.description = "Deposit - failed".to_string();
        Ok(())
    }

    fn transition(&mut self, to: TransactionStatus, at: DateTime<Utc>) -> Result<()> {
        if !self.is_pending() {
            return Err(BillingError::InvariantViolation(format!(
                "transaction {} is {:?}, cannot move to {to:?}",
                self.id, self.status
            )));
        }
        self.status = to;
        self.updated_at = at;
        Ok(())
    }

    /// Amount as shown on dashboards: `Free`, `+10.000`, `-0.005`.
    #[must_use]
    pub fn display_amount(&self) -> String {
        if self.amount_micros == 0 && self.kind == TransactionKind::Operation {
            "Free".to_string()
        } else {
            format_signed(self.amount_micros)
        }
    }
}

/// Ledger entry status.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionStatus {
    /// Awaiting provider confirmation.
    Pending,
    /// Applied to the balance.
    Completed,
    /// Rejected or refunded by the provider; never applied.
    Failed,
}

/// What produced a ledger entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    /// A billable operation (free or paid).
    Operation,
    /// A customer top-up.
    Deposit,
}

/// Replay completed entries and compare the sum with `balance_micros`.
///
/// # Errors
///
/// Returns `BillingError::InvariantViolation` when the sum differs.
pub fn audit(balance_micros: i64, transactions: &[Transaction]) -> Result<i64> {
    let sum: i64 = transactions
        .iter()
        .filter(|t| t.status == TransactionStatus::Completed)
        .map(|t| t.amount_micros)
        .sum();

    if sum != balance_micros {
        return Err(BillingError::InvariantViolation(format!(
            "ledger sum {sum} does not match balance {balance_micros}"
        )));
    }
    Ok(sum)
}
