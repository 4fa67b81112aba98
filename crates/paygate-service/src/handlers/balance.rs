//! Balance summary and transaction history handlers.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use paygate_core::{
    format_usd, micros_to_usd, Transaction, TransactionKind, TransactionStatus,
};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Ledger entry as shown to its owner.
#[derive(Debug, Serialize)]
pub struct TransactionResponse {
    /// Transaction ID.
    pub id: String,
    /// Amount in micro-dollars (positive = deposit, negative = charge).
    pub amount_micros: i64,
    /// Display amount: `Free`, `+10.000`, `-0.005`.
    pub amount: String,
    /// Balance after this entry, in micro-dollars.
    pub balance_after_micros: i64,
    /// Balance after this entry, in dollars.
    pub balance_after_usd: f64,
    /// Description.
    pub description: String,
    /// Lifecycle status.
    pub status: TransactionStatus,
    /// Entry kind.
    pub kind: TransactionKind,
    /// Operation name for operation entries.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub operation: Option<String>,
    /// Provider reference for deposits.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_reference: Option<String>,
    /// Timestamp.
    pub created_at: String,
}

impl From<&Transaction> for TransactionResponse {
    fn from(tx: &Transaction) -> Self {
        Self {
            id: tx.id.to_string(),
            amount_micros: tx.amount_micros,
            amount: tx.display_amount(),
            balance_after_micros: tx.balance_after_micros,
            balance_after_usd: micros_to_usd(tx.balance_after_micros),
            description: tx.description.clone(),
            status: tx.status,
            kind: tx.kind,
            operation: tx.operation.clone(),
            payment_reference: tx.payment_reference.clone(),
            created_at: tx.created_at.to_rfc3339(),
        }
    }
}

/// Balance summary response.
#[derive(Debug, Serialize)]
pub struct BalanceResponse {
    /// Balance in micro-dollars.
    pub balance_micros: i64,
    /// Balance in dollars.
    pub balance_usd: f64,
    /// Balance formatted as dollars.
    pub balance_formatted: String,
    /// Free operations used this month.
    pub free_operations_used: u32,
    /// Free operations left this month.
    pub free_operations_remaining: u32,
    /// Monthly allowance.
    pub free_operations_total: u32,
    /// When the allowance resets.
    pub next_reset_date: String,
    /// Latest ledger entries.
    pub transactions: Vec<TransactionResponse>,
    /// Operations this month.
    pub total_operations: u64,
    /// Operations this month by name.
    pub operation_counts: BTreeMap<String, u64>,
}

/// Get the balance, quota and this month's usage.
pub async fn get_balance(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<BalanceResponse>, ApiError> {
    let summary = state.accounts.balance_summary(&auth.user_id, Utc::now())?;

    Ok(Json(BalanceResponse {
        balance_micros: summary.balance_micros,
        balance_usd: micros_to_usd(summary.balance_micros),
        balance_formatted: format_usd(summary.balance_micros),
        free_operations_used: summary.free_operations_used,
        free_operations_remaining: summary.free_operations_remaining,
        free_operations_total: summary.free_operations_total,
        next_reset_date: summary.next_reset_date.to_rfc3339(),
        transactions: summary
            .recent_transactions
            .iter()
            .map(TransactionResponse::from)
            .collect(),
        total_operations: summary.total_operations,
        operation_counts: summary.operation_counts,
    }))
}

/// Transaction list query parameters.
#[derive(Debug, Deserialize)]
pub struct ListTransactionsQuery {
    /// Maximum number of transactions to return (default: 50).
    #[serde(default = "default_limit")]
    pub limit: usize,
    /// Offset for pagination (default: 0).
    #[serde(default)]
    pub offset: usize,
}

fn default_limit() -> usize {
    50
}

/// List transactions response.
#[derive(Debug, Serialize)]
pub struct ListTransactionsResponse {
    /// Transactions (newest first).
    pub transactions: Vec<TransactionResponse>,
    /// Whether there are more transactions.
    pub has_more: bool,
}

/// List transaction history.
pub async fn list_transactions(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Query(query): Query<ListTransactionsQuery>,
) -> Result<Json<ListTransactionsResponse>, ApiError> {
    // Fetch one more than requested to determine has_more
    let limit = query.limit.min(100);
    let transactions = state
        .accounts
        .transactions(&auth.user_id, limit + 1, query.offset)?;

    let has_more = transactions.len() > limit;
    let transactions: Vec<_> = transactions
        .iter()
        .take(limit)
        .map(TransactionResponse::from)
        .collect();

    Ok(Json(ListTransactionsResponse {
        transactions,
        has_more,
    }))
}
