//! Account management handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Serialize;

use paygate_core::{format_usd, micros_to_usd, Account, Role};

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::state::AppState;

/// Account response.
#[derive(Debug, Serialize)]
pub struct AccountResponse {
    /// User ID.
    pub user_id: String,
    /// Balance in micro-dollars.
    pub balance_micros: i64,
    /// Balance in dollars.
    pub balance_usd: f64,
    /// Balance formatted as dollars.
    pub balance_formatted: String,
    /// Free operations used in the stored period.
    pub free_operations_used: u32,
    /// End of the stored period.
    pub free_operations_reset: String,
    /// Account role.
    pub role: Role,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&Account> for AccountResponse {
    fn from(account: &Account) -> Self {
        Self {
            user_id: account.user_id.to_string(),
            balance_micros: account.balance_micros,
            balance_usd: micros_to_usd(account.balance_micros),
            balance_formatted: format_usd(account.balance_micros),
            free_operations_used: account.free_operations_used,
            free_operations_reset: account.free_operations_reset.to_rfc3339(),
            role: account.role,
            created_at: account.created_at.to_rfc3339(),
        }
    }
}

/// Register an account for the authenticated user.
pub async fn create_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<(StatusCode, Json<AccountResponse>), ApiError> {
    let account = state.accounts.register(&auth.user_id).await?;
    Ok((StatusCode::CREATED, Json(AccountResponse::from(&account))))
}

/// Get the current user's account.
pub async fn get_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.accounts.get(&auth.user_id)?;
    Ok(Json(AccountResponse::from(&account)))
}

/// Delete the current user's account and everything it owns.
pub async fn delete_account(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<StatusCode, ApiError> {
    state.accounts.delete(&auth.user_id).await?;
    Ok(StatusCode::NO_CONTENT)
}
