//! Deposit handlers.

use std::sync::Arc;

use axum::extract::State;
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;

use paygate_core::usd_to_micros;

use crate::auth::AuthUser;
use crate::error::ApiError;
use crate::handlers::balance::TransactionResponse;
use crate::state::AppState;

/// Create deposit request.
#[derive(Debug, Deserialize)]
pub struct CreateDepositRequest {
    /// Amount in dollars.
    pub amount_usd: f64,
    /// Provider order id. Generated when absent.
    #[serde(default)]
    pub payment_reference: Option<String>,
}

/// Record a pending deposit. The balance changes only once the payment
/// provider confirms it.
pub async fn create_deposit(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateDepositRequest>,
) -> Result<(StatusCode, Json<TransactionResponse>), ApiError> {
    if !body.amount_usd.is_finite() {
        return Err(ApiError::BadRequest("amount_usd must be a number".into()));
    }

    let tx = state
        .reconciler
        .create_deposit(
            &auth.user_id,
            usd_to_micros(body.amount_usd),
            body.payment_reference,
        )
        .await?;

    Ok((StatusCode::CREATED, Json(TransactionResponse::from(&tx))))
}
