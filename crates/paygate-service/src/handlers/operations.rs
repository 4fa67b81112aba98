//! Operation charging handlers (service auth).
//!
//! Refusals are answered with `200` and `success: false`; only
//! infrastructure failures produce error statuses.

use std::sync::Arc;

use axum::extract::State;
use axum::http::HeaderMap;
use axum::Json;
use serde::{Deserialize, Serialize};

use paygate_core::{micros_to_usd, OperationResult, Rejection, UserId};

use crate::auth::ServiceAuth;
use crate::error::ApiError;
use crate::handlers::keys::ValidateKeyResponse;
use crate::state::AppState;

/// Header a customer API key may be passed in.
pub const CUSTOMER_KEY_HEADER: &str = "x-api-key";

/// The customer key from the header, else from the body.
pub(crate) fn customer_key(headers: &HeaderMap, from_body: Option<String>) -> Option<String> {
    headers
        .get(CUSTOMER_KEY_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .or(from_body)
        .filter(|k| !k.is_empty())
}

/// Charge request for a known user.
#[derive(Debug, Deserialize)]
pub struct ChargeRequest {
    /// Account to charge.
    pub user_id: UserId,
    /// Operation name.
    pub operation: String,
}

/// Charge outcome.
#[derive(Debug, Serialize)]
pub struct OperationResponse {
    /// Whether the operation may proceed.
    pub success: bool,
    /// Whether a free unit paid for it.
    pub used_free_operation: bool,
    /// Free units left.
    pub free_operations_remaining: u32,
    /// Balance after the call, in micro-dollars.
    pub current_balance_micros: i64,
    /// Balance after the call, in dollars.
    pub current_balance_usd: f64,
    /// Price of the operation, in micro-dollars.
    pub operation_cost_micros: i64,
    /// Price of the operation, in dollars.
    pub operation_cost_usd: f64,
    /// Refusal code.
    pub error: Option<Rejection>,
    /// Refusal message.
    pub message: Option<&'static str>,
}

impl From<OperationResult> for OperationResponse {
    fn from(result: OperationResult) -> Self {
        Self {
            success: result.success,
            used_free_operation: result.used_free_operation,
            free_operations_remaining: result.free_operations_remaining,
            current_balance_micros: result.current_balance_micros,
            current_balance_usd: micros_to_usd(result.current_balance_micros),
            operation_cost_micros: result.operation_cost_micros,
            operation_cost_usd: micros_to_usd(result.operation_cost_micros),
            error: result.error,
            message: result.error.map(Rejection::message),
        }
    }
}

/// Charge one operation for a user.
pub async fn charge(
    State(state): State<Arc<AppState>>,
    auth: ServiceAuth,
    Json(body): Json<ChargeRequest>,
) -> Result<Json<OperationResponse>, ApiError> {
    tracing::debug!(
        service = %auth.service_name,
        user_id = %body.user_id,
        operation = %body.operation,
        "Charge requested"
    );

    let result = state
        .gate
        .process_operation(&body.user_id, &body.operation)
        .await?;
    Ok(Json(result.into()))
}

/// Authorize request: a customer key and the operation it wants to run.
#[derive(Debug, Deserialize)]
pub struct AuthorizeRequest {
    /// Customer API key; the `X-Api-Key` header takes precedence.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Operation name.
    pub operation: String,
}

/// Authorize outcome.
#[derive(Debug, Serialize)]
pub struct AuthorizeResponse {
    /// Whether the caller may run the operation.
    pub authorized: bool,
    /// Key validation.
    pub validation: ValidateKeyResponse,
    /// Charge, present when the key was valid.
    pub charge: Option<OperationResponse>,
}

/// Validate a customer key and charge the operation in one step.
pub async fn authorize(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    headers: HeaderMap,
    Json(body): Json<AuthorizeRequest>,
) -> Result<Json<AuthorizeResponse>, ApiError> {
    let secret = customer_key(&headers, body.api_key);
    let result = state
        .gate
        .authorize_and_charge(secret.as_deref(), &body.operation)
        .await?;

    Ok(Json(AuthorizeResponse {
        authorized: result.is_authorized(),
        validation: result.validation.into(),
        charge: result.charge.map(Into::into),
    }))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn header_key_wins_over_body() {
        let mut headers = HeaderMap::new();
        assert_eq!(customer_key(&headers, Some("sk_body".into())).as_deref(), Some("sk_body"));
        assert_eq!(customer_key(&headers, Some(String::new())), None);

        headers.insert(CUSTOMER_KEY_HEADER, HeaderValue::from_static("sk_header"));
        assert_eq!(
            customer_key(&headers, Some("sk_body".into())).as_deref(),
            Some("sk_header")
        );
    }
}
