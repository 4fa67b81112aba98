//! Request and response types for the paygate API.

use serde::{Deserialize, Serialize};

use paygate_core::{Rejection, UserId};

// ============================================================================
// Requests
// ============================================================================

/// Charge one operation for a known user.
#[derive(Debug, Clone, Serialize)]
pub struct ChargeRequest {
    /// Account to charge.
    pub user_id: UserId,
    /// Operation name.
    pub operation: String,
}

/// Validate or authorize with a customer key.
#[derive(Debug, Clone, Serialize)]
pub struct KeyRequest {
    /// Customer API key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,
    /// Operation name.
    pub operation: String,
}

// ============================================================================
// Responses
// ============================================================================

/// Outcome of a charge.
#[derive(Debug, Clone, Deserialize)]
pub struct OperationResponse {
    /// Whether the operation may proceed.
    pub success: bool,
    /// Whether a free unit paid for it.
    pub used_free_operation: bool,
    /// Free units left this month.
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
    #[serde(default)]
    pub error: Option<Rejection>,
    /// Refusal message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of a key validation.
#[derive(Debug, Clone, Deserialize)]
pub struct ValidateKeyResponse {
    /// Whether the key may run the operation.
    pub valid: bool,
    /// Key owner.
    #[serde(default)]
    pub user_id: Option<UserId>,
    /// Free units left this month.
    #[serde(default)]
    pub free_operations_remaining: u32,
    /// Owner balance in micro-dollars.
    #[serde(default)]
    pub balance_micros: i64,
    /// Owner balance in dollars.
    #[serde(default)]
    pub balance_usd: f64,
    /// Refusal code.
    #[serde(default)]
    pub error: Option<Rejection>,
    /// Refusal message.
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of validate-then-charge.
#[derive(Debug, Clone, Deserialize)]
pub struct AuthorizeResponse {
    /// Whether the caller may run the operation.
    pub authorized: bool,
    /// Key validation.
    pub validation: ValidateKeyResponse,
    /// Charge, present when the key was valid.
    #[serde(default)]
    pub charge: Option<OperationResponse>,
}

/// API error envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorResponse {
    /// Error details.
    pub error: ApiErrorBody,
}

/// API error body.
#[derive(Debug, Clone, Deserialize)]
pub struct ApiErrorBody {
    /// Error code.
    pub code: String,
    /// Error message.
    pub message: String,
    /// Additional details.
    #[serde(default)]
    pub details: Option<serde_json::Value>,
}
