//! API key handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::Json;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use paygate_core::{micros_to_usd, ApiKey, ApiKeyId, Rejection, UserId, ValidationResult};

use crate::auth::{AuthUser, ServiceAuth};
use crate::error::ApiError;
use crate::handlers::operations::customer_key;
use crate::state::AppState;

/// Key metadata. The secret is never part of it.
#[derive(Debug, Serialize)]
pub struct ApiKeyResponse {
    /// Key ID.
    pub id: String,
    /// Display name.
    pub name: String,
    /// First characters of the secret.
    pub key_prefix: String,
    /// Allowed operations.
    pub permissions: Vec<String>,
    /// Expiry.
    pub expires_at: Option<String>,
    /// Last successful validation.
    pub last_used_at: Option<String>,
    /// Created timestamp.
    pub created_at: String,
}

impl From<&ApiKey> for ApiKeyResponse {
    fn from(key: &ApiKey) -> Self {
        Self {
            id: key.id.to_string(),
            name: key.name.clone(),
            key_prefix: key.key_prefix.clone(),
            permissions: key.permissions.clone(),
            expires_at: key.expires_at.map(|t| t.to_rfc3339()),
            last_used_at: key.last_used_at.map(|t| t.to_rfc3339()),
            created_at: key.created_at.to_rfc3339(),
        }
    }
}

/// Create key request.
#[derive(Debug, Deserialize)]
pub struct CreateKeyRequest {
    /// Display name.
    pub name: String,
    /// Requested operations; defaults apply when empty.
    #[serde(default)]
    pub permissions: Vec<String>,
    /// Optional expiry.
    #[serde(default)]
    pub expires_at: Option<DateTime<Utc>>,
}

/// Create key response: metadata plus the secret, shown this once.
#[derive(Debug, Serialize)]
pub struct CreateKeyResponse {
    /// Key metadata.
    #[serde(flatten)]
    pub key: ApiKeyResponse,
    /// The secret.
    pub secret: String,
}

/// Issue a new key.
pub async fn create_key(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Json(body): Json<CreateKeyRequest>,
) -> Result<(StatusCode, Json<CreateKeyResponse>), ApiError> {
    let name = body.name.trim();
    if name.is_empty() {
        return Err(ApiError::BadRequest("name is required".into()));
    }

    let issued = state
        .keys
        .create(&auth.user_id, name, &body.permissions, body.expires_at)
        .await?;

    Ok((
        StatusCode::CREATED,
        Json(CreateKeyResponse {
            key: ApiKeyResponse::from(&issued.key),
            secret: issued.secret,
        }),
    ))
}

/// List keys response.
#[derive(Debug, Serialize)]
pub struct ListKeysResponse {
    /// Keys, oldest first.
    pub keys: Vec<ApiKeyResponse>,
}

/// List the caller's keys.
pub async fn list_keys(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
) -> Result<Json<ListKeysResponse>, ApiError> {
    let keys = state.keys.list(&auth.user_id)?;
    Ok(Json(ListKeysResponse {
        keys: keys.iter().map(ApiKeyResponse::from).collect(),
    }))
}

/// Revoke one of the caller's keys.
pub async fn revoke_key(
    State(state): State<Arc<AppState>>,
    auth: AuthUser,
    Path(key_id): Path<ApiKeyId>,
) -> Result<StatusCode, ApiError> {
    state.keys.revoke(&auth.user_id, &key_id).await?;
    Ok(StatusCode::NO_CONTENT)
}

/// Validate key request. The key may also come in the `X-Api-Key` header.
#[derive(Debug, Deserialize)]
pub struct ValidateKeyRequest {
    /// Customer API key.
    #[serde(default)]
    pub api_key: Option<String>,
    /// Operation to check.
    pub operation: String,
}

/// Validation response.
#[derive(Debug, Serialize)]
pub struct ValidateKeyResponse {
    /// Whether the key may run the operation.
    pub valid: bool,
    /// Key owner.
    pub user_id: Option<UserId>,
    /// Owner's free operations left.
    pub free_operations_remaining: u32,
    /// Owner balance in micro-dollars.
    pub balance_micros: i64,
    /// Owner balance in dollars.
    pub balance_usd: f64,
    /// Refusal code.
    pub error: Option<Rejection>,
    /// Refusal message.
    pub message: Option<&'static str>,
}

impl From<ValidationResult> for ValidateKeyResponse {
    fn from(result: ValidationResult) -> Self {
        Self {
            valid: result.valid,
            user_id: result.user_id,
            free_operations_remaining: result.free_operations_remaining,
            balance_micros: result.balance_micros,
            balance_usd: micros_to_usd(result.balance_micros),
            error: result.error,
            message: result.error.map(Rejection::message),
        }
    }
}

/// Check a customer key without charging.
pub async fn validate_key(
    State(state): State<Arc<AppState>>,
    _auth: ServiceAuth,
    headers: HeaderMap,
    Json(body): Json<ValidateKeyRequest>,
) -> Result<Json<ValidateKeyResponse>, ApiError> {
    let secret = customer_key(&headers, body.api_key);
    let result = state.keys.validate(secret.as_deref(), &body.operation)?;
    Ok(Json(result.into()))
}
