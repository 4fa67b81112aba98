//! API error types and responses.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use paygate_core::BillingError;

/// API error type.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    /// Unauthorized - missing or invalid credentials.
    #[error("unauthorized")]
    Unauthorized,

    /// Forbidden - valid credentials but the action is not allowed.
    #[error("forbidden: {0}")]
    Forbidden(String),

    /// Resource not found.
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad request - invalid input.
    #[error("bad request: {0}")]
    BadRequest(String),

    /// Conflict - resource already exists.
    #[error("conflict: {0}")]
    Conflict(String),

    /// The account stayed busy for too long; the request may be retried.
    #[error("transaction conflict: {0}")]
    TransactionConflict(String),

    /// Internal server error.
    #[error("internal error: {0}")]
    Internal(String),
}

/// JSON error response body.
#[derive(Debug, Serialize)]
struct ErrorResponse {
    error: ErrorBody,
}

#[derive(Debug, Serialize)]
struct ErrorBody {
    code: String,
    message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    details: Option<serde_json::Value>,
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, code, message, details) = match &self {
            Self::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "unauthorized",
                self.to_string(),
                None,
            ),
            Self::Forbidden(msg) => (StatusCode::FORBIDDEN, "forbidden", msg.clone(), None),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, "not_found", msg.clone(), None),
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg.clone(), None),
            Self::Conflict(msg) => (StatusCode::CONFLICT, "conflict", msg.clone(), None),
            Self::TransactionConflict(msg) => (
                StatusCode::SERVICE_UNAVAILABLE,
                "transaction_conflict",
                msg.clone(),
                Some(serde_json::json!({ "retryable": true })),
            ),
            Self::Internal(msg) => {
                tracing::error!(error = %msg, "Internal server error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "internal_error",
                    "An internal error occurred".to_string(),
                    None,
                )
            }
        };

        let body = ErrorResponse {
            error: ErrorBody {
                code: code.to_string(),
                message,
                details,
            },
        };

        (status, Json(body)).into_response()
    }
}

impl From<BillingError> for ApiError {
    fn from(err: BillingError) -> Self {
        match err {
            BillingError::AccountNotFound { .. }
            | BillingError::TransactionNotFound { .. }
            | BillingError::ApiKeyNotFound { .. } => Self::NotFound(err.to_string()),
            BillingError::AccountAlreadyExists { .. } | BillingError::DuplicateReference { .. } => {
                Self::Conflict(err.to_string())
            }
            BillingError::ApiKeyLimitReached { .. } => Self::Forbidden(err.to_string()),
            BillingError::InvalidAmount(_)
            | BillingError::InvalidPermission(_)
            | BillingError::InvalidPricing(_)
            | BillingError::InvalidId(_) => Self::BadRequest(err.to_string()),
            BillingError::TransactionConflict { .. } => Self::TransactionConflict(err.to_string()),
            BillingError::Storage(_)
            | BillingError::InvariantViolation(_)
            | BillingError::Configuration(_) => Self::Internal(err.to_string()),
        }
    }
}

impl From<paygate_store::StoreError> for ApiError {
    fn from(err: paygate_store::StoreError) -> Self {
        BillingError::from(err).into()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn billing_errors_map_to_status() {
        let status = |e: BillingError| ApiError::from(e).into_response().status();

        assert_eq!(
            status(BillingError::AccountNotFound {
                user_id: "u".into()
            }),
            StatusCode::NOT_FOUND
        );
        assert_eq!(
            status(BillingError::TransactionConflict {
                user_id: "u".into()
            }),
            StatusCode::SERVICE_UNAVAILABLE
        );
        assert_eq!(
            status(BillingError::ApiKeyLimitReached { limit: 1 }),
            StatusCode::FORBIDDEN
        );
        assert_eq!(
            status(BillingError::InvalidAmount("too small".into())),
            StatusCode::BAD_REQUEST
        );
        assert_eq!(
            status(BillingError::Storage("down".into())),
            StatusCode::INTERNAL_SERVER_ERROR
        );
    }
}
