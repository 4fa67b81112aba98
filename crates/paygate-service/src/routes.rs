//! Router configuration.
//!
//! This module sets up the Axum router with all routes and middleware.

use std::sync::Arc;
use std::time::Duration;

use axum::routing::{delete, get, post, put};
use axum::Router;
use tower_http::cors::{Any, CorsLayer};
use tower_http::limit::RequestBodyLimitLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use crate::handlers::{accounts, admin, balance, deposits, health, keys, operations, webhooks};
use crate::state::AppState;

/// Create the service router with all routes and middleware.
///
/// # Routes
///
/// ## Public
/// - `GET /health` - Health check
///
/// ## Accounts (user JWT)
/// - `POST /v1/accounts` - Register account
/// - `GET /v1/accounts/me` - Get current user's account
/// - `DELETE /v1/accounts/me` - Delete account and everything it owns
///
/// ## Balance (user JWT)
/// - `GET /v1/balance` - Balance, quota and this month's usage
/// - `GET /v1/transactions` - Transaction history
/// - `POST /v1/deposits` - Create a pending deposit
///
/// ## API keys (user JWT)
/// - `POST /v1/keys` - Issue a key
/// - `GET /v1/keys` - List keys
/// - `DELETE /v1/keys/:id` - Revoke a key
///
/// ## Metering (service key)
/// - `POST /v1/keys/validate` - Validate a customer key
/// - `POST /v1/operations/charge` - Charge an operation for a user
/// - `POST /v1/operations/authorize` - Validate a customer key and charge
///
/// ## Webhooks
/// - `POST /webhooks/payments` - Payment provider callbacks
///
/// ## Admin (admin key)
/// - `GET|PUT /v1/admin/pricing` - Pricing policy
/// - `GET /v1/admin/accounts/:user_id/audit` - Ledger audit
/// - `PUT /v1/admin/accounts/:user_id/role` - Change role
/// - `GET /v1/admin/webhooks` - Received callbacks
pub fn create_router(state: AppState) -> Router {
    // Extract config values before moving state
    let cors_origins = state.config.cors_origins.clone();
    let max_body_bytes = state.config.max_body_bytes;
    let request_timeout_seconds = state.config.request_timeout_seconds;

    let cors = build_cors_layer(&cors_origins);

    let state = Arc::new(state);

    Router::new()
        // Health (public)
        .route("/health", get(health::health))
        // Accounts
        .route("/v1/accounts", post(accounts::create_account))
        .route(
            "/v1/accounts/me",
            get(accounts::get_account).delete(accounts::delete_account),
        )
        // Balance
        .route("/v1/balance", get(balance::get_balance))
        .route("/v1/transactions", get(balance::list_transactions))
        .route("/v1/deposits", post(deposits::create_deposit))
        // API keys
        .route("/v1/keys", post(keys::create_key).get(keys::list_keys))
        .route("/v1/keys/validate", post(keys::validate_key))
        .route("/v1/keys/:key_id", delete(keys::revoke_key))
        // Metering (service auth)
        .route("/v1/operations/charge", post(operations::charge))
        .route("/v1/operations/authorize", post(operations::authorize))
        // Webhooks
        .route("/webhooks/payments", post(webhooks::payment_webhook))
        // Admin
        .route(
            "/v1/admin/pricing",
            get(admin::get_pricing).put(admin::update_pricing),
        )
        .route(
            "/v1/admin/accounts/:user_id/audit",
            get(admin::audit_account),
        )
        .route("/v1/admin/accounts/:user_id/role", put(admin::set_role))
        .route("/v1/admin/webhooks", get(admin::list_webhook_events))
        // Middleware
        .layer(TraceLayer::new_for_http())
        .layer(cors)
        .layer(RequestBodyLimitLayer::new(max_body_bytes))
        .layer(TimeoutLayer::new(Duration::from_secs(
            request_timeout_seconds,
        )))
        .with_state(state)
}

/// Build the CORS layer from configured origins.
fn build_cors_layer(origins: &[String]) -> CorsLayer {
    if origins.iter().any(|o| o == "*") {
        CorsLayer::new()
            .allow_origin(Any)
            .allow_methods(Any)
            .allow_headers(Any)
    } else {
        let origins: Vec<_> = origins.iter().filter_map(|o| o.parse().ok()).collect();

        CorsLayer::new()
            .allow_origin(origins)
            .allow_methods(Any)
            .allow_headers(Any)
    }
}
