//! Admin handlers: pricing, ledger audits, roles and webhook history.

use std::collections::BTreeMap;
use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::Json;
use chrono::Utc;
use serde::{Deserialize, Serialize};

use paygate_core::{
    micros_to_usd, usd_to_micros, BillingError, PricingPolicy, Role, UserId, WebhookEvent,
};

use crate::auth::AdminAuth;
use crate::error::ApiError;
use crate::handlers::accounts::AccountResponse;
use crate::state::AppState;

/// Pricing policy as exchanged with administrators, in dollars.
#[derive(Debug, Serialize, Deserialize)]
pub struct PricingView {
    /// Global cost of one operation.
    pub operation_cost_usd: f64,
    /// Monthly free allowance.
    pub free_operations_monthly: u32,
    /// Per-operation overrides.
    #[serde(default)]
    pub custom_prices: BTreeMap<String, f64>,
    /// When the policy was last saved.
    #[serde(default, skip_deserializing)]
    pub updated_at: Option<String>,
}

impl From<&PricingPolicy> for PricingView {
    fn from(policy: &PricingPolicy) -> Self {
        Self {
            operation_cost_usd: micros_to_usd(policy.operation_cost_micros),
            free_operations_monthly: policy.free_operations_monthly,
            custom_prices: policy
                .custom_prices
                .iter()
                .map(|(op, micros)| (op.clone(), micros_to_usd(*micros)))
                .collect(),
            updated_at: policy.updated_at.map(|t| t.to_rfc3339()),
        }
    }
}

/// Get the pricing policy in force.
pub async fn get_pricing(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
) -> Result<Json<PricingView>, ApiError> {
    let policy = state.pricing.current()?;
    Ok(Json(PricingView::from(&policy)))
}

/// Replace the pricing policy.
pub async fn update_pricing(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Json(body): Json<PricingView>,
) -> Result<Json<PricingView>, ApiError> {
    let mut policy = PricingPolicy::new(
        usd_to_micros(body.operation_cost_usd),
        body.free_operations_monthly,
    );
    for (operation, usd) in body.custom_prices {
        policy = policy.with_custom_price(operation, usd_to_micros(usd));
    }

    let saved = state.pricing.update(policy, Utc::now())?;
    tracing::info!(admin_id = %auth.admin_id, "Pricing updated by admin");
    Ok(Json(PricingView::from(&saved)))
}

/// Ledger audit response.
#[derive(Debug, Serialize)]
pub struct AuditResponse {
    /// Audited account.
    pub user_id: UserId,
    /// Whether the ledger matches the balance.
    pub consistent: bool,
    /// Balance recomputed from the ledger, when consistent.
    pub ledger_balance_micros: Option<i64>,
    /// Mismatch description.
    pub error: Option<String>,
}

/// Audit an account's ledger against its balance.
pub async fn audit_account(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Path(user_id): Path<UserId>,
) -> Result<Json<AuditResponse>, ApiError> {
    let response = match state.accounts.audit(&user_id).await {
        Ok(sum) => AuditResponse {
            user_id,
            consistent: true,
            ledger_balance_micros: Some(sum),
            error: None,
        },
        Err(BillingError::InvariantViolation(msg)) => AuditResponse {
            user_id,
            consistent: false,
            ledger_balance_micros: None,
            error: Some(msg),
        },
        Err(e) => return Err(e.into()),
    };
    Ok(Json(response))
}

/// Set role request.
#[derive(Debug, Deserialize)]
pub struct SetRoleRequest {
    /// New role.
    pub role: Role,
}

/// Change an account's role (e.g. suspend it).
pub async fn set_role(
    State(state): State<Arc<AppState>>,
    auth: AdminAuth,
    Path(user_id): Path<UserId>,
    Json(body): Json<SetRoleRequest>,
) -> Result<Json<AccountResponse>, ApiError> {
    let account = state.accounts.set_role(&user_id, body.role).await?;
    tracing::info!(admin_id = %auth.admin_id, user_id = %user_id, "Role set by admin");
    Ok(Json(AccountResponse::from(&account)))
}

/// Webhook history query parameters.
#[derive(Debug, Deserialize)]
pub struct WebhookEventsQuery {
    /// Maximum number of events (default: 50, max: 500).
    #[serde(default = "default_limit")]
    pub limit: usize,
}

fn default_limit() -> usize {
    50
}

/// Webhook history response.
#[derive(Debug, Serialize)]
pub struct WebhookEventsResponse {
    /// Received events, newest first.
    pub events: Vec<WebhookEvent>,
}

/// List received provider callbacks.
pub async fn list_webhook_events(
    State(state): State<Arc<AppState>>,
    _auth: AdminAuth,
    Query(query): Query<WebhookEventsQuery>,
) -> Result<Json<WebhookEventsResponse>, ApiError> {
    let events = state.store.list_webhook_events(query.limit.min(500))?;
    Ok(Json(WebhookEventsResponse { events }))
}
