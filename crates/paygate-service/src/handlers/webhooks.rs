//! Payment provider webhook handler.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::Json;
use serde::Serialize;
use serde_json::Value;

use crate::state::AppState;

/// Webhook response.
#[derive(Debug, Serialize)]
pub struct WebhookResponse {
    /// Whether the webhook was received.
    pub received: bool,
}

/// Handle payment provider callbacks.
///
/// Always acknowledged once the body has been read, so the provider stops
/// retrying; failures are logged and the payload is kept for audit.
pub async fn payment_webhook(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Json<WebhookResponse> {
    let raw = serde_json::from_slice::<Value>(&body).unwrap_or_else(|e| {
        tracing::warn!(error = %e, bytes = body.len(), "Unparsable webhook payload");
        serde_json::json!({ "unparsed": String::from_utf8_lossy(&body) })
    });

    let event_type = raw.get("event_type").and_then(Value::as_str);
    let event_id = raw.get("id").and_then(Value::as_str);
    tracing::info!(?event_type, ?event_id, "Received payment webhook");

    state.reconciler.handle_event(raw).await;

    Json(WebhookResponse { received: true })
}
