//! Payment provider callbacks.
//!
//! The provider payload is trusted once stored; signature verification is
//! done (or not) by whatever sits in front of the service.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::WebhookEventId;

/// Capture completed.
pub const EVENT_CAPTURE_COMPLETED: &str = "PAYMENT.CAPTURE.COMPLETED";
/// Order completed (treated as a capture).
pub const EVENT_ORDER_COMPLETED: &str = "CHECKOUT.ORDER.COMPLETED";
/// Capture denied.
pub const EVENT_CAPTURE_DENIED: &str = "PAYMENT.CAPTURE.DENIED";
/// Capture refunded.
pub const EVENT_CAPTURE_REFUNDED: &str = "PAYMENT.CAPTURE.REFUNDED";

/// Classification of a provider event.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaymentEventKind {
    /// Funds captured; credit the pending deposit.
    Completed,
    /// Payment denied; fail the pending deposit.
    Denied,
    /// Payment refunded before credit; fail the pending deposit.
    Refunded,
    /// Anything else.
    Ignored,
}

impl PaymentEventKind {
    /// Classify a provider `event_type`.
    #[must_use]
    pub fn from_event_type(event_type: &str) -> Self {
        match event_type {
            EVENT_CAPTURE_COMPLETED | EVENT_ORDER_COMPLETED => Self::Completed,
            EVENT_CAPTURE_DENIED => Self::Denied,
            EVENT_CAPTURE_REFUNDED => Self::Refunded,
            _ => Self::Ignored,
        }
    }
}

/// The fields of a provider event the reconciler needs.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProviderEvent {
    /// Provider's event id.
    pub event_id: Option<String>,
    /// Raw `event_type`.
    pub event_type: String,
    /// Raw `resource_type`.
    pub resource_type: Option<String>,
    /// `resource.id`.
    pub resource_id: Option<String>,
    /// Classification of `event_type`.
    pub kind: PaymentEventKind,
    /// The order reference our pending deposit was created with.
    pub reference: Option<String>,
}

impl ProviderEvent {
    /// Extract what we need from an arbitrary JSON payload. Never fails;
    /// missing fields come back as `None`.
    #[must_use]
    pub fn parse(raw: &Value) -> Self {
        let text = |v: &Value, key: &str| v.get(key).and_then(Value::as_str).map(str::to_string);

        let event_type = text(raw, "event_type").unwrap_or_default();
        let resource = raw.get("resource");
        let resource_id = resource.and_then(|r| text(r, "id"));

        let related = resource
            .and_then(|r| r.get("supplementary_data"))
            .and_then(|d| d.get("related_ids"));
        let reference = related
            .and_then(|ids| text(ids, "order_id").or_else(|| text(ids, "payment_id")))
            .or_else(|| resource_id.clone())
            .filter(|r| !r.is_empty());

        Self {
            event_id: text(raw, "id"),
            kind: PaymentEventKind::from_event_type(&event_type),
            event_type,
            resource_type: text(raw, "resource_type"),
            resource_id,
            reference,
        }
    }
}

/// Audit record of a received callback, stored before any processing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WebhookEvent {
    /// Record identifier.
    pub id: WebhookEventId,
    /// Provider's event id.
    pub event_id: Option<String>,
    /// Raw `event_type`.
    pub event_type: String,
    /// Raw `resource_type`.
    pub resource_type: Option<String>,
    /// `resource.id`.
    pub resource_id: Option<String>,
    /// The full payload as received.
    pub raw: Value,
    /// When it was received.
    pub received_at: DateTime<Utc>,
}

impl WebhookEvent {
    /// Build the audit record for a parsed payload.
    #[must_use]
    pub fn record(event: &ProviderEvent, raw: Value, received_at: DateTime<Utc>) -> Self {
        Self {
            id: WebhookEventId::generate(),
            event_id: event.event_id.clone(),
            event_type: event.event_type.clone(),
            resource_type: event.resource_type.clone(),
            resource_id: event.resource_id.clone(),
            raw,
            received_at,
        }
    }
}
