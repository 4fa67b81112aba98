//! Core types and pure billing logic for paygate.
//!
//! This crate provides the foundational types used throughout paygate:
//!
//! - **Identifiers**: `UserId`, `ApiKeyId`, `TransactionId`, `WebhookEventId`
//! - **Accounts**: `Account`, `Role`
//! - **Quota**: `QuotaSnapshot` and the lazy monthly rollover
//! - **Pricing**: `PricingPolicy`, money helpers
//! - **Ledger**: `Transaction`, `TransactionStatus`, ledger audit
//! - **Usage**: `UsageStat`
//! - **Keys**: `ApiKey`, permission rules
//! - **Webhooks**: `ProviderEvent`, `WebhookEvent`
//! - **Outcomes**: `OperationResult`, `ValidationResult`, `Rejection`
//!
//! # Money
//!
//! Amounts are `i64` micro-dollars: **1 USD = 1 000 000**. A $0.005
//! operation is 5 000; a $10 deposit is 10 000 000.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod account;
pub mod api_key;
pub mod error;
pub mod ids;
pub mod ledger;
pub mod outcome;
pub mod pricing;
pub mod quota;
pub mod usage;
pub mod webhook;

pub use account::{Account, Role};
pub use api_key::{
    key_limit, normalize_permissions, ApiKey, DEFAULT_KEY_PERMISSIONS, MAX_KEYS_FUNDED,
    MAX_KEYS_UNFUNDED, SECRET_PREFIX, WILDCARD_PERMISSION,
};
pub use error::{BillingError, Result};
pub use ids::{ApiKeyId, IdError, TransactionId, UserId, WebhookEventId};
pub use ledger::{Transaction, TransactionKind, TransactionStatus};
pub use outcome::{AuthorizationResult, OperationResult, Rejection, ValidationResult};
pub use pricing::{
    format_signed, format_usd, is_known_operation, micros_to_usd, usd_to_micros, PriceSource,
    PricingPolicy, ResolvedPrice, DEFAULT_FREE_OPERATIONS_MONTHLY, DEFAULT_OPERATION_COST_MICROS,
    MAX_CUSTOM_PRICE_MICROS, MICROS_PER_USD, MIN_CUSTOM_PRICE_MICROS, OPERATIONS,
};
pub use quota::{month_start, next_reset_after, QuotaSnapshot};
pub use usage::{UsageStat, HIDDEN_OPERATION};
pub use webhook::{PaymentEventKind, ProviderEvent, WebhookEvent};
