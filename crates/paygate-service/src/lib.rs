//! Paygate HTTP API service.
//!
//! This crate holds the billing core and the HTTP API that exposes it:
//!
//! - Operation gate: charge one operation against the free quota or balance
//! - API keys: issue, validate, revoke
//! - Deposits and payment provider reconciliation
//! - Balance summaries, ledger audits, pricing administration
//!
//! # Authentication
//!
//! 1. **User JWTs** (HS256) - account owners (dashboard, key management)
//! 2. **Service key** (`X-Service-Key`) - the metered product's request handlers
//! 3. **Admin key** (`X-Admin-Key`) - pricing and audits
//!
//! Customer API keys (`sk_...`) are validated by the billing core, not by
//! the HTTP layer.

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
// Allow some pedantic lints that are noisy for Axum handler functions
#![allow(clippy::missing_errors_doc)] // Axum handlers all return Result
#![allow(clippy::unused_async)] // Axum handlers must be async

pub mod auth;
pub mod billing;
pub mod config;
pub mod error;
pub mod handlers;
pub mod routes;
pub mod state;

pub use config::{ServiceConfig, StoreBackend};
pub use error::ApiError;
pub use routes::create_router;
pub use state::{open_store, AppState};
