//! Results of gate calls.
//!
//! A rejected call is a successful call that says no. Infrastructure failures
//! are [`crate::BillingError`]s instead.

use serde::{Deserialize, Serialize};

use crate::UserId;

/// Why a gate said no.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Rejection {
    /// No free unit left and the balance does not cover the cost.
    InsufficientBalance,
    /// No API key was supplied.
    MissingKey,
    /// The key does not exist.
    InvalidKey,
    /// The key has expired.
    ExpiredKey,
    /// The key is not allowed to run the operation.
    PermissionDenied,
    /// The key owner is suspended.
    AccountSuspended,
}

impl Rejection {
    /// Human-readable reason.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::InsufficientBalance => {
                "Insufficient balance. Please add funds to your account to continue."
            }
            Self::MissingKey => "API key is required",
            Self::InvalidKey => "Invalid API key",
            Self::ExpiredKey => "API key has expired",
            Self::PermissionDenied => "API key does not have permission for this operation",
            Self::AccountSuspended => "Account is suspended",
        }
    }
}

impl std::fmt::Display for Rejection {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.message())
    }
}

/// Result of charging one operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationResult {
    /// Whether the operation may proceed.
    pub success: bool,
    /// Whether a free unit paid for it.
    pub used_free_operation: bool,
    /// Free units left after this call.
    pub free_operations_remaining: u32,
    /// Balance after this call, in micro-dollars.
    pub current_balance_micros: i64,
    /// Resolved price of the operation, in micro-dollars.
    pub operation_cost_micros: i64,
    /// Why the call was rejected.
    pub error: Option<Rejection>,
}

impl OperationResult {
    /// A free unit was consumed.
    #[must_use]
    pub const fn free(remaining: u32, balance_micros: i64, cost_micros: i64) -> Self {
        Self {
            success: true,
            used_free_operation: true,
            free_operations_remaining: remaining,
            current_balance_micros: balance_micros,
            operation_cost_micros: cost_micros,
            error: None,
        }
    }

    /// The balance was charged.
    #[must_use]
    pub const fn paid(balance_micros: i64, cost_micros: i64) -> Self {
        Self {
            success: true,
            used_free_operation: false,
            free_operations_remaining: 0,
            current_balance_micros: balance_micros,
            operation_cost_micros: cost_micros,
            error: None,
        }
    }

    /// Nothing was charged.
    #[must_use]
    pub const fn insufficient(balance_micros: i64, cost_micros: i64) -> Self {
        Self {
            success: false,
            used_free_operation: false,
            free_operations_remaining: 0,
            current_balance_micros: balance_micros,
            operation_cost_micros: cost_micros,
            error: Some(Rejection::InsufficientBalance),
        }
    }
}

/// Result of validating an API key for an operation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationResult {
    /// Whether the key may run the operation.
    pub valid: bool,
    /// The key owner, when the key was found.
    pub user_id: Option<UserId>,
    /// Free units left for the owner.
    pub free_operations_remaining: u32,
    /// Owner balance in micro-dollars.
    pub balance_micros: i64,
    /// Why the key was refused.
    pub error: Option<Rejection>,
}

impl ValidationResult {
    /// The key was refused before its owner was known.
    #[must_use]
    pub const fn rejected(reason: Rejection) -> Self {
        Self {
            valid: false,
            user_id: None,
            free_operations_remaining: 0,
            balance_micros: 0,
            error: Some(reason),
        }
    }
}

/// Result of validating a key and charging in one step.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthorizationResult {
    /// Key validation outcome.
    pub validation: ValidationResult,
    /// Charge outcome, present only when the key was valid.
    pub charge: Option<OperationResult>,
}

impl AuthorizationResult {
    /// Whether the caller may run the operation.
    #[must_use]
    pub fn is_authorized(&self) -> bool {
        self.validation.valid && self.charge.is_some_and(|c| c.success)
    }

    /// The reason for a refusal, if any.
    #[must_use]
    pub fn rejection(&self) -> Option<Rejection> {
        self.validation
            .error
            .or_else(|| self.charge.and_then(|c| c.error))
    }
}
