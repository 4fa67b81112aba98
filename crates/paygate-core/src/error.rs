//! Error types for paygate.
//!
//! Business rejections (insufficient balance, bad API key, ...) are not
//! errors; they travel as [`crate::Rejection`] values inside results. The
//! variants here are either caller mistakes or infrastructure failures.

use crate::ids::IdError;

/// Result type for paygate operations.
pub type Result<T> = std::result::Result<T, BillingError>;

/// Errors that can occur in paygate operations.
#[derive(Debug, thiserror::Error)]
pub enum BillingError {
    /// Account not found.
    #[error("account not found: {user_id}")]
    AccountNotFound {
        /// The user ID that was not found.
        user_id: String,
    },

    /// Account already exists.
    #[error("account already exists: {user_id}")]
    AccountAlreadyExists {
        /// The user ID that already exists.
        user_id: String,
    },

    /// Ledger entry not found.
    #[error("transaction not found: {transaction_id}")]
    TransactionNotFound {
        /// The transaction ID or external reference that was not found.
        transaction_id: String,
    },

    /// A deposit with this payment reference already exists.
    #[error("duplicate payment reference: {reference}")]
    DuplicateReference {
        /// The reference that is already in use.
        reference: String,
    },

    /// API key record not found (or not owned by the caller).
    #[error("api key not found: {key_id}")]
    ApiKeyNotFound {
        /// The key ID that was not found.
        key_id: String,
    },

    /// The account already holds the maximum number of API keys.
    #[error("api key limit reached: {limit}")]
    ApiKeyLimitReached {
        /// The limit that applies to this account.
        limit: usize,
    },

    /// An amount was out of range.
    #[error("invalid amount: {0}")]
    InvalidAmount(String),

    /// An API key permission names an unknown operation.
    #[error("unknown operation in permissions: {0}")]
    InvalidPermission(String),

    /// A pricing policy update was rejected.
    #[error("invalid pricing: {0}")]
    InvalidPricing(String),

    /// The per-account critical section could not be entered in time.
    ///
    /// Retryable: the account was not touched.
    #[error("transaction conflict on account {user_id}")]
    TransactionConflict {
        /// The contended account.
        user_id: String,
    },

    /// Storage failure.
    #[error("storage error: {0}")]
    Storage(String),

    /// A ledger invariant does not hold. Must be investigated, never auto-corrected.
    #[error("invariant violation: {0}")]
    InvariantViolation(String),

    /// Invalid identifier.
    #[error("invalid identifier: {0}")]
    InvalidId(#[from] IdError),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Configuration(String),
}

impl BillingError {
    /// Whether a caller may safely resend the same request.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self, Self::TransactionConflict { .. } | Self::Storage(_))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn infrastructure_errors_are_retryable() {
        assert!(BillingError::TransactionConflict {
            user_id: "u".into()
        }
        .is_retryable());
        assert!(BillingError::Storage("down".into()).is_retryable());
        assert!(!BillingError::InvalidAmount("neg".into()).is_retryable());
        assert!(!BillingError::InvariantViolation("sum".into()).is_retryable());
    }
}
