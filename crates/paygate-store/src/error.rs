//! Error types for paygate storage.

use paygate_core::BillingError;

/// Result type for storage operations.
pub type Result<T> = std::result::Result<T, StoreError>;

/// Errors that can occur in storage operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// Database operation failed.
    #[error("database error: {0}")]
    Database(String),

    /// Serialization/deserialization failed.
    #[error("serialization error: {0}")]
    Serialization(String),

    /// Record not found.
    #[error("not found")]
    NotFound,

    /// A unique key is already taken.
    #[error("already exists: {0}")]
    AlreadyExists(String),
}

impl From<StoreError> for BillingError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::NotFound => Self::Storage("record not found".to_string()),
            StoreError::AlreadyExists(reference) => Self::DuplicateReference { reference },
            other => Self::Storage(other.to_string()),
        }
    }
}
