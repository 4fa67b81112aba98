//! Storage layer for paygate.
//!
//! The billing services depend on the repository traits below, never on a
//! concrete backend. Two backends exist:
//!
//! - [`MemoryStore`]: a single-process store behind one lock; the default, and
//!   what the test suites run against.
//! - `RocksStore` (feature `rocksdb-backend`): `RocksDB` with CBOR values and
//!   one column family per collection; see [`schema`].
//!
//! # Atomicity
//!
//! Every balance-affecting change goes through [`TransactionRepository::commit`],
//! which writes the account row and the ledger entry together or not at all.
//! Serializing commits per account is the caller's job (the service holds a
//! per-account lock around read, decide, commit).
//!
//! # Example
//!
//! ```
//! use chrono::Utc;
//! use paygate_core::{Account, UserId};
//! use paygate_store::{AccountRepository, MemoryStore};
//!
//! let store = MemoryStore::new();
//! let user_id = UserId::generate();
//! store.put_account(&Account::new(user_id, Utc::now())).unwrap();
//!
//! let account = store.get_account(&user_id).unwrap().unwrap();
//! assert_eq!(account.balance_micros, 0);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]

pub mod error;
pub mod keys;
pub mod memory;
#[cfg(feature = "rocksdb-backend")]
pub mod rocks;
pub mod schema;

pub use error::{Result, StoreError};
pub use memory::MemoryStore;
#[cfg(feature = "rocksdb-backend")]
pub use rocks::RocksStore;

use chrono::{DateTime, NaiveDate, Utc};
use paygate_core::{
    Account, ApiKey, ApiKeyId, PricingPolicy, Transaction, TransactionId, UsageStat, UserId,
    WebhookEvent,
};

/// An all-or-nothing ledger write.
#[derive(Debug, Clone)]
pub struct LedgerWrite {
    /// The account row to store, when the change touches it.
    pub account: Option<Account>,
    /// The ledger entry to insert or replace.
    pub transaction: Transaction,
}

impl LedgerWrite {
    /// Write both the account and the entry.
    #[must_use]
    pub fn new(account: Account, transaction: Transaction) -> Self {
        Self {
            account: Some(account),
            transaction,
        }
    }

    /// Write the entry alone.
    #[must_use]
    pub fn transaction_only(transaction: Transaction) -> Self {
        Self {
            account: None,
            transaction,
        }
    }
}

/// Account rows.
pub trait AccountRepository: Send + Sync {
    /// Insert or update an account record.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_account(&self, account: &Account) -> Result<()>;

    /// Get an account by user ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>>;

    /// Delete an account together with its ledger, usage counters and API keys.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the account doesn't exist.
    fn delete_account(&self, user_id: &UserId) -> Result<()>;
}

/// Ledger entries.
pub trait TransactionRepository: Send + Sync {
    /// Insert a ledger entry that does not touch the balance (a pending deposit).
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_transaction(&self, transaction: &Transaction) -> Result<()>;

    /// Insert a new entry whose payment reference must not be in use.
    ///
    /// The check and the insert are one step: of two concurrent inserts with
    /// the same reference exactly one succeeds.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::AlreadyExists` if the reference is taken.
    fn insert_with_unique_reference(&self, transaction: &Transaction) -> Result<()>;

    /// Get a transaction by ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>>;

    /// Find the entry created with a payment provider reference.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn find_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>>;

    /// List transactions for a user, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>>;

    /// Apply a ledger write atomically.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails; nothing is written then.
    fn commit(&self, write: &LedgerWrite) -> Result<()>;
}

/// Per-day usage counters.
pub trait UsageStatRepository: Send + Sync {
    /// Add one to the (user, operation, day of `at`) counter.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn increment_usage(
        &self,
        user_id: &UserId,
        operation: &str,
        at: DateTime<Utc>,
    ) -> Result<UsageStat>;

    /// All counters for a user from `since` (inclusive) onwards.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_usage_since(&self, user_id: &UserId, since: NaiveDate) -> Result<Vec<UsageStat>>;
}

/// The pricing policy singleton.
pub trait PricingRepository: Send + Sync {
    /// The stored policy, if an administrator ever saved one.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_pricing(&self) -> Result<Option<PricingPolicy>>;

    /// Replace the stored policy.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_pricing(&self, policy: &PricingPolicy) -> Result<()>;
}

/// API key records.
pub trait ApiKeyRepository: Send + Sync {
    /// Insert or update a key.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_api_key(&self, key: &ApiKey) -> Result<()>;

    /// Get a key by record ID.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_api_key(&self, key_id: &ApiKeyId) -> Result<Option<ApiKey>>;

    /// Get a key by the SHA-256 of its secret.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>>;

    /// All keys of a user, oldest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_api_keys_by_user(&self, user_id: &UserId) -> Result<Vec<ApiKey>>;

    /// Delete a key.
    ///
    /// # Errors
    ///
    /// Returns `StoreError::NotFound` if the key doesn't exist.
    fn delete_api_key(&self, key_id: &ApiKeyId) -> Result<()>;

    /// Record a successful use. A key deleted meanwhile is ignored.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn touch_api_key(&self, key_id: &ApiKeyId, at: DateTime<Utc>) -> Result<()>;
}

/// Audit log of received payment provider callbacks.
pub trait WebhookEventRepository: Send + Sync {
    /// Append a received callback.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn put_webhook_event(&self, event: &WebhookEvent) -> Result<()>;

    /// The most recent callbacks, newest first.
    ///
    /// # Errors
    ///
    /// Returns an error if the database operation fails.
    fn list_webhook_events(&self, limit: usize) -> Result<Vec<WebhookEvent>>;
}

/// Everything the service needs from storage.
pub trait Store:
    AccountRepository
    + TransactionRepository
    + UsageStatRepository
    + PricingRepository
    + ApiKeyRepository
    + WebhookEventRepository
{
}

impl<T> Store for T where
    T: AccountRepository
        + TransactionRepository
        + UsageStatRepository
        + PricingRepository
        + ApiKeyRepository
        + WebhookEventRepository
{
}
