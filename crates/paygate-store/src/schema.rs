//! Database schema definitions and column families.

/// Column family names for the `RocksDB` database.
pub mod cf {
    /// Account records, keyed by `user_id`.
    pub const ACCOUNTS: &str = "accounts";

    /// Ledger entries, keyed by `transaction_id` (ULID).
    pub const TRANSACTIONS: &str = "transactions";

    /// Index: transactions by user, keyed by `user_id || transaction_id`.
    /// Value is empty (index only).
    pub const TRANSACTIONS_BY_USER: &str = "transactions_by_user";

    /// Index: payment reference to `transaction_id`.
    pub const TRANSACTIONS_BY_REFERENCE: &str = "transactions_by_reference";

    /// Usage counters, keyed by `user_id || day || operation`.
    pub const USAGE_STATS: &str = "usage_stats";

    /// API keys, keyed by `key_id`.
    pub const API_KEYS: &str = "api_keys";

    /// Index: SHA-256 hex of the secret to `key_id`.
    pub const API_KEYS_BY_HASH: &str = "api_keys_by_hash";

    /// Index: keys by user, keyed by `user_id || key_id`. Value is empty.
    pub const API_KEYS_BY_USER: &str = "api_keys_by_user";

    /// Singletons such as the pricing policy.
    pub const SETTINGS: &str = "settings";

    /// Received payment callbacks, keyed by ULID.
    pub const WEBHOOK_EVENTS: &str = "webhook_events";
}

/// Key of the pricing policy in [`cf::SETTINGS`].
pub const PRICING_POLICY_KEY: &[u8] = b"pricing_policy";

/// Returns all column family names for database initialization.
#[must_use]
pub fn all_column_families() -> Vec<&'static str> {
    vec![
        cf::ACCOUNTS,
        cf::TRANSACTIONS,
        cf::TRANSACTIONS_BY_USER,
        cf::TRANSACTIONS_BY_REFERENCE,
        cf::USAGE_STATS,
        cf::API_KEYS,
        cf::API_KEYS_BY_HASH,
        cf::API_KEYS_BY_USER,
        cf::SETTINGS,
        cf::WEBHOOK_EVENTS,
    ]
}
