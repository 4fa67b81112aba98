//! API key records.
//!
//! Only the SHA-256 digest of a secret is stored; the secret itself is shown
//! once, at creation.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::pricing::is_known_operation;
use crate::{ApiKeyId, BillingError, Result, UserId};

/// Grants every operation.
pub const WILDCARD_PERMISSION: &str = "*";

/// Permissions given to a key created without an explicit list.
pub const DEFAULT_KEY_PERMISSIONS: &[&str] = &["convert", "compress", "merge", "split"];

/// Maximum keys for an account with a positive balance.
pub const MAX_KEYS_FUNDED: usize = 10;

/// Maximum keys for an account with no balance.
pub const MAX_KEYS_UNFUNDED: usize = 1;

/// Prefix every issued secret starts with.
pub const SECRET_PREFIX: &str = "sk_";

/// A stored API key.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ApiKey {
    /// Record identifier.
    pub id: ApiKeyId,

    /// Owning account.
    pub user_id: UserId,

    /// Display name.
    pub name: String,

    /// Lowercase hex SHA-256 of the secret.
    pub key_hash: String,

    /// First characters of the secret, for recognition in listings.
    pub key_prefix: String,

    /// Allowed operations, or `["*"]`.
    pub permissions: Vec<String>,

    /// Expiry, if any.
    pub expires_at: Option<DateTime<Utc>>,

    /// Last successful validation (best-effort).
    pub last_used_at: Option<DateTime<Utc>>,

    /// When the key was created.
    pub created_at: DateTime<Utc>,
}

impl ApiKey {
    /// Whether the key has expired at `now`.
    #[must_use]
    pub fn is_expired(&self, now: DateTime<Utc>) -> bool {
        self.expires_at.is_some_and(|expiry| expiry <= now)
    }

    /// Whether the key may run `operation`.
    #[must_use]
    pub fn permits(&self, operation: &str) -> bool {
        self.permissions
            .iter()
            .any(|p| p == WILDCARD_PERMISSION || p == operation)
    }
}

/// Normalize a requested permission list.
///
/// Empty means the defaults; any `*` collapses the list to `["*"]`.
///
/// # Errors
///
/// Returns `BillingError::InvalidPermission` naming the first unknown operation.
pub fn normalize_permissions(requested: &[String]) -> Result<Vec<String>> {
    if requested.is_empty() {
        return Ok(DEFAULT_KEY_PERMISSIONS
            .iter()
            .map(ToString::to_string)
            .collect());
    }

    if requested.iter().any(|p| p == WILDCARD_PERMISSION) {
        return Ok(vec![WILDCARD_PERMISSION.to_string()]);
    }

    if let Some(unknown) = requested.iter().find(|p| !is_known_operation(p)) {
        return Err(BillingError::InvalidPermission(unknown.clone()));
    }

    let mut permissions = requested.to_vec();
    permissions.sort();
    permissions.dedup();
    Ok(permissions)
}

/// How many keys an account may hold given its balance.
#[must_use]
pub const fn key_limit(balance_micros: i64) -> usize {
    if balance_micros > 0 {
        MAX_KEYS_FUNDED
    } else {
        MAX_KEYS_UNFUNDED
    }
}
