//! API key issuing and validation.

use std::fmt::Write as _;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use sha2::{Digest, Sha256};

use paygate_core::{
    key_limit, normalize_permissions, ApiKey, ApiKeyId, BillingError, QuotaSnapshot, Rejection,
    Result, UserId, ValidationResult, SECRET_PREFIX,
};
use paygate_store::Store;

use super::locks::AccountLocks;
use super::pricing::PolicySource;

/// Characters of the secret kept for display.
const DISPLAY_PREFIX_LEN: usize = 10;

/// Lowercase hex SHA-256 of an API key secret.
#[must_use]
pub fn hash_secret(secret: &str) -> String {
    hex::encode(Sha256::digest(secret.as_bytes()))
}

/// A fresh secret: `sk_` followed by 48 hex characters.
#[must_use]
pub fn generate_secret() -> String {
    let mut secret = String::with_capacity(SECRET_PREFIX.len() + 48);
    secret.push_str(SECRET_PREFIX);
    let random = [uuid::Uuid::new_v4(), uuid::Uuid::new_v4()];
    for byte in random.iter().flat_map(|u| u.as_bytes()).take(24) {
        let _ = write!(secret, "{byte:02x}");
    }
    secret
}

/// A newly created key together with its one-time-visible secret.
#[derive(Debug, Clone)]
pub struct IssuedKey {
    /// The stored record.
    pub key: ApiKey,
    /// The secret. Never stored.
    pub secret: String,
}

/// Validates, issues and revokes API keys.
#[derive(Clone)]
pub struct ApiKeyGate {
    store: Arc<dyn Store>,
    locks: Arc<AccountLocks>,
    pricing: PolicySource,
}

impl ApiKeyGate {
    /// Create a key gate.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, locks: Arc<AccountLocks>, pricing: PolicySource) -> Self {
        Self {
            store,
            locks,
            pricing,
        }
    }

    /// Check whether `secret` may run `operation`. Read-only apart from the
    /// key's `last_used_at`, and does not charge.
    ///
    /// # Errors
    ///
    /// Infrastructure failures only; refusals come back in the result.
    pub fn validate(&self, secret: Option<&str>, operation: &str) -> Result<ValidationResult> {
        self.validate_at(secret, operation, Utc::now())
    }

    /// [`Self::validate`] with an explicit clock.
    ///
    /// # Errors
    ///
    /// See [`Self::validate`].
    pub fn validate_at(
        &self,
        secret: Option<&str>,
        operation: &str,
        now: DateTime<Utc>,
    ) -> Result<ValidationResult> {
        let Some(secret) = secret.filter(|s| !s.is_empty()) else {
            return Ok(ValidationResult::rejected(Rejection::MissingKey));
        };

        let Some(key) = self.store.get_api_key_by_hash(&hash_secret(secret))? else {
            return Ok(ValidationResult::rejected(Rejection::InvalidKey));
        };

        if key.is_expired(now) {
            return Ok(ValidationResult::rejected(Rejection::ExpiredKey));
        }

        let Some(account) = self.store.get_account(&key.user_id)? else {
            tracing::warn!(key_id = %key.id, user_id = %key.user_id, "API key without account");
            return Ok(ValidationResult::rejected(Rejection::InvalidKey));
        };

        if account.is_suspended() {
            return Ok(ValidationResult::rejected(Rejection::AccountSuspended));
        }

        if !key.permits(operation) {
            return Ok(ValidationResult::rejected(Rejection::PermissionDenied));
        }

        let policy = self.pricing.current()?;
        let quota = QuotaSnapshot::evaluate(&account, policy.free_operations_monthly, now);

        if let Err(e) = self.store.touch_api_key(&key.id, now) {
            tracing::warn!(key_id = %key.id, error = %e, "Failed to update key last use");
        }

        Ok(ValidationResult {
            valid: true,
            user_id: Some(key.user_id),
            free_operations_remaining: quota.remaining(),
            balance_micros: account.balance_micros,
            error: None,
        })
    }

    /// Issue a key for `user_id`.
    ///
    /// # Errors
    ///
    /// - `BillingError::AccountNotFound` if the account doesn't exist.
    /// - `BillingError::ApiKeyLimitReached` if the account holds its maximum.
    /// - `BillingError::InvalidPermission` for an unknown operation name.
    pub async fn create(
        &self,
        user_id: &UserId,
        name: &str,
        permissions: &[String],
        expires_at: Option<DateTime<Utc>>,
    ) -> Result<IssuedKey> {
        let permissions = normalize_permissions(permissions)?;

        let _guard = self.locks.acquire(user_id).await?;

        let account =
            self.store
                .get_account(user_id)?
                .ok_or_else(|| BillingError::AccountNotFound {
                    user_id: user_id.to_string(),
                })?;

        let limit = key_limit(account.balance_micros);
        let existing = self.store.list_api_keys_by_user(user_id)?.len();
        if existing >= limit {
            return Err(BillingError::ApiKeyLimitReached { limit });
        }

        let secret = generate_secret();
        let key = ApiKey {
            id: ApiKeyId::generate(),
            user_id: *user_id,
            name: name.to_string(),
            key_hash: hash_secret(&secret),
            key_prefix: secret.chars().take(DISPLAY_PREFIX_LEN).collect(),
            permissions,
            expires_at,
            last_used_at: None,
            created_at: Utc::now(),
        };
        self.store.put_api_key(&key)?;

        tracing::info!(
            user_id = %user_id,
            key_id = %key.id,
            permissions = ?key.permissions,
            "API key created"
        );
        Ok(IssuedKey { key, secret })
    }

    /// All keys of `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Storage` if the store is unavailable.
    pub fn list(&self, user_id: &UserId) -> Result<Vec<ApiKey>> {
        Ok(self.store.list_api_keys_by_user(user_id)?)
    }

    /// Revoke one of `user_id`'s keys.
    ///
    /// Runs in the account's critical section so that it cannot land between
    /// the validation and the charge of a combined authorize call.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::ApiKeyNotFound` if the key doesn't exist or
    /// belongs to someone else.
    pub async fn revoke(&self, user_id: &UserId, key_id: &ApiKeyId) -> Result<()> {
        let _guard = self.locks.acquire(user_id).await?;

        let not_found = || BillingError::ApiKeyNotFound {
            key_id: key_id.to_string(),
        };
        let key = self.store.get_api_key(key_id)?.ok_or_else(not_found)?;
        if key.user_id != *user_id {
            return Err(not_found());
        }

        self.store.delete_api_key(key_id)?;
        tracing::info!(user_id = %user_id, key_id = %key_id, "API key revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    use paygate_core::{Account, PricingPolicy, Role};
    use paygate_store::{AccountRepository, ApiKeyRepository, MemoryStore};

    fn gate() -> (Arc<MemoryStore>, ApiKeyGate) {
        let store = Arc::new(MemoryStore::new());
        let dyn_store: Arc<dyn Store> = store.clone();
        let locks = Arc::new(AccountLocks::new(Duration::from_millis(500)));
        let pricing = PolicySource::new(dyn_store.clone(), PricingPolicy::default());
        (store, ApiKeyGate::new(dyn_store, locks, pricing))
    }

    fn seed(store: &MemoryStore, balance_micros: i64) -> UserId {
        let mut account = Account::new(UserId::generate(), Utc::now());
        account.balance_micros = balance_micros;
        store.put_account(&account).unwrap();
        account.user_id
    }

    #[test]
    fn secrets_have_expected_shape() {
        let secret = generate_secret();
        assert!(secret.starts_with("sk_"));
        assert_eq!(secret.len(), 51);
        assert!(secret[3..].chars().all(|c| c.is_ascii_hexdigit()));
        assert_ne!(secret, generate_secret());
        assert_eq!(hash_secret(&secret).len(), 64);
    }

    #[tokio::test]
    async fn issued_key_validates() {
        let (store, gate) = gate();
        let user = seed(&store, 2_000_000);

        let issued = gate.create(&user, "ci", &[], None).await.unwrap();
        assert_eq!(issued.key.key_hash, hash_secret(&issued.secret));
        assert!(issued.secret.starts_with(&issued.key.key_prefix));

        let result = gate.validate(Some(&issued.secret), "compress").unwrap();
        assert!(result.valid);
        assert_eq!(result.user_id, Some(user));
        assert_eq!(result.balance_micros, 2_000_000);
        assert_eq!(result.free_operations_remaining, 500);

        let stored = store.get_api_key(&issued.key.id).unwrap().unwrap();
        assert!(stored.last_used_at.is_some());
    }

    #[tokio::test]
    async fn refusals() {
        let (store, gate) = gate();
        let user = seed(&store, 2_000_000);

        assert_eq!(
            gate.validate(None, "merge").unwrap().error,
            Some(Rejection::MissingKey)
        );
        assert_eq!(
            gate.validate(Some("sk_unknown"), "merge").unwrap().error,
            Some(Rejection::InvalidKey)
        );

        let scoped = gate
            .create(&user, "scoped", &["merge".to_string()], None)
            .await
            .unwrap();
        assert_eq!(
            gate.validate(Some(&scoped.secret), "ocr").unwrap().error,
            Some(Rejection::PermissionDenied)
        );

        let expired = gate
            .create(&user, "old", &["*".to_string()], Some(Utc::now() - chrono::Duration::hours(1)))
            .await
            .unwrap();
        assert_eq!(
            gate.validate(Some(&expired.secret), "merge").unwrap().error,
            Some(Rejection::ExpiredKey)
        );

        let mut account = store.get_account(&user).unwrap().unwrap();
        account.role = Role::Suspended;
        store.put_account(&account).unwrap();
        assert_eq!(
            gate.validate(Some(&scoped.secret), "merge").unwrap().error,
            Some(Rejection::AccountSuspended)
        );
    }

    #[tokio::test]
    async fn unfunded_accounts_get_one_key() {
        let (store, gate) = gate();
        let user = seed(&store, 0);

        gate.create(&user, "first", &[], None).await.unwrap();
        let err = gate.create(&user, "second", &[], None).await.unwrap_err();
        assert!(matches!(err, BillingError::ApiKeyLimitReached { limit: 1 }));
    }

    #[tokio::test]
    async fn revoke_only_own_keys() {
        let (store, gate) = gate();
        let owner = seed(&store, 1_000_000);
        let stranger = seed(&store, 1_000_000);

        let issued = gate.create(&owner, "ci", &[], None).await.unwrap();
        assert!(matches!(
            gate.revoke(&stranger, &issued.key.id).await,
            Err(BillingError::ApiKeyNotFound { .. })
        ));

        gate.revoke(&owner, &issued.key.id).await.unwrap();
        assert!(gate.list(&owner).unwrap().is_empty());
        assert_eq!(
            gate.validate(Some(&issued.secret), "merge").unwrap().error,
            Some(Rejection::InvalidKey)
        );
    }
}
