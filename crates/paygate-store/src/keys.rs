//! Key encoding utilities for `RocksDB`.
//!
//! Fixed-width binary prefixes keep every per-user range contiguous, and ULIDs
//! keep it in creation order.

use chrono::{Datelike, NaiveDate};
use paygate_core::{ApiKeyId, TransactionId, UserId, WebhookEventId};

/// Create an account key from a user ID.
#[must_use]
pub fn account_key(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Create a transaction key from a transaction ID.
#[must_use]
pub fn transaction_key(transaction_id: &TransactionId) -> Vec<u8> {
    transaction_id.to_bytes().to_vec()
}

/// Create a user-transaction index key.
///
/// Format: `user_id (16 bytes) || transaction_id (16 bytes)`
#[must_use]
pub fn user_transaction_key(user_id: &UserId, transaction_id: &TransactionId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&transaction_id.to_bytes());
    key
}

/// Prefix shared by every per-user key (`user_id`, 16 bytes).
#[must_use]
pub fn user_prefix(user_id: &UserId) -> Vec<u8> {
    user_id.as_bytes().to_vec()
}

/// Extract the transaction ID from a user-transaction index key.
#[must_use]
pub fn transaction_id_from_user_key(key: &[u8]) -> Option<TransactionId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(TransactionId::from_bytes(bytes))
}

/// Create a payment reference index key.
#[must_use]
pub fn reference_key(reference: &str) -> Vec<u8> {
    reference.as_bytes().to_vec()
}

/// Create a usage counter key.
///
/// Format: `user_id (16 bytes) || day (4 bytes, big-endian days from CE) || operation`
#[must_use]
pub fn usage_key(user_id: &UserId, day: NaiveDate, operation: &str) -> Vec<u8> {
    let mut key = usage_day_prefix(user_id, day);
    key.extend_from_slice(operation.as_bytes());
    key
}

/// First possible usage key of `user_id` on `day`; a forward seek start.
#[must_use]
pub fn usage_day_prefix(user_id: &UserId, day: NaiveDate) -> Vec<u8> {
    let days = u32::try_from(day.num_days_from_ce()).unwrap_or(0);
    let mut key = Vec::with_capacity(24);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(&days.to_be_bytes());
    key
}

/// Create an API key record key.
#[must_use]
pub fn api_key_key(key_id: &ApiKeyId) -> Vec<u8> {
    key_id.as_bytes().to_vec()
}

/// Create a user-key index key: `user_id || key_id`.
#[must_use]
pub fn user_api_key_key(user_id: &UserId, key_id: &ApiKeyId) -> Vec<u8> {
    let mut key = Vec::with_capacity(32);
    key.extend_from_slice(user_id.as_bytes());
    key.extend_from_slice(key_id.as_bytes());
    key
}

/// Extract the key ID from a user-key index key.
#[must_use]
pub fn api_key_id_from_user_key(key: &[u8]) -> Option<ApiKeyId> {
    let bytes: [u8; 16] = key.get(16..32)?.try_into().ok()?;
    Some(ApiKeyId::from_bytes(bytes))
}

/// Create a webhook event key.
#[must_use]
pub fn webhook_event_key(event_id: &WebhookEventId) -> Vec<u8> {
    event_id.to_bytes().to_vec()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn user_transaction_key_format() {
        let user_id = UserId::generate();
        let tx_id = TransactionId::generate();
        let key = user_transaction_key(&user_id, &tx_id);

        assert_eq!(key.len(), 32);
        assert_eq!(&key[..16], user_id.as_bytes());
        assert_eq!(transaction_id_from_user_key(&key), Some(tx_id));
        assert_eq!(transaction_id_from_user_key(&key[..20]), None);
    }

    #[test]
    fn usage_keys_sort_by_day() {
        let user_id = UserId::generate();
        let earlier = usage_key(&user_id, NaiveDate::from_ymd_opt(2026, 1, 31).unwrap(), "ocr");
        let later = usage_key(&user_id, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap(), "compress");
        assert!(earlier < later);

        let seek = usage_day_prefix(&user_id, NaiveDate::from_ymd_opt(2026, 2, 1).unwrap());
        assert!(seek > earlier && seek <= later);
    }

    #[test]
    fn user_api_key_roundtrip() {
        let user_id = UserId::generate();
        let key_id = ApiKeyId::generate();
        let key = user_api_key_key(&user_id, &key_id);
        assert!(key.starts_with(&user_prefix(&user_id)));
        assert_eq!(api_key_id_from_user_key(&key), Some(key_id));
    }
}
