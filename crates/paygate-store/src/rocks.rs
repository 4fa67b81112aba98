//! `RocksDB` storage implementation.
//!
//! Values are CBOR. Multi-row changes go through a `WriteBatch` so that a
//! crash leaves either all or none of them on disk.

use std::path::Path;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, Utc};
use rocksdb::{
    BoundColumnFamily, ColumnFamilyDescriptor, DBWithThreadMode, Direction, IteratorMode,
    MultiThreaded, Options, WriteBatch,
};
use tracing::debug;

use paygate_core::{
    Account, ApiKey, ApiKeyId, PricingPolicy, Transaction, TransactionId, UsageStat, UserId,
    WebhookEvent,
};

use crate::error::{Result, StoreError};
use crate::keys;
use crate::schema::{all_column_families, cf, PRICING_POLICY_KEY};
use crate::{
    AccountRepository, ApiKeyRepository, LedgerWrite, PricingRepository, TransactionRepository,
    UsageStatRepository, WebhookEventRepository,
};

/// RocksDB-backed storage implementation.
pub struct RocksStore {
    db: Arc<DBWithThreadMode<MultiThreaded>>,
    /// Serializes reference-claiming inserts; `RocksDB` has no conditional put.
    reference_claims: Mutex<()>,
}

impl RocksStore {
    /// Open or create a `RocksDB` database at the given path.
    ///
    /// # Errors
    ///
    /// Returns an error if the database cannot be opened or created.
    pub fn open<P: AsRef<Path>>(path: P) -> Result<Self> {
        let mut opts = Options::default();
        opts.create_if_missing(true);
        opts.create_missing_column_families(true);

        let cf_descriptors: Vec<_> = all_column_families()
            .into_iter()
            .map(|name| ColumnFamilyDescriptor::new(name, Options::default()))
            .collect();

        let db = DBWithThreadMode::open_cf_descriptors(&opts, path, cf_descriptors)
            .map_err(|e| StoreError::Database(e.to_string()))?;

        Ok(Self {
            db: Arc::new(db),
            reference_claims: Mutex::new(()),
        })
    }

    fn cf(&self, name: &str) -> Result<Arc<BoundColumnFamily<'_>>> {
        self.db
            .cf_handle(name)
            .ok_or_else(|| StoreError::Database(format!("column family not found: {name}")))
    }

    fn serialize<T: serde::Serialize>(value: &T) -> Result<Vec<u8>> {
        let mut buf = Vec::new();
        ciborium::into_writer(value, &mut buf)
            .map_err(|e| StoreError::Serialization(e.to_string()))?;
        Ok(buf)
    }

    fn deserialize<T: serde::de::DeserializeOwned>(data: &[u8]) -> Result<T> {
        ciborium::from_reader(data).map_err(|e| StoreError::Serialization(e.to_string()))
    }

    fn get_value<T: serde::de::DeserializeOwned>(&self, cf_name: &str, key: &[u8]) -> Result<Option<T>> {
        let cf = self.cf(cf_name)?;
        self.db
            .get_cf(&cf, key)
            .map_err(|e| StoreError::Database(e.to_string()))?
            .map(|data| Self::deserialize(&data))
            .transpose()
    }

    fn put_value<T: serde::Serialize>(&self, cf_name: &str, key: &[u8], value: &T) -> Result<()> {
        let cf = self.cf(cf_name)?;
        self.db
            .put_cf(&cf, key, Self::serialize(value)?)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    fn write(&self, batch: WriteBatch) -> Result<()> {
        self.db
            .write(batch)
            .map_err(|e| StoreError::Database(e.to_string()))
    }

    /// Collect every key in `cf_name` that starts with `prefix`, in key order.
    fn prefix_keys(&self, cf_name: &str, prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        self.keys_from(cf_name, prefix, prefix)
    }

    /// Keys starting at `start` for as long as they share `prefix`.
    fn keys_from(&self, cf_name: &str, start: &[u8], prefix: &[u8]) -> Result<Vec<Vec<u8>>> {
        let cf = self.cf(cf_name)?;
        let mut out = Vec::new();
        for item in self
            .db
            .iterator_cf(&cf, IteratorMode::From(start, Direction::Forward))
        {
            let (key, _) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            if !key.starts_with(prefix) {
                break;
            }
            out.push(key.to_vec());
        }
        Ok(out)
    }

    /// Stage a ledger entry and its indexes into `batch`.
    fn stage_transaction(&self, batch: &mut WriteBatch, transaction: &Transaction) -> Result<()> {
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;

        batch.put_cf(
            &cf_tx,
            keys::transaction_key(&transaction.id),
            Self::serialize(transaction)?,
        );
        batch.put_cf(
            &cf_by_user,
            keys::user_transaction_key(&transaction.user_id, &transaction.id),
            [],
        );
        if let Some(reference) = &transaction.payment_reference {
            let cf_by_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
            batch.put_cf(
                &cf_by_ref,
                keys::reference_key(reference),
                keys::transaction_key(&transaction.id),
            );
        }
        Ok(())
    }
}

impl AccountRepository for RocksStore {
    fn put_account(&self, account: &Account) -> Result<()> {
        self.put_value(cf::ACCOUNTS, &keys::account_key(&account.user_id), account)
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        self.get_value(cf::ACCOUNTS, &keys::account_key(user_id))
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        if self.get_account(user_id)?.is_none() {
            return Err(StoreError::NotFound);
        }

        let prefix = keys::user_prefix(user_id);
        let mut batch = WriteBatch::default();

        batch.delete_cf(&self.cf(cf::ACCOUNTS)?, keys::account_key(user_id));

        let tx_index = self.prefix_keys(cf::TRANSACTIONS_BY_USER, &prefix)?;
        let cf_tx = self.cf(cf::TRANSACTIONS)?;
        let cf_by_user = self.cf(cf::TRANSACTIONS_BY_USER)?;
        let cf_by_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
        for index_key in &tx_index {
            if let Some(tx_id) = keys::transaction_id_from_user_key(index_key) {
                if let Some(tx) = self.get_transaction(&tx_id)? {
                    if let Some(reference) = &tx.payment_reference {
                        batch.delete_cf(&cf_by_ref, keys::reference_key(reference));
                    }
                }
                batch.delete_cf(&cf_tx, keys::transaction_key(&tx_id));
            }
            batch.delete_cf(&cf_by_user, index_key);
        }

        let cf_usage = self.cf(cf::USAGE_STATS)?;
        let usage = self.prefix_keys(cf::USAGE_STATS, &prefix)?;
        for key in &usage {
            batch.delete_cf(&cf_usage, key);
        }

        let key_index = self.prefix_keys(cf::API_KEYS_BY_USER, &prefix)?;
        let cf_keys = self.cf(cf::API_KEYS)?;
        let cf_keys_by_hash = self.cf(cf::API_KEYS_BY_HASH)?;
        let cf_keys_by_user = self.cf(cf::API_KEYS_BY_USER)?;
        for index_key in &key_index {
            if let Some(key_id) = keys::api_key_id_from_user_key(index_key) {
                if let Some(key) = self.get_api_key(&key_id)? {
                    batch.delete_cf(&cf_keys_by_hash, key.key_hash.as_bytes());
                }
                batch.delete_cf(&cf_keys, keys::api_key_key(&key_id));
            }
            batch.delete_cf(&cf_keys_by_user, index_key);
        }

        self.write(batch)?;
        debug!(
            user_id = %user_id,
            transactions = tx_index.len(),
            usage_stats = usage.len(),
            api_keys = key_index.len(),
            "Deleted account and dependent records"
        );
        Ok(())
    }
}

impl TransactionRepository for RocksStore {
    fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        let mut batch = WriteBatch::default();
        self.stage_transaction(&mut batch, transaction)?;
        self.write(batch)
    }

    fn insert_with_unique_reference(&self, transaction: &Transaction) -> Result<()> {
        let _claim = self
            .reference_claims
            .lock()
            .map_err(|_| StoreError::Database("reference lock poisoned".to_string()))?;

        if let Some(reference) = &transaction.payment_reference {
            let taken = self
                .db
                .get_cf(&self.cf(cf::TRANSACTIONS_BY_REFERENCE)?, keys::reference_key(reference))
                .map_err(|e| StoreError::Database(e.to_string()))?
                .is_some();
            if taken {
                debug!(reference = %reference, "Payment reference already in use");
                return Err(StoreError::AlreadyExists(reference.clone()));
            }
        }

        let mut batch = WriteBatch::default();
        self.stage_transaction(&mut batch, transaction)?;
        self.write(batch)
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        self.get_value(cf::TRANSACTIONS, &keys::transaction_key(transaction_id))
    }

    fn find_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let cf_by_ref = self.cf(cf::TRANSACTIONS_BY_REFERENCE)?;
        let Some(id_bytes) = self
            .db
            .get_cf(&cf_by_ref, keys::reference_key(reference))
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = id_bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed reference index".to_string()))?;
        self.get_transaction(&TransactionId::from_bytes(bytes))
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let index = self.prefix_keys(cf::TRANSACTIONS_BY_USER, &keys::user_prefix(user_id))?;

        let mut transactions = Vec::new();
        // ULIDs sort by time, so the reversed index is newest first.
        for key in index.iter().rev().skip(offset).take(limit) {
            if let Some(tx_id) = keys::transaction_id_from_user_key(key) {
                if let Some(tx) = self.get_transaction(&tx_id)? {
                    transactions.push(tx);
                }
            }
        }
        Ok(transactions)
    }

    fn commit(&self, write: &LedgerWrite) -> Result<()> {
        let mut batch = WriteBatch::default();
        if let Some(account) = &write.account {
            batch.put_cf(
                &self.cf(cf::ACCOUNTS)?,
                keys::account_key(&account.user_id),
                Self::serialize(account)?,
            );
        }
        self.stage_transaction(&mut batch, &write.transaction)?;
        self.write(batch)
    }
}

impl UsageStatRepository for RocksStore {
    fn increment_usage(
        &self,
        user_id: &UserId,
        operation: &str,
        at: DateTime<Utc>,
    ) -> Result<UsageStat> {
        // Read-modify-write; callers serialize per user.
        let key = keys::usage_key(user_id, at.date_naive(), operation);
        let stat = match self.get_value::<UsageStat>(cf::USAGE_STATS, &key)? {
            Some(mut stat) => {
                stat.increment(at);
                stat
            }
            None => UsageStat::first(*user_id, operation, at),
        };
        self.put_value(cf::USAGE_STATS, &key, &stat)?;
        Ok(stat)
    }

    fn list_usage_since(&self, user_id: &UserId, since: NaiveDate) -> Result<Vec<UsageStat>> {
        let start = keys::usage_day_prefix(user_id, since);
        let prefix = keys::user_prefix(user_id);
        let mut stats = Vec::new();
        for key in self.keys_from(cf::USAGE_STATS, &start, &prefix)? {
            if let Some(stat) = self.get_value(cf::USAGE_STATS, &key)? {
                stats.push(stat);
            }
        }
        Ok(stats)
    }
}

impl PricingRepository for RocksStore {
    fn get_pricing(&self) -> Result<Option<PricingPolicy>> {
        self.get_value(cf::SETTINGS, PRICING_POLICY_KEY)
    }

    fn put_pricing(&self, policy: &PricingPolicy) -> Result<()> {
        self.put_value(cf::SETTINGS, PRICING_POLICY_KEY, policy)
    }
}

impl ApiKeyRepository for RocksStore {
    fn put_api_key(&self, key: &ApiKey) -> Result<()> {
        let mut batch = WriteBatch::default();
        batch.put_cf(
            &self.cf(cf::API_KEYS)?,
            keys::api_key_key(&key.id),
            Self::serialize(key)?,
        );
        batch.put_cf(
            &self.cf(cf::API_KEYS_BY_HASH)?,
            key.key_hash.as_bytes(),
            keys::api_key_key(&key.id),
        );
        batch.put_cf(
            &self.cf(cf::API_KEYS_BY_USER)?,
            keys::user_api_key_key(&key.user_id, &key.id),
            [],
        );
        self.write(batch)
    }

    fn get_api_key(&self, key_id: &ApiKeyId) -> Result<Option<ApiKey>> {
        self.get_value(cf::API_KEYS, &keys::api_key_key(key_id))
    }

    fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let cf_by_hash = self.cf(cf::API_KEYS_BY_HASH)?;
        let Some(id_bytes) = self
            .db
            .get_cf(&cf_by_hash, key_hash.as_bytes())
            .map_err(|e| StoreError::Database(e.to_string()))?
        else {
            return Ok(None);
        };

        let bytes: [u8; 16] = id_bytes
            .as_slice()
            .try_into()
            .map_err(|_| StoreError::Serialization("malformed key hash index".to_string()))?;
        self.get_api_key(&ApiKeyId::from_bytes(bytes))
    }

    fn list_api_keys_by_user(&self, user_id: &UserId) -> Result<Vec<ApiKey>> {
        let mut out = Vec::new();
        for index_key in self.prefix_keys(cf::API_KEYS_BY_USER, &keys::user_prefix(user_id))? {
            if let Some(key_id) = keys::api_key_id_from_user_key(&index_key) {
                if let Some(key) = self.get_api_key(&key_id)? {
                    out.push(key);
                }
            }
        }
        out.sort_by_key(|k| k.created_at);
        Ok(out)
    }

    fn delete_api_key(&self, key_id: &ApiKeyId) -> Result<()> {
        let key = self.get_api_key(key_id)?.ok_or(StoreError::NotFound)?;

        let mut batch = WriteBatch::default();
        batch.delete_cf(&self.cf(cf::API_KEYS)?, keys::api_key_key(key_id));
        batch.delete_cf(&self.cf(cf::API_KEYS_BY_HASH)?, key.key_hash.as_bytes());
        batch.delete_cf(
            &self.cf(cf::API_KEYS_BY_USER)?,
            keys::user_api_key_key(&key.user_id, key_id),
        );
        self.write(batch)
    }

    fn touch_api_key(&self, key_id: &ApiKeyId, at: DateTime<Utc>) -> Result<()> {
        if let Some(mut key) = self.get_api_key(key_id)? {
            key.last_used_at = Some(at);
            self.put_value(cf::API_KEYS, &keys::api_key_key(key_id), &key)?;
        }
        Ok(())
    }
}

impl WebhookEventRepository for RocksStore {
    fn put_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        self.put_value(cf::WEBHOOK_EVENTS, &keys::webhook_event_key(&event.id), event)
    }

    fn list_webhook_events(&self, limit: usize) -> Result<Vec<WebhookEvent>> {
        let cf = self.cf(cf::WEBHOOK_EVENTS)?;
        let mut events = Vec::new();
        for item in self.db.iterator_cf(&cf, IteratorMode::End).take(limit) {
            let (_, value) = item.map_err(|e| StoreError::Database(e.to_string()))?;
            events.push(Self::deserialize(&value)?);
        }
        Ok(events)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn create_test_store() -> (RocksStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = RocksStore::open(dir.path()).unwrap();
        (store, dir)
    }

    #[test]
    fn account_crud() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let mut account = Account::new(user_id, Utc::now());
        account.balance_micros = 5_000_000;

        store.put_account(&account).unwrap();
        let retrieved = store.get_account(&user_id).unwrap().unwrap();
        assert_eq!(retrieved, account);

        store.delete_account(&user_id).unwrap();
        assert!(store.get_account(&user_id).unwrap().is_none());
    }

    #[test]
    fn commit_and_list() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let mut account = Account::new(user_id, Utc::now());
        account.balance_micros = 1_000_000;
        store.put_account(&account).unwrap();

        let tx1 = Transaction::free_operation(user_id, "merge", 1_000_000, Utc::now());
        store.commit(&LedgerWrite::transaction_only(tx1.clone())).unwrap();

        std::thread::sleep(std::time::Duration::from_millis(2));

        account.balance_micros = 995_000;
        let tx2 = Transaction::paid_operation(user_id, "compress", 5_000, 995_000, Utc::now());
        store.commit(&LedgerWrite::new(account, tx2.clone())).unwrap();

        assert_eq!(
            store.get_account(&user_id).unwrap().unwrap().balance_micros,
            995_000
        );

        let transactions = store.list_transactions_by_user(&user_id, 10, 0).unwrap();
        assert_eq!(transactions.len(), 2);
        assert_eq!(transactions[0].id, tx2.id);
        assert_eq!(transactions[1].id, tx1.id);

        let page2 = store.list_transactions_by_user(&user_id, 1, 1).unwrap();
        assert_eq!(page2[0].id, tx1.id);
    }

    #[test]
    fn deposit_reference_index() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let mut deposit =
            Transaction::pending_deposit(user_id, 10_000_000, 0, "order-123".into(), Utc::now());
        store.put_transaction(&deposit).unwrap();

        deposit.complete(10_000_000, Utc::now()).unwrap();
        store
            .commit(&LedgerWrite::transaction_only(deposit.clone()))
            .unwrap();

        let found = store.find_transaction_by_reference("order-123").unwrap().unwrap();
        assert_eq!(found, deposit);
        assert!(store.find_transaction_by_reference("nope").unwrap().is_none());
    }

    #[test]
    fn reference_is_claimed_once() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let first =
            Transaction::pending_deposit(user_id, 10_000_000, 0, "order-7".into(), Utc::now());
        let second =
            Transaction::pending_deposit(user_id, 20_000_000, 0, "order-7".into(), Utc::now());

        let barrier = std::sync::Barrier::new(2);
        let results: Vec<_> = std::thread::scope(|s| {
            [&first, &second]
                .map(|tx| {
                    let (store, barrier) = (&store, &barrier);
                    s.spawn(move || {
                        barrier.wait();
                        store.insert_with_unique_reference(tx)
                    })
                })
                .into_iter()
                .map(|h| h.join().unwrap())
                .collect()
        });

        assert_eq!(results.iter().filter(|r| r.is_ok()).count(), 1);
        let winner = if results[0].is_ok() { &first } else { &second };
        let indexed = store.find_transaction_by_reference("order-7").unwrap().unwrap();
        assert_eq!(indexed.id, winner.id);
        assert_eq!(store.list_transactions_by_user(&user_id, 10, 0).unwrap().len(), 1);
    }

    #[test]
    fn usage_and_pricing() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        let now = Utc::now();

        store.increment_usage(&user_id, "ocr", now).unwrap();
        let stat = store.increment_usage(&user_id, "ocr", now).unwrap();
        assert_eq!(stat.count, 2);
        assert_eq!(
            store.list_usage_since(&user_id, now.date_naive()).unwrap().len(),
            1
        );

        assert!(store.get_pricing().unwrap().is_none());
        let policy = PricingPolicy::default().with_custom_price("compress", 3_000);
        store.put_pricing(&policy).unwrap();
        assert_eq!(store.get_pricing().unwrap(), Some(policy));
    }

    #[test]
    fn api_keys_and_cascade() {
        let (store, _dir) = create_test_store();
        let user_id = UserId::generate();
        store.put_account(&Account::new(user_id, Utc::now())).unwrap();

        let key = ApiKey {
            id: ApiKeyId::generate(),
            user_id,
            name: "ci".into(),
            key_hash: "feed".into(),
            key_prefix: "sk_feed".into(),
            permissions: vec!["*".into()],
            expires_at: None,
            last_used_at: None,
            created_at: Utc::now(),
        };
        store.put_api_key(&key).unwrap();
        assert_eq!(store.get_api_key_by_hash("feed").unwrap(), Some(key.clone()));
        assert_eq!(store.list_api_keys_by_user(&user_id).unwrap().len(), 1);

        store.touch_api_key(&key.id, Utc::now()).unwrap();
        assert!(store
            .get_api_key(&key.id)
            .unwrap()
            .unwrap()
            .last_used_at
            .is_some());

        store.delete_account(&user_id).unwrap();
        assert!(store.get_api_key_by_hash("feed").unwrap().is_none());
        assert!(store.list_api_keys_by_user(&user_id).unwrap().is_empty());
    }
}
