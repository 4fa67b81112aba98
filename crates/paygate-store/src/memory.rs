//! In-memory storage implementation.
//!
//! All collections live behind one `RwLock`, so every trait call, including
//! [`TransactionRepository::commit`], is atomic with respect to the others.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use chrono::{DateTime, NaiveDate, Utc};
use paygate_core::{
    Account, ApiKey, ApiKeyId, PricingPolicy, Transaction, TransactionId, UsageStat, UserId,
    WebhookEvent, WebhookEventId,
};

use crate::error::{Result, StoreError};
use crate::{
    AccountRepository, ApiKeyRepository, LedgerWrite, PricingRepository, TransactionRepository,
    UsageStatRepository, WebhookEventRepository,
};

#[derive(Default)]
struct State {
    accounts: HashMap<UserId, Account>,
    transactions: BTreeMap<TransactionId, Transaction>,
    transactions_by_reference: HashMap<String, TransactionId>,
    usage_stats: BTreeMap<(UserId, NaiveDate, String), UsageStat>,
    pricing: Option<PricingPolicy>,
    api_keys: HashMap<ApiKeyId, ApiKey>,
    api_keys_by_hash: HashMap<String, ApiKeyId>,
    webhook_events: BTreeMap<WebhookEventId, WebhookEvent>,
}

impl State {
    fn insert_transaction(&mut self, transaction: &Transaction) {
        if let Some(reference) = &transaction.payment_reference {
            self.transactions_by_reference
                .insert(reference.clone(), transaction.id);
        }
        self.transactions.insert(transaction.id, transaction.clone());
    }
}

/// Process-local store.
#[derive(Default)]
pub struct MemoryStore {
    state: RwLock<State>,
    unavailable: AtomicBool,
}

impl MemoryStore {
    /// Create an empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every call fail with `StoreError::Database`, simulating an outage.
    pub fn set_unavailable(&self, unavailable: bool) {
        self.unavailable.store(unavailable, Ordering::SeqCst);
    }

    fn check_available(&self) -> Result<()> {
        if self.unavailable.load(Ordering::SeqCst) {
            return Err(StoreError::Database("store unavailable".to_string()));
        }
        Ok(())
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, State>> {
        self.check_available()?;
        self.state
            .read()
            .map_err(|_| StoreError::Database("state lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, State>> {
        self.check_available()?;
        self.state
            .write()
            .map_err(|_| StoreError::Database("state lock poisoned".to_string()))
    }
}

impl AccountRepository for MemoryStore {
    fn put_account(&self, account: &Account) -> Result<()> {
        self.write()?
            .accounts
            .insert(account.user_id, account.clone());
        Ok(())
    }

    fn get_account(&self, user_id: &UserId) -> Result<Option<Account>> {
        Ok(self.read()?.accounts.get(user_id).cloned())
    }

    fn delete_account(&self, user_id: &UserId) -> Result<()> {
        let mut state = self.write()?;
        if state.accounts.remove(user_id).is_none() {
            return Err(StoreError::NotFound);
        }

        state.transactions.retain(|_, t| t.user_id != *user_id);
        let remaining: Vec<TransactionId> = state.transactions.keys().copied().collect();
        state
            .transactions_by_reference
            .retain(|_, id| remaining.binary_search(id).is_ok());
        state.usage_stats.retain(|(owner, _, _), _| owner != user_id);
        state.api_keys.retain(|_, k| k.user_id != *user_id);
        let keys: Vec<ApiKeyId> = state.api_keys.keys().copied().collect();
        state.api_keys_by_hash.retain(|_, id| keys.contains(id));

        Ok(())
    }
}

impl TransactionRepository for MemoryStore {
    fn put_transaction(&self, transaction: &Transaction) -> Result<()> {
        self.write()?.insert_transaction(transaction);
        Ok(())
    }

    fn insert_with_unique_reference(&self, transaction: &Transaction) -> Result<()> {
        let mut state = self.write()?;
        if let Some(reference) = &transaction.payment_reference {
            if state.transactions_by_reference.contains_key(reference) {
                return Err(StoreError::AlreadyExists(reference.clone()));
            }
        }
        state.insert_transaction(transaction);
        Ok(())
    }

    fn get_transaction(&self, transaction_id: &TransactionId) -> Result<Option<Transaction>> {
        Ok(self.read()?.transactions.get(transaction_id).cloned())
    }

    fn find_transaction_by_reference(&self, reference: &str) -> Result<Option<Transaction>> {
        let state = self.read()?;
        Ok(state
            .transactions_by_reference
            .get(reference)
            .and_then(|id| state.transactions.get(id))
            .cloned())
    }

    fn list_transactions_by_user(
        &self,
        user_id: &UserId,
        limit: usize,
        offset: usize,
    ) -> Result<Vec<Transaction>> {
        let state = self.read()?;
        Ok(state
            .transactions
            .values()
            .rev()
            .filter(|t| t.user_id == *user_id)
            .skip(offset)
            .take(limit)
            .cloned()
            .collect())
    }

    fn commit(&self, write: &LedgerWrite) -> Result<()> {
        let mut state = self.write()?;
        if let Some(account) = &write.account {
            state.accounts.insert(account.user_id, account.clone());
        }
        state.insert_transaction(&write.transaction);
        Ok(())
    }
}

impl UsageStatRepository for MemoryStore {
    fn increment_usage(
        &self,
        user_id: &UserId,
        operation: &str,
        at: DateTime<Utc>,
    ) -> Result<UsageStat> {
        let mut state = self.write()?;
        let stat = state
            .usage_stats
            .entry((*user_id, at.date_naive(), operation.to_string()))
            .and_modify(|s| s.increment(at))
            .or_insert_with(|| UsageStat::first(*user_id, operation, at));
        Ok(stat.clone())
    }

    fn list_usage_since(&self, user_id: &UserId, since: NaiveDate) -> Result<Vec<UsageStat>> {
        let state = self.read()?;
        Ok(state
            .usage_stats
            .range((*user_id, since, String::new())..)
            .take_while(|((owner, _, _), _)| owner == user_id)
            .map(|(_, stat)| stat.clone())
            .collect())
    }
}

impl PricingRepository for MemoryStore {
    fn get_pricing(&self) -> Result<Option<PricingPolicy>> {
        Ok(self.read()?.pricing.clone())
    }

    fn put_pricing(&self, policy: &PricingPolicy) -> Result<()> {
        self.write()?.pricing = Some(policy.clone());
        Ok(())
    }
}

impl ApiKeyRepository for MemoryStore {
    fn put_api_key(&self, key: &ApiKey) -> Result<()> {
        let mut state = self.write()?;
        state.api_keys_by_hash.insert(key.key_hash.clone(), key.id);
        state.api_keys.insert(key.id, key.clone());
        Ok(())
    }

    fn get_api_key(&self, key_id: &ApiKeyId) -> Result<Option<ApiKey>> {
        Ok(self.read()?.api_keys.get(key_id).cloned())
    }

    fn get_api_key_by_hash(&self, key_hash: &str) -> Result<Option<ApiKey>> {
        let state = self.read()?;
        Ok(state
            .api_keys_by_hash
            .get(key_hash)
            .and_then(|id| state.api_keys.get(id))
            .cloned())
    }

    fn list_api_keys_by_user(&self, user_id: &UserId) -> Result<Vec<ApiKey>> {
        let state = self.read()?;
        let mut keys: Vec<ApiKey> = state
            .api_keys
            .values()
            .filter(|k| k.user_id == *user_id)
            .cloned()
            .collect();
        keys.sort_by_key(|k| k.created_at);
        Ok(keys)
    }

    fn delete_api_key(&self, key_id: &ApiKeyId) -> Result<()> {
        let mut state = self.write()?;
        let key = state.api_keys.remove(key_id).ok_or(StoreError::NotFound)?;
        state.api_keys_by_hash.remove(&key.key_hash);
        Ok(())
    }

    fn touch_api_key(&self, key_id: &ApiKeyId, at: DateTime<Utc>) -> Result<()> {
        if let Some(key) = self.write()?.api_keys.get_mut(key_id) {
            key.last_used_at = Some(at);
        }
        Ok(())
    }
}

impl WebhookEventRepository for MemoryStore {
    fn put_webhook_event(&self, event: &WebhookEvent) -> Result<()> {
        self.write()?.webhook_events.insert(event.id, event.clone());
        Ok(())
    }

    fn list_webhook_events(&self, limit: usize) -> Result<Vec<WebhookEvent>> {
        Ok(self
            .read()?
            .webhook_events
            .values()
            .rev()
            .take(limit)
            .cloned()
            .collect())
    }
}
