//! Per-account critical sections.
//!
//! Every balance or quota mutation (charges, deposit settlement, key
//! revocation) runs while holding the owning account's slot. Different
//! accounts never contend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use std::time::Duration;

use tokio::sync::{Mutex as AsyncMutex, OwnedMutexGuard};

use paygate_core::{BillingError, Result, UserId};

/// Idle slots are pruned once the table grows past this many entries.
const PRUNE_THRESHOLD: usize = 1024;

/// Holding this keeps the account's critical section entered.
#[must_use = "the account is unlocked as soon as the guard is dropped"]
pub struct AccountGuard {
    _guard: OwnedMutexGuard<()>,
}

/// A table of per-account async mutexes.
pub struct AccountLocks {
    slots: Mutex<HashMap<UserId, Arc<AsyncMutex<()>>>>,
    timeout: Duration,
}

impl AccountLocks {
    /// Create a table whose `acquire` gives up after `timeout`.
    #[must_use]
    pub fn new(timeout: Duration) -> Self {
        Self {
            slots: Mutex::new(HashMap::new()),
            timeout,
        }
    }

    /// Enter the critical section for `user_id`.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::TransactionConflict` if the slot could not be
    /// taken within the configured timeout. Nothing has been touched then.
    pub async fn acquire(&self, user_id: &UserId) -> Result<AccountGuard> {
        let slot = self.slot(user_id)?;

        match tokio::time::timeout(self.timeout, slot.lock_owned()).await {
            Ok(guard) => Ok(AccountGuard { _guard: guard }),
            Err(_) => {
                tracing::warn!(
                    user_id = %user_id,
                    timeout_ms = self.timeout.as_millis(),
                    "Timed out waiting for account lock"
                );
                Err(BillingError::TransactionConflict {
                    user_id: user_id.to_string(),
                })
            }
        }
    }

    fn slot(&self, user_id: &UserId) -> Result<Arc<AsyncMutex<()>>> {
        let mut slots = self
            .slots
            .lock()
            .map_err(|_| BillingError::Storage("account lock table poisoned".to_string()))?;

        if slots.len() >= PRUNE_THRESHOLD {
            // A slot only referenced by the table is neither held nor awaited.
            slots.retain(|_, slot| Arc::strong_count(slot) > 1);
        }

        Ok(Arc::clone(slots.entry(*user_id).or_default()))
    }

    /// Number of slots currently in the table.
    #[must_use]
    pub fn len(&self) -> usize {
        self.slots.lock().map(|slots| slots.len()).unwrap_or(0)
    }

    /// Whether the table is empty.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}
