//! Account types for paygate.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::quota::{next_reset_after, QuotaSnapshot};
use crate::UserId;

/// A billing account for a user.
///
/// Holds the prepaid balance and the monthly free-operation counter. Only the
/// operation gate and the deposit reconciler change these fields.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    /// The owning user.
    pub user_id: UserId,

    /// Prepaid balance in micro-dollars. Never negative.
    pub balance_micros: i64,

    /// Free operations consumed in the current period.
    pub free_operations_used: u32,

    /// Next rollover boundary for `free_operations_used`.
    pub free_operations_reset: DateTime<Utc>,

    /// Role or status.
    pub role: Role,

    /// When the account was created.
    pub created_at: DateTime<Utc>,

    /// When the account was last updated.
    pub updated_at: DateTime<Utc>,
}

impl Account {
    /// Create an account with zero balance and a fresh quota period.
    #[must_use]
    pub fn new(user_id: UserId, now: DateTime<Utc>) -> Self {
        Self {
            user_id,
            balance_micros: 0,
            free_operations_used: 0,
            free_operations_reset: next_reset_after(now),
            role: Role::User,
            created_at: now,
            updated_at: now,
        }
    }

    /// Check if the balance covers `amount_micros`.
    #[must_use]
    pub const fn has_sufficient_balance(&self, amount_micros: i64) -> bool {
        self.balance_micros >= amount_micros
    }

    /// Whether the account may not use the service.
    #[must_use]
    pub fn is_suspended(&self) -> bool {
        self.role == Role::Suspended
    }

    /// Persist a rollover projected by [`QuotaSnapshot::evaluate`].
    pub fn apply_quota(&mut self, quota: &QuotaSnapshot) {
        if quota.rolled_over {
            self.free_operations_used = quota.used;
            self.free_operations_reset = quota.reset_at;
        }
    }
}

/// Account role.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    /// Regular customer.
    #[default]
    User,
    /// Administrator.
    Admin,
    /// Suspended; all keys are rejected.
    Suspended,
}
