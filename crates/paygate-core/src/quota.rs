//! Monthly free-operation quota.
//!
//! Rollover is lazy: nothing runs at the month boundary. Whoever next looks
//! at an account whose reset date has passed sees a projected, zeroed
//! counter; the projection is persisted only by a mutating gate call.

use chrono::{DateTime, Datelike, TimeZone, Utc};
use serde::{Deserialize, Serialize};

use crate::Account;

/// First instant (00:00:00 UTC) of the calendar month following `now`.
#[must_use]
pub fn next_reset_after(now: DateTime<Utc>) -> DateTime<Utc> {
    let (year, month) = if now.month() == 12 {
        (now.year() + 1, 1)
    } else {
        (now.year(), now.month() + 1)
    };

    Utc.with_ymd_and_hms(year, month, 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// First instant of the calendar month containing `now`.
#[must_use]
pub fn month_start(now: DateTime<Utc>) -> DateTime<Utc> {
    Utc.with_ymd_and_hms(now.year(), now.month(), 1, 0, 0, 0)
        .single()
        .unwrap_or(now)
}

/// The effective quota state of an account at a given instant.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct QuotaSnapshot {
    /// Free operations used in the current period.
    pub used: u32,
    /// When the current period ends.
    pub reset_at: DateTime<Utc>,
    /// Monthly allowance from the pricing policy.
    pub limit: u32,
    /// Whether the stored counter was stale and has been projected to zero.
    pub rolled_over: bool,
}

impl QuotaSnapshot {
    /// Project the account's quota at `now` without mutating it.
    #[must_use]
    pub fn evaluate(account: &Account, limit: u32, now: DateTime<Utc>) -> Self {
        if account.free_operations_reset <= now {
            Self {
                used: 0,
                reset_at: next_reset_after(now),
                limit,
                rolled_over: true,
            }
        } else {
            Self {
                used: account.free_operations_used,
                reset_at: account.free_operations_reset,
                limit,
                rolled_over: false,
            }
        }
    }

    /// Whether a free unit is available.
    #[must_use]
    pub const fn has_free_unit(&self) -> bool {
        self.used < self.limit
    }

    /// Free units left in this period (never negative).
    #[must_use]
    pub const fn remaining(&self) -> u32 {
        self.limit.saturating_sub(self.used)
    }
}
