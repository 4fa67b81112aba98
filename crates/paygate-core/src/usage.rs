//! Per-day usage counters.
//!
//! Reporting only. Billing never reads these.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

use crate::UserId;

/// Operations with this name are never shown in usage breakdowns.
pub const HIDDEN_OPERATION: &str = "pdf";

/// A (user, operation, day) counter.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UsageStat {
    /// The user.
    pub user_id: UserId,

    /// Operation name.
    pub operation: String,

    /// UTC calendar day.
    pub day: NaiveDate,

    /// Number of operations that day.
    pub count: u64,

    /// Last increment.
    pub updated_at: DateTime<Utc>,
}

impl UsageStat {
    /// A fresh counter with a single use recorded at `at`.
    #[must_use]
    pub fn first(user_id: UserId, operation: &str, at: DateTime<Utc>) -> Self {
        Self {
            user_id,
            operation: operation.to_string(),
            day: at.date_naive(),
            count: 1,
            updated_at: at,
        }
    }

    /// Record one more use.
    pub fn increment(&mut self, at: DateTime<Utc>) {
        self.count += 1;
        self.updated_at = at;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn counter_is_keyed_by_utc_day() {
        let at = Utc.with_ymd_and_hms(2026, 4, 30, 23, 59, 59).unwrap();
        let mut stat = UsageStat::first(UserId::generate(), "split", at);
        assert_eq!(stat.day, NaiveDate::from_ymd_opt(2026, 4, 30).unwrap());
        assert_eq!(stat.count, 1);

        stat.increment(at);
        assert_eq!(stat.count, 2);
    }
}
