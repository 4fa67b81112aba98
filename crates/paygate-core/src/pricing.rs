//! Pricing policy and money helpers.
//!
//! # Money
//!
//! Every amount is an `i64` count of micro-dollars (`1 USD = 1_000_000`).
//! Operation prices are fractions of a cent ($0.005, $0.003), so cents are
//! too coarse and floats are not exact.

use std::collections::BTreeMap;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::{BillingError, Result};

/// Micro-dollars per US dollar.
pub const MICROS_PER_USD: i64 = 1_000_000;

/// Global per-operation cost when no policy has been stored ($0.005).
pub const DEFAULT_OPERATION_COST_MICROS: i64 = 5_000;

/// Monthly free operations when no policy has been stored.
pub const DEFAULT_FREE_OPERATIONS_MONTHLY: u32 = 500;

/// Lowest accepted per-operation override ($0.001).
pub const MIN_CUSTOM_PRICE_MICROS: i64 = 1_000;

/// Highest accepted per-operation override ($0.10).
pub const MAX_CUSTOM_PRICE_MICROS: i64 = 100_000;

/// Billable operation names known to the platform.
pub const OPERATIONS: &[&str] = &[
    "convert",
    "compress",
    "merge",
    "split",
    "watermark",
    "protect",
    "unlock",
    "remove",
    "rotate",
    "sign",
    "ocr",
    "repair",
    "pagenumber",
];

/// Check whether `operation` is one of [`OPERATIONS`].
#[must_use]
pub fn is_known_operation(operation: &str) -> bool {
    OPERATIONS.contains(&operation)
}

/// The singleton pricing policy.
///
/// Read fresh for every charge; never cached for longer than one call.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PricingPolicy {
    /// Global cost of one operation, in micro-dollars.
    pub operation_cost_micros: i64,

    /// Free operations granted per calendar month.
    pub free_operations_monthly: u32,

    /// Per-operation overrides, in micro-dollars.
    #[serde(default)]
    pub custom_prices: BTreeMap<String, i64>,

    /// When an administrator last changed the policy.
    #[serde(default)]
    pub updated_at: Option<DateTime<Utc>>,
}

impl Default for PricingPolicy {
    fn default() -> Self {
        Self {
            operation_cost_micros: DEFAULT_OPERATION_COST_MICROS,
            free_operations_monthly: DEFAULT_FREE_OPERATIONS_MONTHLY,
            custom_prices: BTreeMap::new(),
            updated_at: None,
        }
    }
}

/// Where a resolved price came from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceSource {
    /// The per-operation override.
    Override,
    /// The global default.
    Global,
    /// An override exists but lies outside the safety range; the global price applies.
    OverrideOutOfRange,
}

/// The outcome of [`PricingPolicy::resolve`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ResolvedPrice {
    /// Cost in micro-dollars.
    pub cost_micros: i64,
    /// Which rule produced the cost.
    pub source: PriceSource,
}

impl PricingPolicy {
    /// Build a policy with the given global cost and monthly free allowance.
    #[must_use]
    pub fn new(operation_cost_micros: i64, free_operations_monthly: u32) -> Self {
        Self {
            operation_cost_micros,
            free_operations_monthly,
            ..Self::default()
        }
    }

    /// Add or replace an override.
    #[must_use]
    pub fn with_custom_price(mut self, operation: impl Into<String>, cost_micros: i64) -> Self {
        self.custom_prices.insert(operation.into(), cost_micros);
        self
    }

    /// Resolve the cost of `operation`: override first, global otherwise.
    #[must_use]
    pub fn resolve(&self, operation: &str) -> ResolvedPrice {
        match self.custom_prices.get(operation) {
            Some(&cost) if custom_price_in_range(cost) => ResolvedPrice {
                cost_micros: cost,
                source: PriceSource::Override,
            },
            Some(_) => ResolvedPrice {
                cost_micros: self.operation_cost_micros,
                source: PriceSource::OverrideOutOfRange,
            },
            None => ResolvedPrice {
                cost_micros: self.operation_cost_micros,
                source: PriceSource::Global,
            },
        }
    }

    /// Shorthand for `resolve(operation).cost_micros`.
    #[must_use]
    pub fn resolve_cost(&self, operation: &str) -> i64 {
        self.resolve(operation).cost_micros
    }

    /// Validate a policy submitted by an administrator.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::InvalidPricing` for a negative global cost or an
    /// override outside `[MIN_CUSTOM_PRICE_MICROS, MAX_CUSTOM_PRICE_MICROS]`.
    pub fn validate(&self) -> Result<()> {
        if self.operation_cost_micros < 0 {
            return Err(BillingError::InvalidPricing(format!(
                "global operation cost must not be negative: {}",
                self.operation_cost_micros
            )));
        }

        if let Some((operation, cost)) = self
            .custom_prices
            .iter()
            .find(|(_, &cost)| !custom_price_in_range(cost))
        {
            return Err(BillingError::InvalidPricing(format!(
                "custom price for '{operation}' is outside {} .. {}: {}",
                format_usd(MIN_CUSTOM_PRICE_MICROS),
                format_usd(MAX_CUSTOM_PRICE_MICROS),
                format_usd(*cost)
            )));
        }

        Ok(())
    }
}

const fn custom_price_in_range(cost_micros: i64) -> bool {
    cost_micros >= MIN_CUSTOM_PRICE_MICROS && cost_micros <= MAX_CUSTOM_PRICE_MICROS
}

/// Convert a dollar amount to micro-dollars, rounding to the nearest micro.
#[must_use]
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
pub fn usd_to_micros(usd: f64) -> i64 {
    (usd * MICROS_PER_USD as f64).round() as i64
}

/// Convert micro-dollars to a dollar amount for display or JSON.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn micros_to_usd(micros: i64) -> f64 {
    micros as f64 / MICROS_PER_USD as f64
}

/// Format as `$1.234` (three decimals, the precision prices are quoted in).
#[must_use]
pub fn format_usd(micros: i64) -> String {
    let sign = if micros < 0 { "-" } else { "" };
    format!("{sign}${}", three_decimals(micros.unsigned_abs()))
}

/// Format a ledger amount: `+10.000`, `-0.005`.
#[must_use]
pub fn format_signed(micros: i64) -> String {
    let sign = if micros < 0 { '-' } else { '+' };
    format!("{sign}{}", three_decimals(micros.unsigned_abs()))
}

fn three_decimals(micros: u64) -> String {
    let mills = (micros + 500) / 1_000;
    format!("{}.{:03}", mills / 1_000, mills % 1_000)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_policy() {
        let policy = PricingPolicy::default();
        assert_eq!(policy.operation_cost_micros, 5_000);
        assert_eq!(policy.free_operations_monthly, 500);
        assert!(policy.custom_prices.is_empty());
    }

    #[test]
    fn override_takes_precedence() {
        let policy = PricingPolicy::default().with_custom_price("compress", 3_000);

        let resolved = policy.resolve("compress");
        assert_eq!(resolved.cost_micros, 3_000);
        assert_eq!(resolved.source, PriceSource::Override);

        let resolved = policy.resolve("merge");
        assert_eq!(resolved.cost_micros, 5_000);
        assert_eq!(resolved.source, PriceSource::Global);
    }

    #[test]
    fn out_of_range_override_falls_back_to_global() {
        let policy = PricingPolicy::default()
            .with_custom_price("ocr", 500_000)
            .with_custom_price("sign", 10);

        assert_eq!(policy.resolve("ocr").source, PriceSource::OverrideOutOfRange);
        assert_eq!(policy.resolve_cost("ocr"), 5_000);
        assert_eq!(policy.resolve_cost("sign"), 5_000);
    }

    #[test]
    fn validate_rejects_bad_policies() {
        assert!(PricingPolicy::default().validate().is_ok());
        assert!(PricingPolicy::new(-1, 500).validate().is_err());
        assert!(PricingPolicy::default()
            .with_custom_price("ocr", 200_000)
            .validate()
            .is_err());
        assert!(PricingPolicy::default()
            .with_custom_price("ocr", 100_000)
            .validate()
            .is_ok());
    }

    #[test]
    fn dollar_conversions() {
        assert_eq!(usd_to_micros(0.005), 5_000);
        assert_eq!(usd_to_micros(10.0), 10_000_000);
        assert_eq!(usd_to_micros(0.995), 995_000);
        assert!((micros_to_usd(995_000) - 0.995).abs() < 1e-9);
    }

    #[test]
    fn formatting() {
        assert_eq!(format_usd(995_000), "$0.995");
        assert_eq!(format_usd(10_000_000), "$10.000");
        assert_eq!(format_usd(0), "$0.000");
        assert_eq!(format_signed(-5_000), "-0.005");
        assert_eq!(format_signed(10_000_000), "+10.000");
    }

    #[test]
    fn known_operations() {
        assert!(is_known_operation("compress"));
        assert!(!is_known_operation("pdf"));
    }
}
