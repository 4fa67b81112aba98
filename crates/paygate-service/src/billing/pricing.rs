//! Current pricing policy.

use std::sync::Arc;

use chrono::{DateTime, Utc};

use paygate_core::{PriceSource, PricingPolicy, ResolvedPrice, Result};
use paygate_store::Store;

/// Reads the policy from the store on every call. Falls back to the
/// configured defaults until an administrator saves one.
#[derive(Clone)]
pub struct PolicySource {
    store: Arc<dyn Store>,
    fallback: PricingPolicy,
}

impl PolicySource {
    /// Create a source over `store` with `fallback` as the unsaved default.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, fallback: PricingPolicy) -> Self {
        Self { store, fallback }
    }

    /// The policy in force right now.
    ///
    /// # Errors
    ///
    /// Returns `BillingError::Storage` if the store is unavailable.
    pub fn current(&self) -> Result<PricingPolicy> {
        Ok(self
            .store
            .get_pricing()?
            .unwrap_or_else(|| self.fallback.clone()))
    }

    /// Resolve the price of `operation` under `policy`, logging ignored overrides.
    #[must_use]
    pub fn resolve(policy: &PricingPolicy, operation: &str) -> ResolvedPrice {
        let price = policy.resolve(operation);
        if price.source == PriceSource::OverrideOutOfRange {
            tracing::warn!(
                operation = %operation,
                override_micros = ?policy.custom_prices.get(operation),
                global_micros = policy.operation_cost_micros,
                "Custom price outside allowed range, using global price"
            );
        }
        price
    }

    /// Validate and store a new policy.
    ///
    /// # Errors
    ///
    /// - `BillingError::InvalidPricing` if the policy is rejected.
    /// - `BillingError::Storage` if the store is unavailable.
    pub fn update(&self, mut policy: PricingPolicy, at: DateTime<Utc>) -> Result<PricingPolicy> {
        policy.validate()?;
        policy.updated_at = Some(at);
        self.store.put_pricing(&policy)?;

        tracing::info!(
            operation_cost_micros = policy.operation_cost_micros,
            free_operations_monthly = policy.free_operations_monthly,
            custom_prices = policy.custom_prices.len(),
            "Pricing policy updated"
        );
        Ok(policy)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use paygate_core::BillingError;
    use paygate_store::MemoryStore;

    #[test]
    fn falls_back_until_saved() {
        let source = PolicySource::new(Arc::new(MemoryStore::new()), PricingPolicy::new(7_000, 10));
        assert_eq!(source.current().unwrap().operation_cost_micros, 7_000);

        source
            .update(PricingPolicy::new(3_000, 100), Utc::now())
            .unwrap();
        let current = source.current().unwrap();
        assert_eq!(current.operation_cost_micros, 3_000);
        assert_eq!(current.free_operations_monthly, 100);
        assert!(current.updated_at.is_some());
    }

    #[test]
    fn invalid_update_is_not_stored() {
        let source = PolicySource::new(Arc::new(MemoryStore::new()), PricingPolicy::default());
        let bad = PricingPolicy::default().with_custom_price("ocr", 1_000_000);
        assert!(matches!(
            source.update(bad, Utc::now()),
            Err(BillingError::InvalidPricing(_))
        ));
        assert!(source.current().unwrap().custom_prices.is_empty());
    }
}
