//! The billing core: charging, deposits, keys and accounts.

pub mod accounts;
pub mod engine;
pub mod gate;
pub mod keys;
pub mod locks;
pub mod pricing;
pub mod reconciler;

pub use accounts::{AccountService, BalanceSummary, RECENT_TRANSACTIONS};
pub use engine::{run_metered, EngineError, MeteredRun, TransformationEngine};
pub use gate::OperationGate;
pub use keys::{generate_secret, hash_secret, ApiKeyGate, IssuedKey};
pub use locks::{AccountGuard, AccountLocks};
pub use pricing::PolicySource;
pub use reconciler::{DepositReconciler, ReconcileOutcome, MIN_DEPOSIT_MICROS};
