//! Application state.

use std::sync::Arc;

use paygate_core::Result;
use paygate_store::{MemoryStore, Store};

use crate::billing::{
    AccountLocks, AccountService, ApiKeyGate, DepositReconciler, OperationGate, PolicySource,
};
use crate::config::{ServiceConfig, StoreBackend};

/// Application state shared across handlers.
#[derive(Clone)]
pub struct AppState {
    /// The storage backend.
    pub store: Arc<dyn Store>,

    /// Service configuration.
    pub config: ServiceConfig,

    /// Per-account critical sections shared by every mutating component.
    pub locks: Arc<AccountLocks>,

    /// Current pricing policy.
    pub pricing: PolicySource,

    /// Charges operations.
    pub gate: OperationGate,

    /// Issues and validates API keys.
    pub keys: ApiKeyGate,

    /// Creates and settles deposits.
    pub reconciler: DepositReconciler,

    /// Account lifecycle and summaries.
    pub accounts: AccountService,
}

impl AppState {
    /// Create a new application state.
    #[must_use]
    pub fn new(store: Arc<dyn Store>, config: ServiceConfig) -> Self {
        let locks = Arc::new(AccountLocks::new(config.lock_timeout()));
        let pricing = PolicySource::new(store.clone(), config.default_pricing.clone());
        let keys = ApiKeyGate::new(store.clone(), locks.clone(), pricing.clone());
        let gate = OperationGate::new(store.clone(), locks.clone(), pricing.clone(), keys.clone());
        let reconciler = DepositReconciler::new(store.clone(), locks.clone());
        let accounts = AccountService::new(store.clone(), locks.clone(), pricing.clone());

        if config.service_api_key.is_none() {
            tracing::warn!("SERVICE_API_KEY not configured - service endpoints are disabled");
        }
        if config.jwt_secret.is_none() {
            tracing::warn!("JWT_SECRET not configured - user endpoints are disabled");
        }

        Self {
            store,
            config,
            locks,
            pricing,
            gate,
            keys,
            reconciler,
            accounts,
        }
    }
}

/// Open the configured storage backend.
///
/// # Errors
///
/// Returns `BillingError::Storage` if `RocksDB` cannot be opened and
/// `BillingError::Configuration` if it was requested without the
/// `rocksdb-backend` feature.
pub fn open_store(config: &ServiceConfig) -> Result<Arc<dyn Store>> {
    match config.store_backend {
        StoreBackend::Memory => {
            tracing::warn!("Using in-memory store - data is lost on restart");
            Ok(Arc::new(MemoryStore::new()))
        }
        #[cfg(feature = "rocksdb-backend")]
        StoreBackend::RocksDb => {
            tracing::info!(path = %config.data_dir, "Opening RocksDB store");
            Ok(Arc::new(paygate_store::RocksStore::open(&config.data_dir)?))
        }
        #[cfg(not(feature = "rocksdb-backend"))]
        StoreBackend::RocksDb => Err(paygate_core::BillingError::Configuration(
            "STORE_BACKEND=rocksdb requires the rocksdb-backend feature".into(),
        )),
    }
}
