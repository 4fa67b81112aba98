//! Service configuration.

use std::time::Duration;

use paygate_core::{
    usd_to_micros, PricingPolicy, DEFAULT_FREE_OPERATIONS_MONTHLY, DEFAULT_OPERATION_COST_MICROS,
};

/// Which storage backend to open.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    /// In-process, non-durable.
    Memory,
    /// `RocksDB` under `data_dir` (needs the `rocksdb-backend` feature).
    RocksDb,
}

impl StoreBackend {
    fn from_env_value(value: &str) -> Self {
        match value.trim().to_ascii_lowercase().as_str() {
            "rocksdb" | "rocks" => Self::RocksDb,
            "memory" => Self::Memory,
            other => {
                tracing::warn!(backend = %other, "Unknown STORE_BACKEND, using memory");
                Self::Memory
            }
        }
    }
}

/// Service configuration loaded from environment variables.
#[derive(Debug, Clone)]
pub struct ServiceConfig {
    /// Address to listen on (default: "0.0.0.0:8080").
    pub listen_addr: String,

    /// Storage backend (default: memory).
    pub store_backend: StoreBackend,

    /// Path to `RocksDB` data directory (default: "/data/paygate").
    pub data_dir: String,

    /// HS256 secret for user tokens. Without it user endpoints reject everything.
    pub jwt_secret: Option<String>,

    /// Expected JWT audience (default: "paygate").
    pub jwt_audience: String,

    /// Service API key for service-to-service auth.
    pub service_api_key: Option<String>,

    /// Admin API key.
    pub admin_api_key: Option<String>,

    /// CORS allowed origins.
    pub cors_origins: Vec<String>,

    /// Maximum request body size in bytes.
    pub max_body_bytes: usize,

    /// Request timeout in seconds.
    pub request_timeout_seconds: u64,

    /// How long a request may wait for an account's lock.
    pub lock_timeout_ms: u64,

    /// Pricing used until an administrator saves a policy.
    pub default_pricing: PricingPolicy,
}

impl ServiceConfig {
    /// Load configuration from environment variables.
    #[must_use]
    pub fn from_env() -> Self {
        let defaults = Self::default();

        let operation_cost_micros = std::env::var("DEFAULT_OPERATION_COST_USD")
            .ok()
            .and_then(|s| s.parse::<f64>().ok())
            .map_or(DEFAULT_OPERATION_COST_MICROS, usd_to_micros);
        let free_operations_monthly = env_parse("FREE_OPERATIONS_MONTHLY")
            .unwrap_or(DEFAULT_FREE_OPERATIONS_MONTHLY);

        Self {
            listen_addr: std::env::var("LISTEN_ADDR").unwrap_or(defaults.listen_addr),
            store_backend: std::env::var("STORE_BACKEND")
                .map_or(defaults.store_backend, |v| StoreBackend::from_env_value(&v)),
            data_dir: std::env::var("DATA_DIR").unwrap_or(defaults.data_dir),
            jwt_secret: std::env::var("JWT_SECRET").ok().filter(|s| !s.is_empty()),
            jwt_audience: std::env::var("JWT_AUDIENCE").unwrap_or(defaults.jwt_audience),
            service_api_key: std::env::var("SERVICE_API_KEY").ok().filter(|s| !s.is_empty()),
            admin_api_key: std::env::var("ADMIN_API_KEY").ok().filter(|s| !s.is_empty()),
            cors_origins: std::env::var("CORS_ORIGINS")
                .unwrap_or_else(|_| "*".into())
                .split(',')
                .map(|s| s.trim().to_string())
                .collect(),
            max_body_bytes: env_parse("MAX_BODY_BYTES").unwrap_or(defaults.max_body_bytes),
            request_timeout_seconds: env_parse("REQUEST_TIMEOUT_SECONDS")
                .unwrap_or(defaults.request_timeout_seconds),
            lock_timeout_ms: env_parse("LOCK_TIMEOUT_MS").unwrap_or(defaults.lock_timeout_ms),
            default_pricing: PricingPolicy::new(operation_cost_micros, free_operations_monthly),
        }
    }

    /// Lock wait bound as a `Duration`.
    #[must_use]
    pub fn lock_timeout(&self) -> Duration {
        Duration::from_millis(self.lock_timeout_ms)
    }
}

fn env_parse<T: std::str::FromStr>(name: &str) -> Option<T> {
    std::env::var(name).ok().and_then(|s| s.trim().parse().ok())
}

impl Default for ServiceConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".into(),
            store_backend: StoreBackend::Memory,
            data_dir: "/data/paygate".into(),
            jwt_secret: None,
            jwt_audience: "paygate".into(),
            service_api_key: None,
            admin_api_key: None,
            cors_origins: vec!["*".into()],
            max_body_bytes: 1024 * 1024,
            request_timeout_seconds: 30,
            lock_timeout_ms: 5_000,
            default_pricing: PricingPolicy::default(),
        }
    }
}
