//! Common test utilities for paygate integration tests.

#![allow(dead_code)] // Some utilities are used by different test files

use std::sync::Arc;

use axum::Router;
use axum_test::TestServer;
use serde_json::{json, Value};

use paygate_core::UserId;
use paygate_service::auth::sign_user_token;
use paygate_service::{create_router, AppState, ServiceConfig, StoreBackend};
use paygate_store::MemoryStore;

pub const JWT_SECRET: &str = "test-jwt-secret";
pub const SERVICE_KEY: &str = "test-service-key";
pub const ADMIN_KEY: &str = "test-admin-key";

/// Test harness containing everything needed for integration tests.
pub struct TestHarness {
    /// The test server for making HTTP requests.
    pub server: TestServer,
    /// The state behind the server, for direct assertions.
    pub state: AppState,
    /// The store behind the server.
    pub store: Arc<MemoryStore>,
    /// A test user ID for authenticated requests.
    pub test_user_id: UserId,
}

/// Service configuration used by every test.
pub fn test_config() -> ServiceConfig {
    ServiceConfig {
        listen_addr: "127.0.0.1:0".into(),
        store_backend: StoreBackend::Memory,
        data_dir: String::new(),
        jwt_secret: Some(JWT_SECRET.into()),
        jwt_audience: "paygate".into(),
        service_api_key: Some(SERVICE_KEY.into()),
        admin_api_key: Some(ADMIN_KEY.into()),
        cors_origins: vec!["*".into()],
        max_body_bytes: 1024 * 1024,
        request_timeout_seconds: 30,
        lock_timeout_ms: 2_000,
        default_pricing: paygate_core::PricingPolicy::default(),
    }
}

impl TestHarness {
    /// Create a new test harness with a fresh store.
    pub fn new() -> Self {
        let store = Arc::new(MemoryStore::new());
        let state = AppState::new(store.clone(), test_config());
        let router: Router = create_router(state.clone());

        let server = TestServer::new(router).expect("Failed to create test server");

        Self {
            server,
            state,
            store,
            test_user_id: UserId::generate(),
        }
    }

    /// Get the authorization header for the test user.
    pub fn user_auth_header(&self) -> String {
        Self::auth_header_for(&self.test_user_id)
    }

    /// Get the authorization header for any user.
    pub fn auth_header_for(user_id: &UserId) -> String {
        let token = sign_user_token(user_id, JWT_SECRET, "paygate", 3600).expect("sign token");
        format!("Bearer {token}")
    }

    /// Register the test user's account.
    pub async fn register(&self) {
        self.server
            .post("/v1/accounts")
            .add_header("authorization", self.user_auth_header())
            .await
            .assert_status(axum::http::StatusCode::CREATED);
    }

    /// Deposit `amount_usd` for the test user and confirm it via webhook.
    pub async fn fund(&self, amount_usd: f64, reference: &str) {
        self.server
            .post("/v1/deposits")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "amount_usd": amount_usd, "payment_reference": reference }))
            .await
            .assert_status(axum::http::StatusCode::CREATED);

        self.server
            .post("/webhooks/payments")
            .json(&capture_event("PAYMENT.CAPTURE.COMPLETED", reference))
            .await
            .assert_status_ok();
    }

    /// Issue a key for the test user and return its secret.
    pub async fn issue_key(&self, permissions: Value) -> String {
        let response = self
            .server
            .post("/v1/keys")
            .add_header("authorization", self.user_auth_header())
            .json(&json!({ "name": "test", "permissions": permissions }))
            .await;
        response.assert_status(axum::http::StatusCode::CREATED);
        let body: Value = response.json();
        body["secret"].as_str().expect("secret").to_string()
    }

    /// Charge `operation` for the test user through the service endpoint.
    pub async fn charge(&self, operation: &str) -> Value {
        let response = self
            .server
            .post("/v1/operations/charge")
            .add_header("x-service-key", SERVICE_KEY)
            .json(&json!({ "user_id": self.test_user_id, "operation": operation }))
            .await;
        response.assert_status_ok();
        response.json()
    }
}

impl Default for TestHarness {
    fn default() -> Self {
        Self::new()
    }
}

/// A PayPal-style capture event referencing `order_id`.
pub fn capture_event(event_type: &str, order_id: &str) -> Value {
    json!({
        "id": format!("WH-{event_type}-{order_id}"),
        "event_type": event_type,
        "resource_type": "capture",
        "resource": {
            "id": format!("CAP-{order_id}"),
            "supplementary_data": { "related_ids": { "order_id": order_id } }
        }
    })
}
