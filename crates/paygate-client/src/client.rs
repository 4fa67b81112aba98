//! Paygate HTTP client implementation.

use reqwest::Client;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::time::Duration;

use paygate_core::UserId;

use crate::error::ClientError;
use crate::types::{
    ApiErrorResponse, AuthorizeResponse, ChargeRequest, KeyRequest, OperationResponse,
    ValidateKeyResponse,
};

const SERVICE_KEY_HEADER: &str = "x-service-key";

/// Paygate API client.
///
/// Authenticates with the service key; customer keys travel in the body.
#[derive(Debug, Clone)]
pub struct PaygateClient {
    client: Client,
    base_url: String,
    service_key: String,
}

impl PaygateClient {
    /// Create a new paygate client.
    ///
    /// # Arguments
    ///
    /// * `base_url` - Base URL of the paygate service (e.g., `"http://paygate:8080"`)
    /// * `service_key` - Service key for authentication
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
    ) -> Result<Self, ClientError> {
        Self::with_options(base_url, service_key, ClientOptions::default())
    }

    /// Create a new paygate client with custom options.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built or the
    /// service key is empty.
    pub fn with_options(
        base_url: impl Into<String>,
        service_key: impl Into<String>,
        options: ClientOptions,
    ) -> Result<Self, ClientError> {
        let service_key = service_key.into();
        if service_key.is_empty() {
            return Err(ClientError::Configuration("service key is empty".into()));
        }

        let client = Client::builder()
            .timeout(Duration::from_secs(options.timeout_seconds))
            .build()?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            service_key,
        })
    }

    /// Charge one operation for a known user.
    ///
    /// A refusal comes back as `success: false`, not as an error.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn process_operation(
        &self,
        user_id: UserId,
        operation: impl Into<String>,
    ) -> Result<OperationResponse, ClientError> {
        let request = ChargeRequest {
            user_id,
            operation: operation.into(),
        };
        self.post("/v1/operations/charge", &request).await
    }

    /// Check a customer key without charging.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn validate_key(
        &self,
        api_key: Option<&str>,
        operation: impl Into<String>,
    ) -> Result<ValidateKeyResponse, ClientError> {
        let request = KeyRequest {
            api_key: api_key.map(str::to_string),
            operation: operation.into(),
        };
        self.post("/v1/keys/validate", &request).await
    }

    /// Check a customer key and charge the operation in one step.
    ///
    /// # Errors
    ///
    /// Returns an error if the request fails or the server returns an error.
    pub async fn authorize_and_charge(
        &self,
        api_key: Option<&str>,
        operation: impl Into<String>,
    ) -> Result<AuthorizeResponse, ClientError> {
        let request = KeyRequest {
            api_key: api_key.map(str::to_string),
            operation: operation.into(),
        };
        self.post("/v1/operations/authorize", &request).await
    }

    async fn post<B: Serialize, T: DeserializeOwned>(
        &self,
        path: &str,
        body: &B,
    ) -> Result<T, ClientError> {
        let url = format!("{}{path}", self.base_url);

        let response = self
            .client
            .post(&url)
            .header(SERVICE_KEY_HEADER, &self.service_key)
            .json(body)
            .send()
            .await?;

        self.handle_response(response).await
    }

    /// Handle API response and convert errors.
    async fn handle_response<T: DeserializeOwned>(
        &self,
        response: reqwest::Response,
    ) -> Result<T, ClientError> {
        let status = response.status();

        if status.is_success() {
            let bytes = response.bytes().await?;
            return Ok(serde_json::from_slice(&bytes)?);
        }

        // Try to parse error response
        let error_body: Result<ApiErrorResponse, _> = response.json().await;

        match error_body {
            Ok(api_error) => {
                let code = api_error.error.code.as_str();
                let message = api_error.error.message;
                tracing::debug!(code, status = status.as_u16(), "paygate returned an error");

                match code {
                    "transaction_conflict" => Err(ClientError::Retryable { message }),
                    "not_found" if message.starts_with("account not found") => {
                        Err(ClientError::AccountNotFound {
                            user_id: message.replace("account not found: ", ""),
                        })
                    }
                    _ => Err(ClientError::Api {
                        code: code.to_string(),
                        message,
                        status: status.as_u16(),
                    }),
                }
            }
            Err(_) => Err(ClientError::Api {
                code: "unknown".to_string(),
                message: format!("HTTP {status}"),
                status: status.as_u16(),
            }),
        }
    }
}

/// Client options for customization.
#[derive(Debug, Clone)]
pub struct ClientOptions {
    /// Request timeout in seconds (default: 10).
    pub timeout_seconds: u64,
}

impl Default for ClientOptions {
    fn default() -> Self {
        Self { timeout_seconds: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn client_trims_trailing_slash() {
        let client = PaygateClient::new("http://localhost:8080/", "key").unwrap();
        assert_eq!(client.base_url, "http://localhost:8080");
    }

    #[test]
    fn empty_service_key_is_rejected() {
        assert!(matches!(
            PaygateClient::new("http://localhost:8080", ""),
            Err(ClientError::Configuration(_))
        ));
    }
}
