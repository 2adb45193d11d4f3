//! OAuth client-credentials token exchange

use crate::driver::WarehouseError;
use base64::prelude::*;
use serde::Deserialize;

/// Token endpoint response
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct TokenResponse {
    /// Bearer token
    pub access_token: Option<String>,

    /// Token type (usually "Bearer")
    #[serde(default)]
    pub token_type: Option<String>,

    /// Lifetime in seconds
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl TokenResponse {
    /// Parse a token response body
    ///
    /// A body without `access_token` is a token exchange failure.
    pub fn parse(body: &str) -> Result<String, WarehouseError> {
        let response: TokenResponse = serde_json::from_str(body)
            .map_err(|e| WarehouseError::TokenExchange(format!("Malformed token response: {}", e)))?;

        response
            .access_token
            .filter(|token| !token.is_empty())
            .ok_or_else(|| WarehouseError::TokenExchange("Token response has no access_token".to_string()))
    }
}

/// Exchanges client credentials for an access token
#[async_trait::async_trait]
pub trait TokenExchanger: Send + Sync {
    /// Run the client-credentials grant and return the access token
    async fn exchange(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String, WarehouseError>;
}

/// HTTP token client for the client-credentials grant
#[derive(Debug, Clone, Default)]
pub struct OAuthTokenClient {
    client: reqwest::Client,
}

impl OAuthTokenClient {
    /// Create a token client with a fresh HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a token client sharing an existing HTTP client
    pub fn with_client(client: reqwest::Client) -> Self {
        Self { client }
    }

    /// `Basic base64(client_id:client_secret)`
    pub fn basic_authorization(client_id: &str, client_secret: &str) -> String {
        format!("Basic {}", BASE64_STANDARD.encode(format!("{}:{}", client_id, client_secret)))
    }

    /// `grant_type=client_credentials&scope=<url-encoded scope>`
    pub fn request_body(scope: &str) -> String {
        format!("grant_type=client_credentials&scope={}", urlencoding::encode(scope))
    }

    /// Build the token request without sending it
    pub fn build_request(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<reqwest::Request, WarehouseError> {
        self.client
            .post(token_endpoint)
            .header(reqwest::header::AUTHORIZATION, Self::basic_authorization(client_id, client_secret))
            .header(reqwest::header::CONTENT_TYPE, "application/x-www-form-urlencoded")
            .header(reqwest::header::ACCEPT, "application/json")
            .body(Self::request_body(scope))
            .build()
            .map_err(|e| WarehouseError::TokenExchange(format!("Invalid token request: {}", e)))
    }
}

#[async_trait::async_trait]
impl TokenExchanger for OAuthTokenClient {
    async fn exchange(
        &self,
        token_endpoint: &str,
        client_id: &str,
        client_secret: &str,
        scope: &str,
    ) -> Result<String, WarehouseError> {
        let request = self.build_request(token_endpoint, client_id, client_secret, scope)?;

        let response = self
            .client
            .execute(request)
            .await
            .map_err(|e| WarehouseError::TokenExchange(format!("Token request to {} failed: {}", token_endpoint, e)))?;

        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WarehouseError::TokenExchange(format!("Cannot read token response: {}", e)))?;

        if !status.is_success() {
            return Err(WarehouseError::TokenExchange(format!(
                "Token endpoint returned {}: {}",
                status, body
            )));
        }

        TokenResponse::parse(&body)
    }
}
