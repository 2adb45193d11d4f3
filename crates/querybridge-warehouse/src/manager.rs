//! Lazily established, revalidated warehouse connection
//!
//! One `ConnectionManager` is shared (behind an `Arc`) by every handler in
//! the process. The first call resolves the credential's secret, performs
//! the strategy-specific handshake and caches the connection. Later calls
//! reuse it while it stays valid and rebuild it otherwise. Secrets and
//! tokens are fetched once per (re)connection, never per query.

use crate::driver::{Authenticator, ConnectOptions, SqlExecutor, WarehouseConnection, WarehouseDriver, WarehouseError};
use crate::oauth::{OAuthTokenClient, TokenExchanger};
use crate::secrets::SecretStore;
use querybridge_core::{Credential, Row, SecretLocator, WarehouseConfig};
use std::sync::Arc;
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

/// Owner of the shared warehouse connection
pub struct ConnectionManager {
    config: WarehouseConfig,
    secrets: Arc<dyn SecretStore>,
    driver: Arc<dyn WarehouseDriver>,
    tokens: Arc<dyn TokenExchanger>,

    /// Held across the liveness check and the rebuild so concurrent callers
    /// never race to replace the connection
    cached: Mutex<Option<Arc<dyn WarehouseConnection>>>,
}

impl ConnectionManager {
    /// Create a manager; no connection is opened until first use
    pub fn new(config: WarehouseConfig, secrets: Arc<dyn SecretStore>, driver: Arc<dyn WarehouseDriver>) -> Self {
        Self {
            config,
            secrets,
            driver,
            tokens: Arc::new(OAuthTokenClient::new()),
            cached: Mutex::new(None),
        }
    }

    /// Replace the OAuth token exchanger
    pub fn with_token_exchanger(mut self, tokens: Arc<dyn TokenExchanger>) -> Self {
        self.tokens = tokens;
        self
    }

    /// Warehouse settings this manager connects with
    pub fn config(&self) -> &WarehouseConfig {
        &self.config
    }

    /// Return a live connection, (re)connecting if needed
    pub async fn connection(&self) -> Result<Arc<dyn WarehouseConnection>, WarehouseError> {
        let mut cached = self.cached.lock().await;

        if let Some(connection) = cached.as_ref() {
            if connection.is_valid().await {
                return Ok(Arc::clone(connection));
            }
            warn!(driver = self.driver.name(), "Cached warehouse connection is no longer valid, reconnecting");
            *cached = None;
        }

        let options = self.resolve_options().await?;
        info!(
            driver = self.driver.name(),
            account = %options.account,
            user = %options.username,
            authenticator = options.authenticator.as_str(),
            "Connecting to warehouse"
        );

        let connection = self.driver.connect(&options).await?;
        info!(driver = self.driver.name(), "Connected to warehouse");

        *cached = Some(Arc::clone(&connection));
        Ok(connection)
    }

    /// Drop the cached connection; the next call reconnects
    pub async fn invalidate(&self) {
        self.cached.lock().await.take();
    }

    /// Run a trivial statement to verify connectivity
    pub async fn test_connection(&self) -> Result<(), WarehouseError> {
        self.execute("SELECT 1").await.map(|_| ())
    }

    /// Build driver options for the configured credential
    ///
    /// Reads the secret store once, and for OAuth performs one token
    /// exchange.
    pub async fn resolve_options(&self) -> Result<ConnectOptions, WarehouseError> {
        let credential = &self.config.credential;
        debug!(strategy = credential.kind(), locator = %credential.secret_locator(), "Resolving credential");

        let secret = self.read_secret(credential.secret_locator()).await?;

        let authenticator = match credential {
            Credential::UsernamePassword { .. } => Authenticator::Native { password: secret },
            Credential::KeyPair { .. } => Authenticator::KeyPairJwt { private_key_pem: secret },
            Credential::OAuthClientCredentials(oauth) => {
                let token = self
                    .tokens
                    .exchange(&oauth.token_endpoint, &oauth.client_id, &secret, &oauth.scope)
                    .await?;
                Authenticator::OAuth { token }
            }
        };

        Ok(ConnectOptions {
            account: self.config.account.clone(),
            host: self.config.account_host(),
            application: self.config.application.clone(),
            username: credential.principal().to_string(),
            warehouse: self.config.warehouse.clone(),
            database: self.config.database.clone(),
            schema: self.config.schema.clone(),
            role: self.config.role.clone(),
            authenticator,
        })
    }

    async fn read_secret(&self, locator: &SecretLocator) -> Result<String, WarehouseError> {
        let secret = self.secrets.get_secret(&locator.name).await?.ok_or_else(|| {
            WarehouseError::SecretRetrieval(format!("No secret named '{}'", locator.name))
        })?;

        secret
            .get(&locator.key)
            .filter(|value| !value.is_empty())
            .cloned()
            .ok_or_else(|| WarehouseError::SecretRetrieval(format!("Secret '{}' has no value", locator)))
    }
}

#[async_trait::async_trait]
impl SqlExecutor for ConnectionManager {
    async fn execute(&self, sql: &str) -> Result<Option<Vec<Row>>, WarehouseError> {
        let connection = self.connection().await?;

        if !connection.is_valid().await {
            return Err(WarehouseError::Connection("Connection is not valid".to_string()));
        }

        debug!(sql, "Executing statement");
        connection.execute(sql).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mock::MockDriver;
    use crate::secrets::MemorySecretStore;

    fn config(credential: Credential) -> WarehouseConfig {
        WarehouseConfig {
            account: "acct".to_string(),
            host: None,
            database: "IMDB".to_string(),
            schema: "PUBLIC".to_string(),
            warehouse: "TEST_WH".to_string(),
            role: Some("ANALYST".to_string()),
            application: "TextToSql".to_string(),
            credential,
        }
    }

    #[tokio::test]
    async fn resolves_password_options() {
        let secrets = MemorySecretStore::new();
        secrets.insert("/app", "password", "pw").await;

        let manager = ConnectionManager::new(
            config(Credential::username_password("developer", "/app/password").unwrap()),
            Arc::new(secrets.clone()),
            Arc::new(MockDriver::new()),
        );

        let options = manager.resolve_options().await.unwrap();
        assert_eq!(options.authenticator, Authenticator::Native { password: "pw".to_string() });
        assert_eq!(options.username, "developer");
        assert_eq!(options.host, "acct.snowflakecomputing.com");
        assert_eq!(options.role.as_deref(), Some("ANALYST"));
        assert_eq!(secrets.read_count(), 1);
    }

    #[tokio::test]
    async fn missing_secret_name() {
        let manager = ConnectionManager::new(
            config(Credential::key_pair("developer", "/app/private-key").unwrap()),
            Arc::new(MemorySecretStore::new()),
            Arc::new(MockDriver::new()),
        );

        let result = manager.connection().await;
        assert!(matches!(result, Err(WarehouseError::SecretRetrieval(_))));
    }

    #[tokio::test]
    async fn missing_secret_key() {
        let secrets = MemorySecretStore::new();
        secrets.insert("/app", "password", "pw").await;

        let manager = ConnectionManager::new(
            config(Credential::key_pair("developer", "/app/private-key").unwrap()),
            Arc::new(secrets),
            Arc::new(MockDriver::new()),
        );

        let result = manager.resolve_options().await;
        assert!(matches!(result, Err(WarehouseError::SecretRetrieval(msg)) if msg.contains("/app/private-key")));
    }
}
