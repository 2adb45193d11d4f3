//! Warehouse driver traits and connection options

use querybridge_core::Row;
use std::fmt;
use std::sync::Arc;

/// Resolved authentication material for one connection attempt
#[derive(Clone, PartialEq, Eq)]
pub enum Authenticator {
    /// Native username/password
    Native { password: String },

    /// Key-pair (JWT) authentication with a PEM private key
    KeyPairJwt { private_key_pem: String },

    /// OAuth bearer token
    OAuth { token: String },
}

impl Authenticator {
    /// Warehouse authenticator name
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Native { .. } => "SNOWFLAKE",
            Self::KeyPairJwt { .. } => "SNOWFLAKE_JWT",
            Self::OAuth { .. } => "OAUTH",
        }
    }
}

impl fmt::Debug for Authenticator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}(<redacted>)", self.as_str())
    }
}

/// Everything a driver needs to open a connection
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectOptions {
    /// Account identifier
    pub account: String,

    /// Host for HTTP APIs of the account
    pub host: String,

    /// Application name
    pub application: String,

    /// Warehouse user
    pub username: String,

    /// Virtual warehouse
    pub warehouse: String,

    /// Default database
    pub database: String,

    /// Default schema
    pub schema: String,

    /// Role to assume
    pub role: Option<String>,

    /// Authentication material
    pub authenticator: Authenticator,
}

/// Errors raised by the connection layer
#[derive(Debug, Clone, thiserror::Error)]
pub enum WarehouseError {
    #[error("Secret retrieval failed: {0}")]
    SecretRetrieval(String),

    #[error("Token exchange failed: {0}")]
    TokenExchange(String),

    #[error("Connection failed: {0}")]
    Connection(String),

    #[error("Execution failed: {0}")]
    Execution(String),

    #[error("Configuration error: {0}")]
    Config(String),
}

/// An open warehouse connection
#[async_trait::async_trait]
pub trait WarehouseConnection: Send + Sync {
    /// Check the connection is still usable
    async fn is_valid(&self) -> bool;

    /// Execute one statement
    ///
    /// Returns `None` when the statement produced no row set.
    async fn execute(&self, sql: &str) -> Result<Option<Vec<Row>>, WarehouseError>;
}

/// Factory for warehouse connections
#[async_trait::async_trait]
pub trait WarehouseDriver: Send + Sync {
    /// Get the driver name (e.g., "Snowflake")
    fn name(&self) -> &'static str;

    /// Open a connection with the resolved options
    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn WarehouseConnection>, WarehouseError>;
}

/// Anything that can run SQL against the warehouse
///
/// The indexer and the query handler depend on this rather than on a
/// concrete connection manager.
#[async_trait::async_trait]
pub trait SqlExecutor: Send + Sync {
    /// Execute one statement on a live connection
    async fn execute(&self, sql: &str) -> Result<Option<Vec<Row>>, WarehouseError>;
}
