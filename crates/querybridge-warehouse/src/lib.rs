//! Warehouse connection and authentication layer
//!
//! This crate owns the single shared warehouse connection used by the
//! indexer and the query handler. It resolves secrets, performs the
//! per-credential handshake and revalidates the connection before every
//! statement.
//!
//! ## Features
//!
//! Enable warehouse support via Cargo features:
//! - `snowflake` - Snowflake support (password, key-pair and OAuth)
//!
//! ## Example
//!
//! ```rust,ignore
//! use querybridge_warehouse::{ConnectionManager, SnowflakeDriver, JsonFileSecretStore, SqlExecutor};
//!
//! let manager = ConnectionManager::new(
//!     config.warehouse.unwrap(),
//!     Arc::new(JsonFileSecretStore::new("secrets.json")),
//!     Arc::new(SnowflakeDriver::new()),
//! );
//! let rows = manager.execute("show tables").await?;
//! ```

pub mod driver;
pub mod secrets;
pub mod oauth;
pub mod manager;
pub mod snowflake;
pub mod mock;

pub use driver::{
    Authenticator, ConnectOptions, SqlExecutor, WarehouseConnection, WarehouseDriver, WarehouseError,
};
pub use secrets::{EnvSecretStore, JsonFileSecretStore, MemorySecretStore, SecretStore};
pub use oauth::{OAuthTokenClient, TokenExchanger, TokenResponse};
pub use manager::ConnectionManager;
pub use snowflake::SnowflakeDriver;
pub use mock::{MockConnection, MockDriver, MockDriverBuilder};
