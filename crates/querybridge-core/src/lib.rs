//! querybridge core
//!
//! Domain model shared by the indexer, the query handler and the
//! warehouse connection layer. Serialized shapes here are part of the
//! wire contract: the `{"results": "nothing"}` sentinel and the table
//! metadata JSON are read by callers and stored in the vector index.

pub mod metadata;
pub mod credential;
pub mod config;

pub use metadata::{TableMetadataDocument, ColumnMetadata, Row, QueryResults};
pub use credential::{Credential, CredentialError, OAuthClientCredentials, SecretLocator};
pub use config::{
    Config, ConfigError, WarehouseConfig, VectorStoreConfig, EmbeddingsConfig, ModelConfig,
    SecretsConfig, HandlerConfig,
};
