//! Configuration schema (querybridge.toml or environment)

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use crate::credential::{Credential, CredentialError};

/// Warehouse connection settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WarehouseConfig {
    /// Account identifier (e.g. "xy12345.us-east-1")
    pub account: String,

    /// Override for the account host; defaults to `<account>.snowflakecomputing.com`
    #[serde(default)]
    pub host: Option<String>,

    /// Default database
    pub database: String,

    /// Default schema
    pub schema: String,

    /// Virtual warehouse / compute pool
    pub warehouse: String,

    /// Role to assume
    #[serde(default)]
    pub role: Option<String>,

    /// Application name reported to the warehouse
    #[serde(default = "default_application")]
    pub application: String,

    /// How to authenticate
    pub credential: Credential,
}

fn default_application() -> String {
    "querybridge".to_string()
}

impl WarehouseConfig {
    /// Host name for HTTP APIs of this account
    pub fn account_host(&self) -> String {
        self.host
            .clone()
            .unwrap_or_else(|| format!("{}.snowflakecomputing.com", self.account.to_lowercase()))
    }
}

/// Embedding backend settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EmbeddingsConfig {
    /// OpenAI-compatible embeddings base URL; local hashing embedder when unset
    #[serde(default)]
    pub endpoint: Option<String>,

    /// Embedding model name
    #[serde(default = "default_embeddings_model")]
    pub model: String,

    /// Vector size of the local hashing embedder
    #[serde(default = "default_dimensions")]
    pub dimensions: usize,
}

fn default_embeddings_model() -> String {
    "text-embedding-3-small".to_string()
}

fn default_dimensions() -> usize {
    512
}

impl Default for EmbeddingsConfig {
    fn default() -> Self {
        Self {
            endpoint: None,
            model: default_embeddings_model(),
            dimensions: default_dimensions(),
        }
    }
}

/// Vector index settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorStoreConfig {
    /// Index name
    #[serde(default = "default_index_name")]
    pub index_name: String,

    /// File the index is persisted to; in-memory only when unset
    #[serde(default)]
    pub path: Option<PathBuf>,

    /// Embedding backend
    #[serde(default)]
    pub embeddings: EmbeddingsConfig,
}

fn default_index_name() -> String {
    "table-metadata".to_string()
}

impl Default for VectorStoreConfig {
    fn default() -> Self {
        Self {
            index_name: default_index_name(),
            path: None,
            embeddings: EmbeddingsConfig::default(),
        }
    }
}

/// Language model settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Model identifier
    #[serde(default = "default_model_id")]
    pub model_id: String,

    /// Base URL of the model runtime
    #[serde(default = "default_model_endpoint")]
    pub endpoint: String,

    /// Upper bound on generated tokens
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
}

fn default_model_id() -> String {
    "anthropic.claude-3-haiku-20240307-v1:0".to_string()
}

fn default_model_endpoint() -> String {
    "https://bedrock-runtime.us-east-1.amazonaws.com".to_string()
}

fn default_max_tokens() -> u32 {
    3000
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            model_id: default_model_id(),
            endpoint: default_model_endpoint(),
            max_tokens: default_max_tokens(),
        }
    }
}

/// Secret store settings
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SecretsConfig {
    /// JSON file of `{name: {key: value}}`
    #[serde(default)]
    pub file: Option<PathBuf>,

    /// Prefix for environment-backed secrets
    #[serde(default)]
    pub env_prefix: Option<String>,
}

/// Query handler settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct HandlerConfig {
    /// Number of metadata documents retrieved per question
    #[serde(default = "default_top_k")]
    pub top_k: usize,

    /// Reject generated SQL that is not read-only
    #[serde(default = "default_true")]
    pub enforce_read_only: bool,
}

fn default_top_k() -> usize {
    10
}

fn default_true() -> bool {
    true
}

impl Default for HandlerConfig {
    fn default() -> Self {
        Self {
            top_k: default_top_k(),
            enforce_read_only: true,
        }
    }
}

/// Main configuration structure
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    /// Warehouse connection (required by every command that touches the warehouse)
    #[serde(default)]
    pub warehouse: Option<WarehouseConfig>,

    /// Vector index
    #[serde(default)]
    pub vector_store: VectorStoreConfig,

    /// Language model
    #[serde(default)]
    pub model: ModelConfig,

    /// Secret store
    #[serde(default)]
    pub secrets: SecretsConfig,

    /// Query handler
    #[serde(default)]
    pub handler: HandlerConfig,
}

impl Config {
    /// Load config from TOML file
    pub fn from_file(path: &std::path::Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Self::from_toml(&contents)
    }

    /// Load config from TOML string
    pub fn from_toml(toml: &str) -> Result<Self, ConfigError> {
        toml::from_str(toml)
            .map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Load config from process environment variables
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load config from an arbitrary key lookup
    ///
    /// The warehouse section is only built when `SNOWFLAKE_ACCOUNT` is set.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Config::default();

        if let Some(account) = lookup("SNOWFLAKE_ACCOUNT") {
            let require = |key: &str| {
                lookup(key).ok_or_else(|| ConfigError::MissingVariable(key.to_string()))
            };

            let credential = match lookup("SNOWFLAKE_AUTHENTICATION") {
                Some(json) => Credential::from_json(&json)?,
                None => Credential::username_password(
                    require("SNOWFLAKE_USER")?,
                    &require("SNOWFLAKE_PASSWORD_PARAMETER_NAME")?,
                )?,
            };

            config.warehouse = Some(WarehouseConfig {
                account,
                host: lookup("SNOWFLAKE_HOST"),
                database: require("SNOWFLAKE_DATABASE")?,
                schema: require("SNOWFLAKE_SCHEMA")?,
                warehouse: require("SNOWFLAKE_WAREHOUSE")?,
                role: lookup("SNOWFLAKE_ROLE"),
                application: lookup("SNOWFLAKE_APPLICATION").unwrap_or_else(default_application),
                credential,
            });
        }

        if let Some(path) = lookup("VECTOR_STORE_PATH") {
            config.vector_store.path = Some(PathBuf::from(path));
        }
        if let Some(index_name) = lookup("VECTOR_INDEX_NAME") {
            config.vector_store.index_name = index_name;
        }
        if let Some(endpoint) = lookup("EMBEDDINGS_ENDPOINT") {
            config.vector_store.embeddings.endpoint = Some(endpoint);
        }
        if let Some(model) = lookup("EMBEDDINGS_MODEL") {
            config.vector_store.embeddings.model = model;
        }

        if let Some(model_id) = lookup("MODEL_ID") {
            config.model.model_id = model_id;
        }
        if let Some(endpoint) = lookup("MODEL_ENDPOINT") {
            config.model.endpoint = endpoint;
        }
        if let Some(max_tokens) = lookup("MODEL_MAX_TOKENS") {
            config.model.max_tokens = parse_var("MODEL_MAX_TOKENS", &max_tokens)?;
        }

        config.secrets.file = lookup("SECRETS_FILE").map(PathBuf::from);
        config.secrets.env_prefix = lookup("SECRETS_ENV_PREFIX");

        if let Some(top_k) = lookup("TOP_K") {
            config.handler.top_k = parse_var("TOP_K", &top_k)?;
        }
        if let Some(enforce) = lookup("ENFORCE_READ_ONLY") {
            config.handler.enforce_read_only = parse_var("ENFORCE_READ_ONLY", &enforce)?;
        }

        Ok(config)
    }

    /// Save config to TOML file
    pub fn save_to_file(&self, path: &std::path::Path) -> Result<(), ConfigError> {
        let toml = toml::to_string_pretty(self)
            .map_err(|e| ConfigError::SerializeError(e.to_string()))?;

        std::fs::write(path, toml)
            .map_err(|e| ConfigError::IoError(e.to_string()))?;

        Ok(())
    }
}

fn parse_var<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, ConfigError> {
    value
        .trim()
        .parse()
        .map_err(|_| ConfigError::InvalidVariable(key.to_string(), value.to_string()))
}

/// Config error types
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Parse error: {0}")]
    ParseError(String),

    #[error("Serialize error: {0}")]
    SerializeError(String),

    #[error("Missing environment variable: {0}")]
    MissingVariable(String),

    #[error("Invalid value for {0}: '{1}'")]
    InvalidVariable(String, String),

    #[error(transparent)]
    Credential(#[from] CredentialError),
}
