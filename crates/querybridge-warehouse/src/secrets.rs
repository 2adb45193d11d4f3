//! Secret stores
//!
//! A secret store maps a secret name to a set of key/value pairs. The
//! connection manager reads exactly one key per (re)connection.

use crate::driver::WarehouseError;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

/// Source of secret values
#[async_trait::async_trait]
pub trait SecretStore: Send + Sync {
    /// Get the secret stored under `name`
    ///
    /// Returns `Ok(None)` when the store has no such secret.
    async fn get_secret(&self, name: &str) -> Result<Option<HashMap<String, String>>, WarehouseError>;
}

/// In-memory secret store
///
/// Counts reads so callers can check how often secrets were fetched.
#[derive(Default, Clone)]
pub struct MemorySecretStore {
    secrets: Arc<RwLock<HashMap<String, HashMap<String, String>>>>,
    reads: Arc<AtomicUsize>,
}

impl MemorySecretStore {
    /// Create an empty store
    pub fn new() -> Self {
        Self::default()
    }

    /// Store a single key under a secret name
    pub async fn insert(&self, name: impl Into<String>, key: impl Into<String>, value: impl Into<String>) {
        self.secrets
            .write()
            .await
            .entry(name.into())
            .or_default()
            .insert(key.into(), value.into());
    }

    /// Number of `get_secret` calls so far
    pub fn read_count(&self) -> usize {
        self.reads.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl SecretStore for MemorySecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<HashMap<String, String>>, WarehouseError> {
        self.reads.fetch_add(1, Ordering::SeqCst);
        Ok(self.secrets.read().await.get(name).cloned())
    }
}

/// Secret store backed by a JSON file of `{name: {key: value}}`
///
/// The file is re-read on every call so rotated secrets are picked up on
/// the next reconnect.
pub struct JsonFileSecretStore {
    path: PathBuf,
}

impl JsonFileSecretStore {
    /// Create a store reading from `path`
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }
}

#[async_trait::async_trait]
impl SecretStore for JsonFileSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<HashMap<String, String>>, WarehouseError> {
        let contents = tokio::fs::read_to_string(&self.path).await.map_err(|e| {
            WarehouseError::SecretRetrieval(format!("Cannot read {}: {}", self.path.display(), e))
        })?;

        let mut secrets: HashMap<String, HashMap<String, String>> = serde_json::from_str(&contents)
            .map_err(|e| {
                WarehouseError::SecretRetrieval(format!("Invalid secrets file {}: {}", self.path.display(), e))
            })?;

        Ok(secrets.remove(name))
    }
}

/// Secret store backed by environment variables
///
/// A secret `name` with key `key` is looked up as `<PREFIX><NAME>_<KEY>`,
/// where name and key are upper-cased and every non-alphanumeric character
/// becomes `_`. A variable `<PREFIX><NAME>` holding a JSON object is also
/// accepted and provides all keys at once.
pub struct EnvSecretStore {
    prefix: String,
    keys: Vec<String>,
}

impl EnvSecretStore {
    /// Create a store for the given variable prefix
    ///
    /// `keys` lists the keys probed as individual variables.
    pub fn new(prefix: impl Into<String>, keys: Vec<String>) -> Self {
        Self {
            prefix: prefix.into(),
            keys,
        }
    }

    fn variable_name(&self, parts: &[&str]) -> String {
        let normalized: Vec<String> = parts
            .iter()
            .map(|part| {
                part.trim_matches('/')
                    .chars()
                    .map(|c| if c.is_ascii_alphanumeric() { c.to_ascii_uppercase() } else { '_' })
                    .collect()
            })
            .collect();
        format!("{}{}", self.prefix, normalized.join("_"))
    }
}

#[async_trait::async_trait]
impl SecretStore for EnvSecretStore {
    async fn get_secret(&self, name: &str) -> Result<Option<HashMap<String, String>>, WarehouseError> {
        if let Ok(json) = std::env::var(self.variable_name(&[name])) {
            let secret = serde_json::from_str(&json).map_err(|e| {
                WarehouseError::SecretRetrieval(format!("Secret '{}' is not a JSON object: {}", name, e))
            })?;
            return Ok(Some(secret));
        }

        let secret: HashMap<String, String> = self
            .keys
            .iter()
            .filter_map(|key| {
                std::env::var(self.variable_name(&[name, key]))
                    .ok()
                    .map(|value| (key.clone(), value))
            })
            .collect();

        Ok(if secret.is_empty() { None } else { Some(secret) })
    }
}
