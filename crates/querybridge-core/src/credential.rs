//! Warehouse credentials
//!
//! A credential names the principal and says where the secret lives; it
//! never carries the secret itself. The secret is resolved by the
//! connection layer at (re)connect time.

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

fn locator_pattern() -> &'static Regex {
    static PATTERN: OnceLock<Regex> = OnceLock::new();
    PATTERN.get_or_init(|| {
        Regex::new(r"^(?P<name>\S+)/(?P<key>[A-Za-z0-9_.\-]+)$").expect("locator pattern is valid")
    })
}

/// Location of a secret value: `store-name/key`
///
/// The store name may itself contain slashes (`/app/prod/password` is
/// store `/app/prod`, key `password`); the key is everything after the
/// last slash.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct SecretLocator {
    /// Secret name in the store
    pub name: String,

    /// Key within the secret
    pub key: String,
}

impl SecretLocator {
    /// Parse and validate a `name/key` locator
    pub fn parse(locator: &str) -> Result<Self, CredentialError> {
        let captures = locator_pattern()
            .captures(locator)
            .ok_or_else(|| CredentialError::InvalidLocator(locator.to_string()))?;

        Ok(Self {
            name: captures["name"].to_string(),
            key: captures["key"].to_string(),
        })
    }
}

impl fmt::Display for SecretLocator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.name, self.key)
    }
}

impl FromStr for SecretLocator {
    type Err = CredentialError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse(s)
    }
}

/// OAuth client-credentials grant parameters
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct OAuthClientCredentials {
    /// Warehouse user the token maps to
    pub principal: String,

    /// Where the client secret lives
    pub secret_locator: SecretLocator,

    /// Token endpoint URL
    pub token_endpoint: String,

    /// OAuth client id
    pub client_id: String,

    /// Requested scope
    pub scope: String,
}

/// Warehouse authentication strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "CredentialDescriptor", into = "CredentialDescriptor")]
pub enum Credential {
    /// Password read from the secret store
    UsernamePassword {
        principal: String,
        secret_locator: SecretLocator,
    },

    /// PEM private key read from the secret store
    KeyPair {
        principal: String,
        secret_locator: SecretLocator,
    },

    /// Bearer token obtained with the client-credentials grant
    OAuthClientCredentials(OAuthClientCredentials),
}

impl Credential {
    /// Username/password credential
    pub fn username_password(principal: impl Into<String>, locator: &str) -> Result<Self, CredentialError> {
        Ok(Self::UsernamePassword {
            principal: non_empty("principal", principal.into())?,
            secret_locator: SecretLocator::parse(locator)?,
        })
    }

    /// Key-pair credential
    pub fn key_pair(principal: impl Into<String>, locator: &str) -> Result<Self, CredentialError> {
        Ok(Self::KeyPair {
            principal: non_empty("principal", principal.into())?,
            secret_locator: SecretLocator::parse(locator)?,
        })
    }

    /// OAuth client-credentials credential
    pub fn oauth_client_credentials(
        principal: impl Into<String>,
        locator: &str,
        token_endpoint: impl Into<String>,
        client_id: impl Into<String>,
        scope: impl Into<String>,
    ) -> Result<Self, CredentialError> {
        Ok(Self::OAuthClientCredentials(OAuthClientCredentials {
            principal: non_empty("principal", principal.into())?,
            secret_locator: SecretLocator::parse(locator)?,
            token_endpoint: non_empty("token_endpoint", token_endpoint.into())?,
            client_id: non_empty("client_id", client_id.into())?,
            scope: scope.into(),
        }))
    }

    /// Parse the JSON descriptor form (e.g. from an environment variable)
    pub fn from_json(json: &str) -> Result<Self, CredentialError> {
        serde_json::from_str(json).map_err(|e| CredentialError::Descriptor(e.to_string()))
    }

    /// Warehouse user name
    pub fn principal(&self) -> &str {
        match self {
            Self::UsernamePassword { principal, .. } | Self::KeyPair { principal, .. } => principal,
            Self::OAuthClientCredentials(oauth) => &oauth.principal,
        }
    }

    /// Where the secret for this credential lives
    pub fn secret_locator(&self) -> &SecretLocator {
        match self {
            Self::UsernamePassword { secret_locator, .. } | Self::KeyPair { secret_locator, .. } => {
                secret_locator
            }
            Self::OAuthClientCredentials(oauth) => &oauth.secret_locator,
        }
    }

    /// Short strategy name for logs
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UsernamePassword { .. } => "username_password",
            Self::KeyPair { .. } => "key_pair",
            Self::OAuthClientCredentials(_) => "oauth_client_credentials",
        }
    }
}

fn non_empty(field: &'static str, value: String) -> Result<String, CredentialError> {
    if value.trim().is_empty() {
        Err(CredentialError::MissingField(field))
    } else {
        Ok(value)
    }
}

/// Serialized credential shape, tagged by `type`
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
enum CredentialDescriptor {
    #[serde(rename = "username_password")]
    UsernamePassword { principal: String, secret_locator: String },

    #[serde(rename = "key_pair")]
    KeyPair { principal: String, secret_locator: String },

    #[serde(rename = "oauth_client_credentials")]
    OAuthClientCredentials {
        principal: String,
        secret_locator: String,
        token_endpoint: String,
        client_id: String,
        scope: String,
    },
}

impl TryFrom<CredentialDescriptor> for Credential {
    type Error = CredentialError;

    fn try_from(descriptor: CredentialDescriptor) -> Result<Self, Self::Error> {
        match descriptor {
            CredentialDescriptor::UsernamePassword { principal, secret_locator } => {
                Credential::username_password(principal, &secret_locator)
            }
            CredentialDescriptor::KeyPair { principal, secret_locator } => {
                Credential::key_pair(principal, &secret_locator)
            }
            CredentialDescriptor::OAuthClientCredentials {
                principal,
                secret_locator,
                token_endpoint,
                client_id,
                scope,
            } => Credential::oauth_client_credentials(principal, &secret_locator, token_endpoint, client_id, scope),
        }
    }
}

impl From<Credential> for CredentialDescriptor {
    fn from(credential: Credential) -> Self {
        match credential {
            Credential::UsernamePassword { principal, secret_locator } => Self::UsernamePassword {
                principal,
                secret_locator: secret_locator.to_string(),
            },
            Credential::KeyPair { principal, secret_locator } => Self::KeyPair {
                principal,
                secret_locator: secret_locator.to_string(),
            },
            Credential::OAuthClientCredentials(oauth) => Self::OAuthClientCredentials {
                principal: oauth.principal,
                secret_locator: oauth.secret_locator.to_string(),
                token_endpoint: oauth.token_endpoint,
                client_id: oauth.client_id,
                scope: oauth.scope,
            },
        }
    }
}

/// Credential validation errors
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CredentialError {
    #[error("Invalid secret locator '{0}': expected 'name/key'")]
    InvalidLocator(String),

    #[error("Missing credential field: {0}")]
    MissingField(&'static str),

    #[error("Invalid credential descriptor: {0}")]
    Descriptor(String),
}
