//! Text embedders
//!
//! Two backends:
//! - [`HashingEmbedder`]: deterministic feature hashing over SHA-256 token
//!   digests. Needs no network and keeps exact identifiers (table and column
//!   names) strongly matchable.
//! - [`HttpEmbedder`]: an OpenAI-compatible `POST {base_url}/embeddings`
//!   endpoint.

use crate::error::VectorStoreError;
use serde::Deserialize;
use sha2::{Digest, Sha256};

/// Embedding vector
pub type Embedding = Vec<f32>;

/// Turns text into vectors
#[async_trait::async_trait]
pub trait Embedder: Send + Sync {
    /// Embed a batch of texts, one vector per input, in order
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, VectorStoreError>;

    /// Embed a single search query
    async fn embed_query(&self, query: &str) -> Result<Embedding, VectorStoreError> {
        self.embed(&[query.to_string()])
            .await?
            .pop()
            .ok_or_else(|| VectorStoreError::Embedding("Embedder returned no vector".to_string()))
    }
}

/// Feature-hashing embedder
#[derive(Debug, Clone)]
pub struct HashingEmbedder {
    dimensions: usize,
}

impl HashingEmbedder {
    pub fn new(dimensions: usize) -> Self {
        Self {
            dimensions: dimensions.max(1),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Lower-cased alphanumeric tokens of `text`
    fn tokens(text: &str) -> impl Iterator<Item = String> + '_ {
        text.split(|c: char| !c.is_alphanumeric() && c != '_')
            .filter(|token| !token.is_empty())
            .map(|token| token.to_lowercase())
    }

    /// Embed one text synchronously
    pub fn embed_text(&self, text: &str) -> Embedding {
        let mut vector = vec![0.0f32; self.dimensions];

        for token in Self::tokens(text) {
            let digest = Sha256::digest(token.as_bytes());
            let mut bucket_bytes = [0u8; 8];
            bucket_bytes.copy_from_slice(&digest[..8]);
            let bucket = (u64::from_le_bytes(bucket_bytes) % self.dimensions as u64) as usize;
            let sign = if digest[8] & 1 == 0 { 1.0 } else { -1.0 };
            vector[bucket] += sign;
        }

        let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
        if norm > 0.0 {
            vector.iter_mut().for_each(|v| *v /= norm);
        }
        vector
    }
}

#[async_trait::async_trait]
impl Embedder for HashingEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, VectorStoreError> {
        Ok(texts.iter().map(|text| self.embed_text(text)).collect())
    }
}

#[derive(Debug, Deserialize)]
struct EmbeddingsResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Debug, Deserialize)]
struct EmbeddingData {
    #[serde(default)]
    index: usize,
    embedding: Embedding,
}

/// OpenAI-compatible embeddings client
pub struct HttpEmbedder {
    client: reqwest::Client,
    base_url: String,
    model: String,
    api_key: Option<String>,
}

impl HttpEmbedder {
    pub fn new(base_url: impl Into<String>, model: impl Into<String>, api_key: Option<String>) -> Self {
        Self {
            client: reqwest::Client::new(),
            base_url: base_url.into().trim_end_matches('/').to_string(),
            model: model.into(),
            api_key,
        }
    }
}

#[async_trait::async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Embedding>, VectorStoreError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let body = serde_json::json!({
            "model": self.model,
            "input": texts,
        });

        let mut request = self.client.post(format!("{}/embeddings", self.base_url)).json(&body);
        if let Some(key) = &self.api_key {
            request = request.bearer_auth(key);
        }

        let response = request
            .send()
            .await
            .map_err(|e| VectorStoreError::Embedding(format!("Embedding API call failed: {}", e)))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response.text().await.unwrap_or_else(|_| "Unknown error".to_string());
            return Err(VectorStoreError::Embedding(format!(
                "Embedding API error ({}): {}",
                status, error_text
            )));
        }

        let mut parsed: EmbeddingsResponse = response
            .json()
            .await
            .map_err(|e| VectorStoreError::Embedding(format!("Failed to parse embedding response: {}", e)))?;

        if parsed.data.len() != texts.len() {
            return Err(VectorStoreError::Embedding(format!(
                "Expected {} embeddings, got {}",
                texts.len(),
                parsed.data.len()
            )));
        }

        parsed.data.sort_by_key(|item| item.index);
        Ok(parsed.data.into_iter().map(|item| item.embedding).collect())
    }
}
