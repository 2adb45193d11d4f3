//! Vector index of metadata documents
//!
//! [`InMemoryVectorStore`] keeps every document with its embedding and
//! answers queries with an exact cosine-similarity scan. When opened with a
//! path it loads the index from a JSON file and rewrites the file after
//! every bulk add, so an index built by one invocation is visible to the
//! next.
//!
//! Documents are never deduplicated: adding the same text twice stores two
//! copies.

use crate::embedder::{Embedder, Embedding};
use crate::error::VectorStoreError;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info};

/// Document in the vector index
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    /// Assigned by the store when empty
    #[serde(default)]
    pub id: String,

    /// Text that is embedded and handed back on retrieval
    pub page_content: String,

    #[serde(default)]
    pub metadata: HashMap<String, String>,
}

impl Document {
    pub fn new(page_content: impl Into<String>) -> Self {
        Self {
            id: String::new(),
            page_content: page_content.into(),
            metadata: HashMap::new(),
        }
    }

    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }
}

/// Similarity-searchable document index
#[async_trait::async_trait]
pub trait VectorStore: Send + Sync {
    /// Return up to `k` documents most similar to `query`, best first
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>, VectorStoreError>;

    /// Embed and store documents, returning their ids
    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>, VectorStoreError>;
}

#[derive(Debug, Clone, Serialize, Deserialize)]
struct StoredDocument {
    document: Document,
    embedding: Embedding,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct IndexFile {
    index_name: String,
    documents: Vec<StoredDocument>,
}

/// In-memory vector store with optional JSON persistence
pub struct InMemoryVectorStore {
    index_name: String,
    embedder: Arc<dyn Embedder>,
    path: Option<PathBuf>,
    documents: RwLock<Vec<StoredDocument>>,
}

impl InMemoryVectorStore {
    /// Create an empty, non-persistent store
    pub fn new(index_name: impl Into<String>, embedder: Arc<dyn Embedder>) -> Self {
        Self {
            index_name: index_name.into(),
            embedder,
            path: None,
            documents: RwLock::new(Vec::new()),
        }
    }

    /// Open a store persisted at `path`
    ///
    /// A missing file yields an empty index; the file is created on the
    /// first add.
    pub async fn open(
        index_name: impl Into<String>,
        embedder: Arc<dyn Embedder>,
        path: impl Into<PathBuf>,
    ) -> Result<Self, VectorStoreError> {
        let index_name = index_name.into();
        let path = path.into();
        let documents = Self::load(&path).await?;

        info!(index = %index_name, path = %path.display(), documents = documents.len(), "Opened vector index");

        Ok(Self {
            index_name,
            embedder,
            path: Some(path),
            documents: RwLock::new(documents),
        })
    }

    pub fn index_name(&self) -> &str {
        &self.index_name
    }

    /// Number of stored documents
    pub async fn len(&self) -> usize {
        self.documents.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    async fn load(path: &Path) -> Result<Vec<StoredDocument>, VectorStoreError> {
        let contents = match tokio::fs::read_to_string(path).await {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(VectorStoreError::Io(format!("Cannot read {}: {}", path.display(), e))),
        };

        let file: IndexFile = serde_json::from_str(&contents)
            .map_err(|e| VectorStoreError::Serialization(format!("Invalid index file {}: {}", path.display(), e)))?;
        Ok(file.documents)
    }

    async fn save(&self, documents: &[StoredDocument]) -> Result<(), VectorStoreError> {
        let Some(path) = &self.path else {
            return Ok(());
        };

        let file = IndexFile {
            index_name: self.index_name.clone(),
            documents: documents.to_vec(),
        };
        let json = serde_json::to_string(&file).map_err(|e| VectorStoreError::Serialization(e.to_string()))?;

        if let Some(parent) = path.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .map_err(|e| VectorStoreError::Io(format!("Cannot create {}: {}", parent.display(), e)))?;
        }
        tokio::fs::write(path, json)
            .await
            .map_err(|e| VectorStoreError::Io(format!("Cannot write {}: {}", path.display(), e)))
    }

    fn document_id(content: &str, sequence: usize) -> String {
        let digest = hex::encode(Sha256::digest(content.as_bytes()));
        format!("{}-{}", &digest[..16], sequence)
    }
}

/// Cosine similarity; zero when either vector is all zeros
fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b = b.iter().map(|x| x * x).sum::<f32>().sqrt();

    if norm_a == 0.0 || norm_b == 0.0 {
        0.0
    } else {
        dot / (norm_a * norm_b)
    }
}

#[async_trait::async_trait]
impl VectorStore for InMemoryVectorStore {
    async fn similarity_search(&self, query: &str, k: usize) -> Result<Vec<Document>, VectorStoreError> {
        let documents = self.documents.read().await;
        if documents.is_empty() || k == 0 {
            return Ok(Vec::new());
        }

        let query_embedding = self.embedder.embed_query(query).await?;

        let mut scored = Vec::with_capacity(documents.len());
        for stored in documents.iter() {
            if stored.embedding.len() != query_embedding.len() {
                return Err(VectorStoreError::Dimension(format!(
                    "query has {} dimensions, document {} has {}",
                    query_embedding.len(),
                    stored.document.id,
                    stored.embedding.len()
                )));
            }
            scored.push((cosine_similarity(&query_embedding, &stored.embedding), &stored.document));
        }

        // Stable sort keeps insertion order among equal scores
        scored.sort_by(|a, b| b.0.partial_cmp(&a.0).unwrap_or(std::cmp::Ordering::Equal));

        debug!(index = %self.index_name, k, candidates = scored.len(), "Similarity search");
        Ok(scored.into_iter().take(k).map(|(_, document)| document.clone()).collect())
    }

    async fn add_documents(&self, documents: Vec<Document>) -> Result<Vec<String>, VectorStoreError> {
        if documents.is_empty() {
            return Ok(Vec::new());
        }

        let texts: Vec<String> = documents.iter().map(|d| d.page_content.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;
        if embeddings.len() != documents.len() {
            return Err(VectorStoreError::Embedding(format!(
                "Expected {} embeddings, got {}",
                documents.len(),
                embeddings.len()
            )));
        }

        let mut stored = self.documents.write().await;
        let mut ids = Vec::with_capacity(documents.len());
        let mut next = stored.clone();

        for (mut document, embedding) in documents.into_iter().zip(embeddings) {
            if document.id.is_empty() {
                document.id = Self::document_id(&document.page_content, next.len());
            }
            ids.push(document.id.clone());
            next.push(StoredDocument { document, embedding });
        }

        // Memory only changes once the file holds the batch
        self.save(&next).await?;
        *stored = next;
        info!(index = %self.index_name, added = ids.len(), total = stored.len(), "Added documents to vector index");

        Ok(ids)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::embedder::HashingEmbedder;

    fn store() -> InMemoryVectorStore {
        InMemoryVectorStore::new("test", Arc::new(HashingEmbedder::new(128)))
    }

    #[test]
    fn cosine_of_zero_vector() {
        assert_eq!(cosine_similarity(&[0.0, 0.0], &[1.0, 0.0]), 0.0);
        assert!((cosine_similarity(&[1.0, 0.0], &[2.0, 0.0]) - 1.0).abs() < 1e-6);
    }

    #[tokio::test]
    async fn empty_store_has_no_hits() {
        let hits = store().similarity_search("anything", 10).await.unwrap();
        assert!(hits.is_empty());
    }

    #[tokio::test]
    async fn assigns_unique_ids_to_duplicates() {
        let store = store();
        let ids = store
            .add_documents(vec![Document::new("same text"), Document::new("same text")])
            .await
            .unwrap();

        assert_eq!(ids.len(), 2);
        assert_ne!(ids[0], ids[1]);
        assert_eq!(store.len().await, 2);
    }

    #[tokio::test]
    async fn keeps_caller_ids() {
        let store = store();
        let ids = store
            .add_documents(vec![Document {
                id: "titles".to_string(),
                ..Document::new("TITLES")
            }])
            .await
            .unwrap();
        assert_eq!(ids, vec!["titles".to_string()]);
    }

    #[tokio::test]
    async fn search_ranks_and_limits() {
        let store = store();
        store
            .add_documents(vec![
                Document::new("orders customer amount"),
                Document::new("titles genres runtime"),
                Document::new("credits person role"),
            ])
            .await
            .unwrap();

        let hits = store.similarity_search("which genres exist for titles", 2).await.unwrap();
        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].page_content, "titles genres runtime");
    }

    #[tokio::test]
    async fn empty_batch_is_noop() {
        let store = store();
        assert!(store.add_documents(Vec::new()).await.unwrap().is_empty());
        assert!(store.is_empty().await);
    }
}
