use thiserror::Error;

/// Vector index failures
#[derive(Debug, Clone, Error)]
pub enum VectorStoreError {
    #[error("Embedding failed: {0}")]
    Embedding(String),

    #[error("Embedding dimension mismatch: {0}")]
    Dimension(String),

    #[error("Index I/O error: {0}")]
    Io(String),

    #[error("Index serialization error: {0}")]
    Serialization(String),
}

/// Language model failures
#[derive(Debug, Clone, Error)]
pub enum ModelError {
    #[error("Model request failed: {0}")]
    Request(String),

    #[error("Model returned an error: {0}")]
    Status(String),

    #[error("Invalid model response: {0}")]
    InvalidResponse(String),
}
