use querybridge_rag::{ModelError, VectorStoreError};
use querybridge_warehouse::WarehouseError;
use thiserror::Error;

/// Errors that can occur while indexing table metadata
#[derive(Debug, Error)]
pub enum IndexerError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error("Cannot serialize metadata for table {table}: {message}")]
    Serialization { table: String, message: String },
}

/// Errors that can occur while answering a question
#[derive(Debug, Error)]
pub enum HandlerError {
    #[error(transparent)]
    Warehouse(#[from] WarehouseError),

    #[error(transparent)]
    VectorStore(#[from] VectorStoreError),

    #[error(transparent)]
    Model(#[from] ModelError),

    #[error("Refusing to run a statement that is not read-only: {0}")]
    UnsafeStatement(String),
}
