//! Indexing and text-to-SQL pipelines
//!
//! This crate implements the two request-driven components:
//! - [`TableIndexer`] crawls warehouse table metadata into the vector index
//! - [`QueryHandler`] turns a natural-language question into a read-only
//!   SQL statement, runs it and returns the rows
//!
//! Both receive their collaborators (warehouse executor, vector store,
//! language model) as trait objects, so one shared connection manager can
//! serve every handler in a process.

pub mod error;
pub mod prompt;
pub mod extract;
pub mod indexer;
pub mod handler;

pub use error::{HandlerError, IndexerError};
pub use prompt::{compose_prompt, join_page_contents};
pub use extract::{extract_sql, ReadOnlyGuard};
pub use indexer::TableIndexer;
pub use handler::{QueryHandler, QueryRequest, QueryResponse};
