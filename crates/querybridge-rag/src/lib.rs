//! Retrieval and generation collaborators
//!
//! This crate provides the two services the query pipeline talks to besides
//! the warehouse:
//! - A vector index of table metadata documents ([`VectorStore`]), with an
//!   in-memory implementation that can persist itself to a JSON file
//! - A language model runtime ([`LanguageModel`]) speaking the Anthropic
//!   messages envelope
//!
//! Both sit behind `async_trait` traits so tests can swap in scripted
//! implementations.

pub mod error;
pub mod embedder;
pub mod vector_store;
pub mod model;

pub use error::{ModelError, VectorStoreError};
pub use embedder::{Embedder, Embedding, HashingEmbedder, HttpEmbedder};
pub use vector_store::{Document, InMemoryVectorStore, VectorStore};
pub use model::{
    HttpLanguageModel, InvokeModelRequest, InvokeModelResponse, LanguageModel, MessagesRequest,
    MessagesResponse, ScriptedLanguageModel,
};
