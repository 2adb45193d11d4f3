//! Text-to-SQL query handler
//!
//! Pipeline for one question:
//! 1. Similarity-search the metadata index (zero hits answers "nothing")
//! 2. Compose the prompt from the hits and the verbatim question
//! 3. Invoke the language model
//! 4. Extract the first `sql` block (none answers "nothing")
//! 5. Check the statement is read-only, execute it and return the rows
//!
//! Errors from any collaborator propagate unchanged. There is no retry and
//! no partial result.

use crate::error::HandlerError;
use crate::extract::{extract_sql, ReadOnlyGuard};
use crate::prompt::{compose_prompt, join_page_contents};
use querybridge_core::{HandlerConfig, ModelConfig, QueryResults};
use querybridge_rag::{InvokeModelRequest, LanguageModel, MessagesRequest, MessagesResponse, VectorStore};
use querybridge_warehouse::SqlExecutor;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

const SERVICE: &str = "TextToSql";

/// Invocation payload: `{"human": "<question>"}`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    pub human: String,
}

/// Invocation result: `{"results": [...] | null | "nothing"}`
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct QueryResponse {
    pub results: QueryResults,
}

impl QueryResponse {
    pub fn nothing() -> Self {
        Self {
            results: QueryResults::Nothing,
        }
    }
}

/// Answers natural-language questions with warehouse rows
pub struct QueryHandler {
    store: Arc<dyn VectorStore>,
    model: Arc<dyn LanguageModel>,
    executor: Arc<dyn SqlExecutor>,
    model_config: ModelConfig,
    config: HandlerConfig,
    guard: ReadOnlyGuard,
}

impl QueryHandler {
    /// Create a handler with default model and handler settings
    pub fn new(store: Arc<dyn VectorStore>, model: Arc<dyn LanguageModel>, executor: Arc<dyn SqlExecutor>) -> Self {
        Self {
            store,
            model,
            executor,
            model_config: ModelConfig::default(),
            config: HandlerConfig::default(),
            guard: ReadOnlyGuard::new(),
        }
    }

    pub fn with_model_config(mut self, model_config: ModelConfig) -> Self {
        self.model_config = model_config;
        self
    }

    pub fn with_config(mut self, config: HandlerConfig) -> Self {
        self.config = config;
        self
    }

    /// Handle an invocation payload
    pub async fn handle(&self, request: &QueryRequest) -> Result<QueryResponse, HandlerError> {
        self.answer(&request.human).await
    }

    /// Answer `question`
    pub async fn answer(&self, question: &str) -> Result<QueryResponse, HandlerError> {
        debug!(service = SERVICE, "Searching vector store");
        let hits = self.store.similarity_search(question, self.config.top_k).await?;
        if hits.is_empty() {
            warn!(service = SERVICE, question, "No vector search results found");
            return Ok(QueryResponse::nothing());
        }
        debug!(service = SERVICE, hits = hits.len(), "Found metadata documents");

        let prompt = compose_prompt(&join_page_contents(&hits), question);
        let text = self.generate(prompt).await?;

        let Some(sql) = extract_sql(&text) else {
            info!(service = SERVICE, "Model response contains no SQL block");
            return Ok(QueryResponse::nothing());
        };
        info!(service = SERVICE, sql, "Extracted SQL");

        if self.config.enforce_read_only {
            self.guard.check(sql)?;
        }

        let rows = self.executor.execute(sql).await?;
        info!(
            service = SERVICE,
            rows = rows.as_ref().map(Vec::len),
            "Query executed"
        );

        Ok(QueryResponse {
            results: QueryResults::from_rows(rows),
        })
    }

    async fn generate(&self, prompt: String) -> Result<String, HandlerError> {
        let body = MessagesRequest::single_turn(prompt, self.model_config.max_tokens);
        let request = InvokeModelRequest::json(self.model_config.model_id.clone(), &body)?;

        let response = self.model.invoke(request).await?;
        let envelope = MessagesResponse::parse(&response.body)?;
        debug!(service = SERVICE, stop_reason = ?envelope.stop_reason, "Model responded");

        let text = envelope.first_text()?;
        debug!(service = SERVICE, text, "Assistant text");
        Ok(text.to_string())
    }
}
