//! Table metadata indexer
//!
//! Crawls `show tables` and `show columns` output into one
//! [`TableMetadataDocument`] per table and bulk-adds the serialized
//! documents to the vector index. Re-running adds fresh copies; nothing is
//! deduplicated.

use crate::error::IndexerError;
use querybridge_core::{ColumnMetadata, Row, TableMetadataDocument};
use querybridge_rag::{Document, VectorStore};
use querybridge_warehouse::SqlExecutor;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, info, warn};

const SERVICE: &str = "IndexTables";

/// Builds and stores table metadata documents
pub struct TableIndexer {
    executor: Arc<dyn SqlExecutor>,
    store: Arc<dyn VectorStore>,
}

impl TableIndexer {
    pub fn new(executor: Arc<dyn SqlExecutor>, store: Arc<dyn VectorStore>) -> Self {
        Self { executor, store }
    }

    /// Index every table visible to the connection
    ///
    /// Returns the documents that were added. No tables is not an error.
    pub async fn index_tables(&self) -> Result<Vec<TableMetadataDocument>, IndexerError> {
        info!(service = SERVICE, "Indexing table metadata");

        let documents = self.build_table_metadata().await?;
        if documents.is_empty() {
            return Ok(documents);
        }

        let mut batch = Vec::with_capacity(documents.len());
        for document in &documents {
            let page_content = document.to_page_content().map_err(|e| IndexerError::Serialization {
                table: document.qualified_name(),
                message: e.to_string(),
            })?;
            batch.push(Document::new(page_content).with_metadata("table", document.qualified_name()));
        }

        let ids = self.store.add_documents(batch).await?;
        info!(service = SERVICE, tables = documents.len(), added = ids.len(), "Indexed table metadata");

        Ok(documents)
    }

    /// Read table and column metadata from the warehouse
    pub async fn build_table_metadata(&self) -> Result<Vec<TableMetadataDocument>, IndexerError> {
        let Some(tables) = self.executor.execute("show tables").await? else {
            info!(service = SERVICE, "No tables found");
            return Ok(Vec::new());
        };
        if tables.is_empty() {
            info!(service = SERVICE, "No tables found");
            return Ok(Vec::new());
        }

        let mut documents = Vec::with_capacity(tables.len());
        for row in &tables {
            let Some(mut document) = table_from_row(row) else {
                warn!(service = SERVICE, "Skipping table row without a name");
                continue;
            };
            debug!(service = SERVICE, table = %document.qualified_name(), "Table");

            let sql = format!("show columns in table {}", document.quoted_name());
            if let Some(columns) = self.executor.execute(&sql).await? {
                document.columns = columns.iter().filter_map(column_from_row).collect();
            }

            documents.push(document);
        }

        Ok(documents)
    }
}

/// Text value of a row field; non-string scalars are rendered as JSON
fn text_field(row: &Row, key: &str) -> Option<String> {
    match row.get(key)? {
        Value::Null => None,
        Value::String(s) => Some(s.clone()),
        other => Some(other.to_string()),
    }
}

fn table_from_row(row: &Row) -> Option<TableMetadataDocument> {
    Some(TableMetadataDocument {
        database: text_field(row, "database_name"),
        table: text_field(row, "name")?,
        schema: text_field(row, "schema_name"),
        comment: text_field(row, "comment"),
        columns: Vec::new(),
    })
}

/// `data_type` arrives as an object or as JSON text like
/// `{"type":"TEXT","length":16777216,"nullable":true}`
fn data_type_of(row: &Row) -> Option<serde_json::Map<String, Value>> {
    match row.get("data_type")? {
        Value::Object(map) => Some(map.clone()),
        Value::String(text) => match serde_json::from_str(text) {
            Ok(Value::Object(map)) => Some(map),
            _ => None,
        },
        _ => None,
    }
}

fn column_from_row(row: &Row) -> Option<ColumnMetadata> {
    let name = text_field(row, "column_name")?;
    let data_type = data_type_of(row);

    Some(ColumnMetadata {
        name,
        data_type: data_type
            .as_ref()
            .and_then(|d| d.get("type"))
            .and_then(Value::as_str)
            .map(str::to_string),
        nullable: data_type.as_ref().and_then(|d| d.get("nullable")).and_then(Value::as_bool),
        comment: text_field(row, "comment"),
    })
}
