//! Integration tests for the indexing and text-to-SQL pipelines
//!
//! The warehouse is a scripted mock behind a real connection manager, the
//! vector index is in memory and the model answers from a script, so no
//! credentials are needed.
//!
//! ```bash
//! cargo test -p querybridge-engine --test integration_tests
//! ```

mod fixtures;

use pretty_assertions::assert_eq;
use querybridge_core::{HandlerConfig, ModelConfig, QueryResults};
use querybridge_engine::{HandlerError, QueryHandler, QueryRequest, TableIndexer};
use querybridge_rag::{Document, MessagesRequest, ScriptedLanguageModel, VectorStore};
use querybridge_warehouse::{MockDriver, WarehouseError};
use serde_json::json;
use std::sync::Arc;

// =============================================================================
// Indexer
// =============================================================================

#[tokio::test]
async fn test_index_tables_builds_one_document_per_table() {
    let driver = fixtures::imdb_driver();
    let store = fixtures::vector_store();
    let indexer = TableIndexer::new(fixtures::manager(&driver).await, store.clone());

    let documents = indexer.index_tables().await.unwrap();

    assert_eq!(documents.len(), 2);
    assert_eq!(documents[0].qualified_name(), "IMDB.PUBLIC.TITLES");
    assert_eq!(documents[0].columns.len(), 2);
    assert_eq!(documents[0].columns[1].name, "GENRES");
    assert_eq!(documents[0].columns[1].data_type.as_deref(), Some("TEXT"));
    assert_eq!(documents[0].columns[1].nullable, Some(true));
    assert_eq!(store.len().await, 2);

    assert_eq!(
        driver.executed().await,
        vec![
            "show tables".to_string(),
            r#"show columns in table "IMDB"."PUBLIC"."TITLES""#.to_string(),
            r#"show columns in table "IMDB"."PUBLIC"."RATINGS""#.to_string(),
        ]
    );
}

#[tokio::test]
async fn test_indexed_table_is_searchable() {
    let driver = fixtures::imdb_driver();
    let store = fixtures::vector_store();
    TableIndexer::new(fixtures::manager(&driver).await, store.clone())
        .index_tables()
        .await
        .unwrap();

    let hits = store.similarity_search("what is the averagerating in ratings", 1).await.unwrap();

    assert_eq!(hits.len(), 1);
    assert!(hits[0].page_content.contains(r#""table":"RATINGS""#));
    assert!(hits[0].page_content.contains(r#""name":"AVERAGERATING""#));
}

#[tokio::test]
async fn test_indexing_twice_is_additive() {
    let driver = fixtures::imdb_driver();
    let store = fixtures::vector_store();
    let indexer = TableIndexer::new(fixtures::manager(&driver).await, store.clone());

    indexer.index_tables().await.unwrap();
    indexer.index_tables().await.unwrap();

    assert_eq!(store.len().await, 4);
}

#[tokio::test]
async fn test_no_tables_is_not_an_error() {
    let driver = MockDriver::new();
    let store = fixtures::vector_store();
    let indexer = TableIndexer::new(fixtures::manager(&driver).await, store.clone());

    let documents = indexer.index_tables().await.unwrap();

    assert!(documents.is_empty());
    assert!(store.is_empty().await);
    assert_eq!(driver.executed().await, vec!["show tables".to_string()]);
}

#[tokio::test]
async fn test_table_without_columns_row_set() {
    let driver = MockDriver::new();
    driver
        .add_result("show tables", Some(vec![fixtures::table_row("IMDB", "PUBLIC", "EMPTY", "")]))
        .await;
    let store = fixtures::vector_store();

    let documents = TableIndexer::new(fixtures::manager(&driver).await, store)
        .index_tables()
        .await
        .unwrap();

    assert_eq!(documents.len(), 1);
    assert!(documents[0].columns.is_empty());
}

#[tokio::test]
async fn test_case_sensitive_table_names_are_quoted() {
    let driver = MockDriver::new();
    driver
        .add_result("show tables", Some(vec![fixtures::table_row("IMDB", "PUBLIC", "titles", "")]))
        .await;
    driver
        .add_result(
            r#"show columns in table "IMDB"."PUBLIC"."titles""#,
            Some(vec![fixtures::column_row("titles", "tconst", "TEXT", false, "")]),
        )
        .await;

    let documents = TableIndexer::new(fixtures::manager(&driver).await, fixtures::vector_store())
        .index_tables()
        .await
        .unwrap();

    assert_eq!(documents[0].table, "titles");
    assert_eq!(documents[0].columns[0].name, "tconst");
    assert_eq!(
        driver.executed().await.last().map(String::as_str),
        Some(r#"show columns in table "IMDB"."PUBLIC"."titles""#)
    );
}

#[tokio::test]
async fn test_indexer_propagates_warehouse_errors() {
    let driver = MockDriver::new();
    driver
        .add_error("show tables", WarehouseError::Execution("Insufficient privileges".to_string()))
        .await;

    let result = TableIndexer::new(fixtures::manager(&driver).await, fixtures::vector_store())
        .index_tables()
        .await;

    assert!(result.is_err());
}

// =============================================================================
// Query Handler
// =============================================================================

const ACTION_SQL: &str = "SELECT t.* FROM IMDB.PUBLIC.TITLES t WHERE LOWER(t.GENRES) LIKE '%action%';";

async fn indexed_store(driver: &MockDriver) -> Arc<querybridge_rag::InMemoryVectorStore> {
    let store = fixtures::vector_store();
    TableIndexer::new(fixtures::manager(driver).await, store.clone())
        .index_tables()
        .await
        .unwrap();
    store
}

#[tokio::test]
async fn test_answer_runs_generated_sql() {
    let driver = fixtures::imdb_driver();
    driver
        .add_result(
            ACTION_SQL,
            Some(vec![fixtures::row(json!({"TCONST": "tt0000001", "GENRES": "Action,Drama"}))]),
        )
        .await;
    let store = indexed_store(&driver).await;
    let model = Arc::new(ScriptedLanguageModel::new().with_reply(format!(
        "Here is the query:\n```sql\n{}```",
        ACTION_SQL
    )));

    let handler = QueryHandler::new(store, model.clone(), fixtures::manager(&driver).await);
    let response = handler.answer("Find the titles with genres containing 'action'").await.unwrap();

    assert_eq!(
        serde_json::to_value(&response).unwrap(),
        json!({"results": [{"TCONST": "tt0000001", "GENRES": "Action,Drama"}]})
    );

    let prompts = model.prompts();
    assert_eq!(prompts.len(), 1);
    assert!(prompts[0].contains(r#""table":"TITLES""#));
    assert!(prompts[0].ends_with("<QUESTION>\nFind the titles with genres containing 'action'\n</QUESTION>"));
    assert_eq!(driver.executed().await.last().map(String::as_str), Some(ACTION_SQL));
}

#[tokio::test]
async fn test_model_request_envelope() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("```sql\nSELECT 1;```"));

    QueryHandler::new(store, model.clone(), fixtures::manager(&driver).await)
        .answer("anything")
        .await
        .unwrap();

    let request = &model.requests()[0];
    assert_eq!(request.model_id, "anthropic.claude-3-haiku-20240307-v1:0");
    assert_eq!(request.content_type, "application/json");
    assert_eq!(request.accept, "application/json");

    let body: MessagesRequest = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body.anthropic_version, "bedrock-2023-05-31");
    assert_eq!(body.max_tokens, 3000);
    assert_eq!(body.messages[0].role, "user");
    assert_eq!(driver.executed().await.last().map(String::as_str), Some("SELECT 1;"));
}

#[tokio::test]
async fn test_zero_hits_answers_nothing() {
    let driver = fixtures::imdb_driver();
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("```sql\nSELECT 1;```"));

    let handler = QueryHandler::new(fixtures::vector_store(), model.clone(), fixtures::manager(&driver).await);
    let response = handler.answer("How many titles are there?").await.unwrap();

    assert_eq!(response.results, QueryResults::Nothing);
    assert!(model.requests().is_empty());
    assert_eq!(driver.connect_count().await, 0);
    assert!(driver.executed().await.is_empty());
}

#[tokio::test]
async fn test_no_sql_block_answers_nothing() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;
    let executed_before = driver.executed().await.len();
    let model = Arc::new(
        ScriptedLanguageModel::new().with_reply("Could you clarify which rating you mean: average or number of votes?"),
    );

    let handler = QueryHandler::new(store, model, fixtures::manager(&driver).await);
    let response = handler.answer("best titles").await.unwrap();

    assert_eq!(serde_json::to_value(&response).unwrap(), json!({"results": "nothing"}));
    assert_eq!(driver.executed().await.len(), executed_before);
}

#[tokio::test]
async fn test_statement_without_row_set_answers_null() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("```sql\nSELECT 1;```"));

    let handler = QueryHandler::new(store, model, fixtures::manager(&driver).await);
    let response = handler
        .handle(&QueryRequest {
            human: "anything".to_string(),
        })
        .await
        .unwrap();

    assert_eq!(serde_json::to_value(&response).unwrap(), json!({"results": null}));
}

#[tokio::test]
async fn test_read_only_guard_rejects_mutation() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;
    let executed_before = driver.executed().await.len();
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("```sql\nDROP TABLE IMDB.PUBLIC.TITLES;```"));

    let handler = QueryHandler::new(store, model, fixtures::manager(&driver).await);
    let result = handler.answer("remove the titles table").await;

    assert!(matches!(result, Err(HandlerError::UnsafeStatement(_))));
    assert_eq!(driver.executed().await.len(), executed_before);
}

#[tokio::test]
async fn test_read_only_guard_rejects_cte_insert() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;
    let executed_before = driver.executed().await.len();
    let model = Arc::new(ScriptedLanguageModel::new().with_reply(
        "```sql\nWITH x AS (SELECT 'tt0000001' AS TCONST) INSERT INTO IMDB.PUBLIC.TITLES (TCONST) SELECT TCONST FROM x;```",
    ));

    let handler = QueryHandler::new(store, model, fixtures::manager(&driver).await);
    let result = handler.answer("copy a title").await;

    assert!(matches!(result, Err(HandlerError::UnsafeStatement(_))));
    assert_eq!(driver.executed().await.len(), executed_before);
}

#[tokio::test]
async fn test_guard_can_be_disabled() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("```sql\nDROP TABLE IMDB.PUBLIC.SCRATCH;```"));

    let handler = QueryHandler::new(store, model, fixtures::manager(&driver).await).with_config(HandlerConfig {
        enforce_read_only: false,
        ..HandlerConfig::default()
    });
    handler.answer("drop the scratch table").await.unwrap();

    assert_eq!(
        driver.executed().await.last().map(String::as_str),
        Some("DROP TABLE IMDB.PUBLIC.SCRATCH;")
    );
}

#[tokio::test]
async fn test_top_k_and_model_settings_are_configurable() {
    let store = fixtures::vector_store();
    store
        .add_documents(vec![
            Document::new(r#"{"table":"A"}"#),
            Document::new(r#"{"table":"B"}"#),
            Document::new(r#"{"table":"C"}"#),
        ])
        .await
        .unwrap();
    let driver = MockDriver::new();
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("no sql"));

    let handler = QueryHandler::new(store, model.clone(), fixtures::manager(&driver).await)
        .with_config(HandlerConfig {
            top_k: 2,
            ..HandlerConfig::default()
        })
        .with_model_config(ModelConfig {
            model_id: "anthropic.claude-3-5-sonnet-20240620-v1:0".to_string(),
            max_tokens: 512,
            ..ModelConfig::default()
        });
    handler.answer("table").await.unwrap();

    let request = &model.requests()[0];
    assert_eq!(request.model_id, "anthropic.claude-3-5-sonnet-20240620-v1:0");
    let body: MessagesRequest = serde_json::from_slice(&request.body).unwrap();
    assert_eq!(body.max_tokens, 512);
    assert_eq!(body.messages[0].content.matches(r#"{"table":"#).count(), 2);
}

#[tokio::test]
async fn test_model_failure_propagates() {
    let driver = fixtures::imdb_driver();
    let store = indexed_store(&driver).await;

    let handler = QueryHandler::new(store, Arc::new(ScriptedLanguageModel::new()), fixtures::manager(&driver).await);
    let result = handler.answer("anything").await;

    assert!(matches!(result, Err(HandlerError::Model(_))));
}

#[tokio::test]
async fn test_execution_failure_propagates() {
    let driver = fixtures::imdb_driver();
    driver
        .add_error("SELECT * FROM NOPE;", WarehouseError::Execution("Object 'NOPE' does not exist".to_string()))
        .await;
    let store = indexed_store(&driver).await;
    let model = Arc::new(ScriptedLanguageModel::new().with_reply("```sql\nSELECT * FROM NOPE;```"));

    let handler = QueryHandler::new(store, model, fixtures::manager(&driver).await);
    let result = handler.answer("anything").await;

    assert!(matches!(result, Err(HandlerError::Warehouse(WarehouseError::Execution(_)))));
}
