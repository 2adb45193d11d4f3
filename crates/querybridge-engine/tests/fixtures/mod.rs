//! Test fixtures for the indexing and text-to-SQL pipelines
//!
//! Builds a mock warehouse scripted with IMDB-like `show tables` and
//! `show columns` output, wired through a real connection manager.

#![allow(dead_code)]

use querybridge_core::{Credential, Row, WarehouseConfig};
use querybridge_rag::{HashingEmbedder, InMemoryVectorStore};
use querybridge_warehouse::{ConnectionManager, MemorySecretStore, MockDriver, MockDriverBuilder};
use serde_json::{json, Value};
use std::sync::Arc;

pub fn row(value: Value) -> Row {
    match value {
        Value::Object(map) => map,
        other => panic!("row fixture must be an object, got {}", other),
    }
}

/// A `show tables` row
pub fn table_row(database: &str, schema: &str, name: &str, comment: &str) -> Row {
    row(json!({
        "created_on": "2024-03-01 10:00:00.000 -0800",
        "name": name,
        "database_name": database,
        "schema_name": schema,
        "kind": "TABLE",
        "comment": comment,
        "owner": "ACCOUNTADMIN",
    }))
}

/// A `show columns` row with `data_type` as JSON text, as Snowflake returns it
pub fn column_row(table: &str, name: &str, data_type: &str, nullable: bool, comment: &str) -> Row {
    row(json!({
        "table_name": table,
        "schema_name": "PUBLIC",
        "column_name": name,
        "data_type": json!({"type": data_type, "nullable": nullable}).to_string(),
        "null?": if nullable { "true" } else { "false" },
        "comment": comment,
        "kind": "COLUMN",
    }))
}

/// Mock driver scripted with a TITLES and a RATINGS table
pub fn imdb_driver() -> MockDriver {
    MockDriverBuilder::new()
        .with_result(
            "show tables",
            vec![
                table_row("IMDB", "PUBLIC", "TITLES", "Contains basic movie title information"),
                table_row("IMDB", "PUBLIC", "RATINGS", "Contains rating and votes for titles"),
            ],
        )
        .with_result(
            r#"show columns in table "IMDB"."PUBLIC"."TITLES""#,
            vec![
                column_row("TITLES", "TCONST", "TEXT", false, "alphanumeric unique identifier of the title"),
                column_row("TITLES", "GENRES", "TEXT", true, "includes up to three genres associated with the title"),
            ],
        )
        .with_result(
            r#"show columns in table "IMDB"."PUBLIC"."RATINGS""#,
            vec![
                column_row("RATINGS", "TCONST", "TEXT", false, "alphanumeric unique identifier of the title"),
                column_row("RATINGS", "AVERAGERATING", "REAL", true, "weighted average of all the individual user ratings"),
            ],
        )
        .build()
}

/// Connection manager over `driver` with a password credential
pub async fn manager(driver: &MockDriver) -> Arc<ConnectionManager> {
    let secrets = MemorySecretStore::new();
    secrets.insert("/text-to-sql/snowflake", "password", "hunter2").await;

    let config = WarehouseConfig {
        account: "otzhjhy-glb64226".to_string(),
        host: None,
        database: "IMDB".to_string(),
        schema: "PUBLIC".to_string(),
        warehouse: "TEST_WH".to_string(),
        role: None,
        application: "TextToSql".to_string(),
        credential: Credential::username_password("developer", "/text-to-sql/snowflake/password").unwrap(),
    };

    Arc::new(ConnectionManager::new(config, Arc::new(secrets), Arc::new(driver.clone())))
}

pub fn vector_store() -> Arc<InMemoryVectorStore> {
    Arc::new(InMemoryVectorStore::new("table-metadata", Arc::new(HashingEmbedder::new(512))))
}
