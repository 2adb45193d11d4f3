//! Snowflake warehouse driver
//!
//! ## Authentication Methods
//!
//! 1. Password authentication (`SNOWFLAKE`) through the `snowflake-api` SDK
//! 2. Key-pair authentication (`SNOWFLAKE_JWT`) through the `snowflake-api` SDK
//! 3. OAuth bearer tokens (`OAUTH`) through the SQL API v2
//!
//! The SDK paths need the `snowflake` Cargo feature. The OAuth path only
//! needs an HTTP client and is always available.
//!
//! Reference: https://docs.snowflake.com/en/developer-guide/sql-api/index

use crate::driver::{Authenticator, ConnectOptions, WarehouseConnection, WarehouseDriver, WarehouseError};
use querybridge_core::Row;
use serde::Deserialize;
use serde_json::Value;
use std::sync::Arc;
use tracing::{debug, error, warn};

#[cfg(feature = "snowflake")]
use snowflake_api::SnowflakeApi;

/// Zip column names with positional row values
pub(crate) fn rows_from_columns(names: &[String], data: Vec<Vec<Value>>) -> Vec<Row> {
    data.into_iter()
        .map(|values| names.iter().cloned().zip(values).collect::<Row>())
        .collect()
}

/// Snowflake driver
#[derive(Debug, Clone, Default)]
pub struct SnowflakeDriver {
    http: reqwest::Client,
}

impl SnowflakeDriver {
    /// Create a driver with a fresh HTTP client
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a driver sharing an existing HTTP client
    pub fn with_client(http: reqwest::Client) -> Self {
        Self { http }
    }
}

#[async_trait::async_trait]
impl WarehouseDriver for SnowflakeDriver {
    fn name(&self) -> &'static str {
        "Snowflake"
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn WarehouseConnection>, WarehouseError> {
        let connection: Arc<dyn WarehouseConnection> = match &options.authenticator {
            Authenticator::OAuth { token } => Arc::new(SqlApiConnection {
                http: self.http.clone(),
                options: options.clone(),
                token: token.clone(),
            }),
            #[cfg(feature = "snowflake")]
            _ => Arc::new(SdkConnection::open(options)?),
            #[cfg(not(feature = "snowflake"))]
            _ => {
                return Err(WarehouseError::Config(
                    "Snowflake support not compiled. Rebuild with: cargo build --features snowflake".to_string()
                ))
            }
        };

        // Both transports authenticate lazily; force the handshake now so
        // credential problems surface as connection errors.
        connection.execute("SELECT 1").await.map_err(|e| {
            error!(account = %options.account, "Snowflake handshake failed: {}", e);
            WarehouseError::Connection(format!("Failed to connect to Snowflake account {}: {}", options.account, e))
        })?;

        Ok(connection)
    }
}

/// Connection backed by the `snowflake-api` SDK
#[cfg(feature = "snowflake")]
struct SdkConnection {
    api: SnowflakeApi,
}

#[cfg(feature = "snowflake")]
impl SdkConnection {
    fn open(options: &ConnectOptions) -> Result<Self, WarehouseError> {
        let api = match &options.authenticator {
            Authenticator::Native { password } => SnowflakeApi::with_password_auth(
                &options.account,
                Some(options.warehouse.as_str()),
                Some(options.database.as_str()),
                Some(options.schema.as_str()),
                &options.username,
                options.role.as_deref(),
                password,
            )
            .map_err(|e| WarehouseError::Connection(format!(
                "Failed to authenticate with Snowflake: {}",
                e
            )))?,
            Authenticator::KeyPairJwt { private_key_pem } => SnowflakeApi::with_certificate_auth(
                &options.account,
                Some(options.warehouse.as_str()),
                Some(options.database.as_str()),
                Some(options.schema.as_str()),
                &options.username,
                options.role.as_deref(),
                private_key_pem,
            )
            .map_err(|e| WarehouseError::Connection(format!(
                "Failed to authenticate with key-pair: {}",
                e
            )))?,
            Authenticator::OAuth { .. } => {
                return Err(WarehouseError::Config(
                    "OAuth connections use the SQL API transport".to_string(),
                ))
            }
        };

        Ok(Self { api })
    }

    fn batches_to_rows(batches: &[arrow_array::RecordBatch]) -> Result<Vec<Row>, WarehouseError> {
        let mut writer = arrow_json::ArrayWriter::new(Vec::new());
        let batch_refs: Vec<&arrow_array::RecordBatch> = batches.iter().collect();

        writer
            .write_batches(&batch_refs)
            .map_err(|e| WarehouseError::Execution(format!("Cannot decode Arrow result: {}", e)))?;
        writer
            .finish()
            .map_err(|e| WarehouseError::Execution(format!("Cannot decode Arrow result: {}", e)))?;

        let buffer = writer.into_inner();
        if buffer.is_empty() {
            return Ok(Vec::new());
        }

        serde_json::from_slice(&buffer)
            .map_err(|e| WarehouseError::Execution(format!("Cannot decode Arrow result: {}", e)))
    }
}

#[cfg(feature = "snowflake")]
#[async_trait::async_trait]
impl WarehouseConnection for SdkConnection {
    async fn is_valid(&self) -> bool {
        self.api.exec("SELECT 1").await.is_ok()
    }

    async fn execute(&self, sql: &str) -> Result<Option<Vec<Row>>, WarehouseError> {
        use snowflake_api::QueryResult;

        let result = self
            .api
            .exec(sql)
            .await
            .map_err(|e| WarehouseError::Execution(e.to_string()))?;

        match result {
            QueryResult::Arrow(batches) => Self::batches_to_rows(&batches).map(Some),
            QueryResult::Json(json) => {
                let names: Vec<String> = json.schema.iter().map(|field| field.name.clone()).collect();
                let data: Vec<Vec<Value>> = serde_json::from_value(json.value)
                    .map_err(|e| WarehouseError::Execution(format!("Unexpected JSON result shape: {}", e)))?;
                Ok(Some(rows_from_columns(&names, data)))
            }
            QueryResult::Empty => Ok(None),
        }
    }
}

/// Statement request for the SQL API
#[derive(Debug, serde::Serialize)]
struct StatementRequest<'a> {
    statement: &'a str,
    timeout: u64,
    database: &'a str,
    schema: &'a str,
    warehouse: &'a str,
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
}

/// Statement result; partition fetches carry only `data`
#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StatementResponse {
    #[serde(default)]
    result_set_meta_data: Option<ResultSetMetaData>,
    #[serde(default)]
    data: Option<Vec<Vec<Value>>>,
    #[serde(default)]
    statement_handle: Option<String>,
    #[serde(default)]
    statement_status_url: Option<String>,
    #[serde(default)]
    message: Option<String>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ResultSetMetaData {
    row_type: Vec<RowType>,
    #[serde(default)]
    partition_info: Vec<PartitionInfo>,
}

#[derive(Debug, Deserialize)]
struct RowType {
    name: String,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PartitionInfo {
    #[serde(default)]
    row_count: u64,
}

impl StatementResponse {
    /// Partitions after the first, which arrives inline
    fn remaining_partitions(&self) -> std::ops::Range<usize> {
        let count = self
            .result_set_meta_data
            .as_ref()
            .map_or(0, |meta| meta.partition_info.len());
        1..count.max(1)
    }

    /// Append the rows of a fetched partition
    fn append_partition(&mut self, partition: StatementResponse) {
        let rows = partition.data.unwrap_or_default();
        self.data.get_or_insert_with(Vec::new).extend(rows);
    }

    fn expected_rows(&self) -> u64 {
        self.result_set_meta_data
            .as_ref()
            .map_or(0, |meta| meta.partition_info.iter().map(|p| p.row_count).sum())
    }

    fn into_rows(self) -> Option<Vec<Row>> {
        let names: Vec<String> = self
            .result_set_meta_data?
            .row_type
            .into_iter()
            .map(|column| column.name)
            .collect();
        Some(rows_from_columns(&names, self.data.unwrap_or_default()))
    }
}

/// Connection using an OAuth bearer token against the SQL API v2
struct SqlApiConnection {
    http: reqwest::Client,
    options: ConnectOptions,
    token: String,
}

impl SqlApiConnection {
    const STATEMENT_TIMEOUT_SECS: u64 = 60;
    const POLL_INTERVAL_MS: u64 = 500;

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        request
            .bearer_auth(&self.token)
            .header("X-Snowflake-Authorization-Token-Type", "OAUTH")
            .header(reqwest::header::ACCEPT, "application/json")
            .header(reqwest::header::USER_AGENT, self.options.application.as_str())
    }

    async fn read(response: reqwest::Response) -> Result<(reqwest::StatusCode, StatementResponse), WarehouseError> {
        let status = response.status();
        let body = response
            .text()
            .await
            .map_err(|e| WarehouseError::Execution(format!("Cannot read SQL API response: {}", e)))?;

        if !status.is_success() {
            let message = serde_json::from_str::<StatementResponse>(&body)
                .ok()
                .and_then(|r| r.message)
                .unwrap_or(body);
            return Err(WarehouseError::Execution(format!("SQL API returned {}: {}", status, message)));
        }

        let parsed = serde_json::from_str(&body)
            .map_err(|e| WarehouseError::Execution(format!("Malformed SQL API response: {}", e)))?;
        Ok((status, parsed))
    }
}

impl SqlApiConnection {
    /// Large result sets are split; only partition 0 comes with the statement
    async fn fetch_remaining_partitions(&self, base: &str, statement: &mut StatementResponse) -> Result<(), WarehouseError> {
        let partitions = statement.remaining_partitions();
        if partitions.is_empty() {
            return Ok(());
        }

        let handle = statement.statement_handle.clone().ok_or_else(|| {
            WarehouseError::Execution("Partitioned result without a statement handle".to_string())
        })?;
        debug!(handle = %handle, partitions = partitions.len() + 1, "Fetching result partitions");

        for partition in partitions {
            let response = self
                .authorize(self.http.get(format!("{}/api/v2/statements/{}", base, handle)))
                .query(&[("partition", partition)])
                .send()
                .await
                .map_err(|e| WarehouseError::Execution(format!("SQL API request failed: {}", e)))?;
            let (_, fetched) = Self::read(response).await?;
            statement.append_partition(fetched);
        }

        let fetched = statement.data.as_ref().map_or(0, Vec::len) as u64;
        if fetched != statement.expected_rows() {
            warn!(fetched, expected = statement.expected_rows(), "Row count differs from partition info");
        }
        Ok(())
    }
}

#[async_trait::async_trait]
impl WarehouseConnection for SqlApiConnection {
    async fn is_valid(&self) -> bool {
        self.execute("SELECT 1").await.is_ok()
    }

    async fn execute(&self, sql: &str) -> Result<Option<Vec<Row>>, WarehouseError> {
        let base = format!("https://{}", self.options.host);
        let request = StatementRequest {
            statement: sql,
            timeout: Self::STATEMENT_TIMEOUT_SECS,
            database: &self.options.database,
            schema: &self.options.schema,
            warehouse: &self.options.warehouse,
            role: self.options.role.as_deref(),
        };

        let response = self
            .authorize(self.http.post(format!("{}/api/v2/statements", base)))
            .json(&request)
            .send()
            .await
            .map_err(|e| WarehouseError::Execution(format!("SQL API request failed: {}", e)))?;

        let (mut status, mut statement) = Self::read(response).await?;

        // 202: still running, poll the status URL until it completes
        while status == reqwest::StatusCode::ACCEPTED {
            let status_url = statement.statement_status_url.take().ok_or_else(|| {
                WarehouseError::Execution("Statement accepted without a status URL".to_string())
            })?;
            debug!(status_url = %status_url, "Statement still running");
            tokio::time::sleep(std::time::Duration::from_millis(Self::POLL_INTERVAL_MS)).await;

            let response = self
                .authorize(self.http.get(format!("{}{}", base, status_url)))
                .send()
                .await
                .map_err(|e| WarehouseError::Execution(format!("SQL API request failed: {}", e)))?;
            (status, statement) = Self::read(response).await?;
        }

        self.fetch_remaining_partitions(&base, &mut statement).await?;
        Ok(statement.into_rows())
    }
}
