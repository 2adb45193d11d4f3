//! Mock warehouse driver for testing
//!
//! This driver returns predefined row sets without connecting to any
//! warehouse. It's useful for:
//! - Unit testing the indexer and the query handler
//! - Checking how often the connection layer reconnects
//! - Demos and examples without real credentials
//! - Simulating connection and execution failures
//!
//! ## Usage
//!
//! ```rust,ignore
//! use querybridge_warehouse::{MockDriverBuilder, WarehouseDriver};
//!
//! let driver = MockDriverBuilder::new()
//!     .with_result("show tables", vec![table_row("IMDB", "PUBLIC", "TITLES")])
//!     .build();
//!
//! // Make every open connection report itself invalid
//! driver.invalidate_connections();
//! ```

use crate::driver::{ConnectOptions, WarehouseConnection, WarehouseDriver, WarehouseError};
use querybridge_core::Row;
use std::collections::HashMap;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use tokio::sync::RwLock;

#[derive(Default)]
struct MockState {
    /// Row sets by exact SQL text
    results: HashMap<String, Option<Vec<Row>>>,

    /// Errors by exact SQL text
    errors: HashMap<String, WarehouseError>,

    /// Every statement executed, in order
    executed: Vec<String>,

    /// Options of every connect call
    connects: Vec<ConnectOptions>,
}

/// Mock warehouse driver
///
/// Statements are matched by exact text. Unknown statements succeed
/// with no row set. Clones share state.
#[derive(Clone)]
pub struct MockDriver {
    state: Arc<RwLock<MockState>>,

    /// Bumped to invalidate every connection opened before
    generation: Arc<AtomicUsize>,

    /// Simulate connection failure
    fail_connection: bool,

    /// Simulate query latency (milliseconds)
    latency_ms: u64,

    /// Name to return from name() method
    driver_name: &'static str,
}

impl MockDriver {
    /// Create a new mock driver with no predefined results
    pub fn new() -> Self {
        MockDriverBuilder::new().build()
    }

    /// Set the row set returned for a statement
    pub async fn add_result(&self, sql: impl Into<String>, rows: Option<Vec<Row>>) {
        self.state.write().await.results.insert(sql.into(), rows);
    }

    /// Configure an error to be returned for a statement
    pub async fn add_error(&self, sql: impl Into<String>, error: WarehouseError) {
        self.state.write().await.errors.insert(sql.into(), error);
    }

    /// Make every connection opened so far report itself invalid
    pub fn invalidate_connections(&self) {
        self.generation.fetch_add(1, Ordering::SeqCst);
    }

    /// Number of connect calls so far
    pub async fn connect_count(&self) -> usize {
        self.state.read().await.connects.len()
    }

    /// Options passed to the most recent connect call
    pub async fn last_options(&self) -> Option<ConnectOptions> {
        self.state.read().await.connects.last().cloned()
    }

    /// Statements executed so far, in order
    pub async fn executed(&self) -> Vec<String> {
        self.state.read().await.executed.clone()
    }

    /// Simulate latency if configured
    async fn simulate_latency(&self) {
        if self.latency_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.latency_ms)).await;
        }
    }
}

impl Default for MockDriver {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl WarehouseDriver for MockDriver {
    fn name(&self) -> &'static str {
        self.driver_name
    }

    async fn connect(&self, options: &ConnectOptions) -> Result<Arc<dyn WarehouseConnection>, WarehouseError> {
        self.simulate_latency().await;
        self.state.write().await.connects.push(options.clone());

        if self.fail_connection {
            return Err(WarehouseError::Connection(
                "Simulated connection failure".to_string(),
            ));
        }

        Ok(Arc::new(MockConnection {
            driver: self.clone(),
            generation: self.generation.load(Ordering::SeqCst),
        }))
    }
}

/// Connection handed out by [`MockDriver`]
pub struct MockConnection {
    driver: MockDriver,
    generation: usize,
}

#[async_trait::async_trait]
impl WarehouseConnection for MockConnection {
    async fn is_valid(&self) -> bool {
        self.driver.generation.load(Ordering::SeqCst) == self.generation
    }

    async fn execute(&self, sql: &str) -> Result<Option<Vec<Row>>, WarehouseError> {
        self.driver.simulate_latency().await;

        let mut state = self.driver.state.write().await;
        state.executed.push(sql.to_string());

        if let Some(error) = state.errors.get(sql) {
            return Err(error.clone());
        }

        Ok(state.results.get(sql).cloned().flatten())
    }
}

/// Builder for creating MockDriver with predefined results
pub struct MockDriverBuilder {
    results: HashMap<String, Option<Vec<Row>>>,
    errors: HashMap<String, WarehouseError>,
    fail_connection: bool,
    latency_ms: u64,
    driver_name: &'static str,
}

impl MockDriverBuilder {
    /// Create a new builder
    pub fn new() -> Self {
        Self {
            results: HashMap::new(),
            errors: HashMap::new(),
            fail_connection: false,
            latency_ms: 0,
            driver_name: "Mock",
        }
    }

    /// Return `rows` for a statement
    pub fn with_result(mut self, sql: impl Into<String>, rows: Vec<Row>) -> Self {
        self.results.insert(sql.into(), Some(rows));
        self
    }

    /// Return an error for a statement
    pub fn with_error(mut self, sql: impl Into<String>, error: WarehouseError) -> Self {
        self.errors.insert(sql.into(), error);
        self
    }

    /// Configure connection failure
    pub fn with_connection_failure(mut self) -> Self {
        self.fail_connection = true;
        self
    }

    /// Configure latency
    pub fn with_latency(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }

    /// Set driver name
    pub fn with_name(mut self, name: &'static str) -> Self {
        self.driver_name = name;
        self
    }

    /// Build the MockDriver
    pub fn build(self) -> MockDriver {
        MockDriver {
            state: Arc::new(RwLock::new(MockState {
                results: self.results,
                errors: self.errors,
                ..MockState::default()
            })),
            generation: Arc::new(AtomicUsize::new(0)),
            fail_connection: self.fail_connection,
            latency_ms: self.latency_ms,
            driver_name: self.driver_name,
        }
    }
}

impl Default for MockDriverBuilder {
    fn default() -> Self {
        Self::new()
    }
}
