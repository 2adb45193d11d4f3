use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use colored::Colorize;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use querybridge_core::{Config, VectorStoreConfig};
use querybridge_engine::{QueryHandler, QueryRequest, TableIndexer};
use querybridge_rag::{Embedder, HashingEmbedder, HttpEmbedder, HttpLanguageModel, InMemoryVectorStore};
use querybridge_warehouse::{
    ConnectionManager, EnvSecretStore, JsonFileSecretStore, SecretStore, SnowflakeDriver,
};

const DEFAULT_CONFIG_FILE: &str = "querybridge.toml";
const DEFAULT_SECRETS_PREFIX: &str = "QUERYBRIDGE_SECRET_";

/// QueryBridge - Ask your warehouse questions in plain language
#[derive(Parser)]
#[command(name = "querybridge")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to config file (default: querybridge.toml, then environment)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Crawl warehouse table metadata into the vector index
    Index,

    /// Answer a natural-language question with warehouse rows
    Ask {
        /// The question, e.g. "Find the titles with genres containing 'action'"
        question: String,
    },

    /// Handle an invocation event of the form {"human": "..."}
    Handle {
        /// Event file (reads stdin when omitted)
        #[arg(short, long)]
        event: Option<PathBuf>,
    },

    /// Verify the warehouse credential and connection
    CheckConnection,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    dotenvy::dotenv().ok();
    init_tracing(cli.verbose);

    let config = load_config(cli.config.as_deref(), cli.verbose)?;

    match cli.command {
        Commands::Index => index_command(&config, cli.verbose).await,
        Commands::Ask { question } => ask_command(&config, &question, cli.verbose).await,
        Commands::Handle { event } => handle_command(&config, event.as_deref()).await,
        Commands::CheckConnection => check_connection_command(&config, cli.verbose).await,
    }
}

/// Log to stderr; `RUST_LOG` wins, then `LOG_LEVEL`, then info (debug with --verbose)
fn init_tracing(verbose: bool) {
    let fallback = if verbose { "debug" } else { "info" };
    let default_level = std::env::var("LOG_LEVEL")
        .map(|level| level.to_lowercase())
        .unwrap_or_else(|_| fallback.to_string());

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level));

    tracing_subscriber::registry()
        .with(fmt::layer().with_writer(std::io::stderr))
        .with(filter)
        .init();
}

fn load_config(path: Option<&Path>, verbose: bool) -> Result<Config> {
    if let Some(path) = path {
        return Config::from_file(path).with_context(|| format!("Failed to load {}", path.display()));
    }

    let default_path = Path::new(DEFAULT_CONFIG_FILE);
    if default_path.exists() {
        return Config::from_file(default_path).with_context(|| format!("Failed to load {}", DEFAULT_CONFIG_FILE));
    }

    if verbose {
        eprintln!("{}", "No config file found, reading environment".yellow());
    }
    Config::from_env().context("Failed to read configuration from environment")
}

fn secret_store(config: &Config) -> Result<Arc<dyn SecretStore>> {
    if let Some(file) = &config.secrets.file {
        return Ok(Arc::new(JsonFileSecretStore::new(file)));
    }

    let warehouse = warehouse_config(config)?;
    let prefix = config
        .secrets
        .env_prefix
        .clone()
        .unwrap_or_else(|| DEFAULT_SECRETS_PREFIX.to_string());
    let key = warehouse.credential.secret_locator().key.clone();

    Ok(Arc::new(EnvSecretStore::new(prefix, vec![key])))
}

fn warehouse_config(config: &Config) -> Result<&querybridge_core::WarehouseConfig> {
    config.warehouse.as_ref().ok_or_else(|| {
        anyhow::anyhow!(
            "No warehouse configuration found. Add a [warehouse] section to {} \
             or set SNOWFLAKE_ACCOUNT and related variables.",
            DEFAULT_CONFIG_FILE
        )
    })
}

fn connection_manager(config: &Config) -> Result<Arc<ConnectionManager>> {
    let warehouse = warehouse_config(config)?.clone();
    let secrets = secret_store(config)?;

    Ok(Arc::new(ConnectionManager::new(
        warehouse,
        secrets,
        Arc::new(SnowflakeDriver::new()),
    )))
}

async fn vector_store(config: &VectorStoreConfig) -> Result<Arc<InMemoryVectorStore>> {
    let embedder: Arc<dyn Embedder> = match &config.embeddings.endpoint {
        Some(endpoint) => Arc::new(HttpEmbedder::new(
            endpoint.clone(),
            config.embeddings.model.clone(),
            std::env::var("EMBEDDINGS_API_KEY").ok(),
        )),
        None => Arc::new(HashingEmbedder::new(config.embeddings.dimensions)),
    };

    match &config.path {
        Some(path) => Ok(Arc::new(
            InMemoryVectorStore::open(config.index_name.clone(), embedder, path)
                .await
                .with_context(|| format!("Failed to open vector index at {}", path.display()))?,
        )),
        None => {
            tracing::warn!("No vector_store.path configured; the index lives only for this invocation");
            Ok(Arc::new(InMemoryVectorStore::new(config.index_name.clone(), embedder)))
        }
    }
}

async fn query_handler(config: &Config) -> Result<QueryHandler> {
    let store = vector_store(&config.vector_store).await?;
    let model = Arc::new(HttpLanguageModel::new(
        config.model.endpoint.clone(),
        std::env::var("MODEL_API_KEY").ok(),
    ));

    Ok(QueryHandler::new(store, model, connection_manager(config)?)
        .with_model_config(config.model.clone())
        .with_config(config.handler.clone()))
}

/// Index command - crawl table metadata into the vector index
async fn index_command(config: &Config, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("{}", "Indexing table metadata...".cyan());
    }

    let store = vector_store(&config.vector_store).await?;
    let indexer = TableIndexer::new(connection_manager(config)?, store.clone());

    let documents = indexer
        .index_tables()
        .await
        .map_err(|e| anyhow::anyhow!("Indexing failed: {}", e))?;

    if documents.is_empty() {
        println!("{}", "No tables found".yellow());
        return Ok(());
    }

    for document in &documents {
        println!("  {} {} ({} columns)", "+".green(), document.qualified_name(), document.columns.len());
    }
    println!(
        "{} Indexed {} tables into '{}' ({} documents total)",
        "✓".green(),
        documents.len(),
        store.index_name(),
        store.len().await
    );

    Ok(())
}

/// Ask command - answer a question and print the rows
async fn ask_command(config: &Config, question: &str, verbose: bool) -> Result<()> {
    if verbose {
        eprintln!("{} {}", "Question:".cyan(), question);
    }

    let handler = query_handler(config).await?;
    let response = handler
        .answer(question)
        .await
        .map_err(|e| anyhow::anyhow!("Query failed: {}", e))?;

    if response.results.is_nothing() {
        eprintln!("{}", "No answer: no matching metadata or no SQL generated".yellow());
    } else if let Some(rows) = response.results.rows() {
        eprintln!("{} {} rows", "✓".green(), rows.len());
    }

    println!("{}", serde_json::to_string_pretty(&response)?);
    Ok(())
}

/// Handle command - process a {"human": ...} event and print the response JSON
async fn handle_command(config: &Config, event: Option<&Path>) -> Result<()> {
    let payload = match event {
        Some(path) => {
            std::fs::read_to_string(path).with_context(|| format!("Failed to read event {}", path.display()))?
        }
        None => {
            let mut buffer = String::new();
            std::io::stdin()
                .read_to_string(&mut buffer)
                .context("Failed to read event from stdin")?;
            buffer
        }
    };

    let request: QueryRequest = serde_json::from_str(&payload).context("Event must be a JSON object with a 'human' field")?;
    tracing::info!(service = "TextToSql", event = %payload.trim(), "Event");

    let handler = query_handler(config).await?;
    let response = handler
        .handle(&request)
        .await
        .map_err(|e| anyhow::anyhow!("Query failed: {}", e))?;

    println!("{}", serde_json::to_string(&response)?);
    Ok(())
}

/// Check-connection command - resolve the credential and run SELECT 1
async fn check_connection_command(config: &Config, verbose: bool) -> Result<()> {
    let warehouse = warehouse_config(config)?;
    if verbose {
        eprintln!(
            "{} {} as {} ({})",
            "Connecting to".cyan(),
            warehouse.account_host(),
            warehouse.credential.principal(),
            warehouse.credential.kind()
        );
    }

    connection_manager(config)?
        .test_connection()
        .await
        .map_err(|e| anyhow::anyhow!("Failed to connect to warehouse: {}", e))?;

    println!("{}", "✓ Connection successful".green());
    Ok(())
}
