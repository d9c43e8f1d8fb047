use std::sync::Arc;

use anyhow::{ Context, Result };
use clap::{ Parser, Subcommand, ValueEnum };
use serde::Serialize;
use serde_json::{ json, Value };
use tracing::info;
use tracing_subscriber::EnvFilter;

use record_embeddings::api::{ handle_ingest, handle_search, ErrorBody };
use record_embeddings::cancel::{ cancel_pair, CancelSignal };
use record_embeddings::config::EngineConfig;
use record_embeddings::embedder;
use record_embeddings::search::SemanticSearch;
use record_embeddings::store::SurrealStore;

/// Embed text records and rank them by semantic similarity.
#[derive(Parser, Debug)]
#[command(name = "record-embeddings", version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Embed TEXT and store it under --id (or a store-assigned id).
    Ingest {
        text: String,
        #[arg(long)]
        id: Option<String>,
    },
    /// Rank stored records against QUERY.
    Search {
        query: String,
        /// Number of results; anything but a positive integer means 5.
        #[arg(short, long)]
        limit: Option<String>,
    },
    /// Send a raw JSON request body to one of the operations.
    Call {
        #[arg(value_enum)]
        operation: Operation,
        body: String,
    },
}

#[derive(Copy, Clone, Debug, ValueEnum)]
enum Operation {
    Ingest,
    Search,
}

fn init_tracing() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr).init();
}

async fn build_engine(config: EngineConfig) -> Result<SemanticSearch> {
    let store = SurrealStore::connect(&config.store).await.with_context(||
        format!("opening record store at {}", config.store.path.display())
    )?;
    let embedder = embedder::from_config(&config)?;
    info!(model = %config.model, dimension = config.dimension, "Engine ready");
    Ok(SemanticSearch::new(config, embedder, Arc::new(store)))
}

fn print_json<T: Serialize>(outcome: Result<T, ErrorBody>) -> Result<bool> {
    let (body, ok) = match outcome {
        Ok(body) => (serde_json::to_value(body)?, true),
        Err(err) => (serde_json::to_value(err)?, false),
    };
    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(ok)
}

async fn run(engine: &SemanticSearch, operation: Operation, body: &Value, cancel: &CancelSignal) -> Result<bool> {
    match operation {
        Operation::Ingest => print_json(handle_ingest(engine, body, cancel).await),
        Operation::Search => print_json(handle_search(engine, body, cancel).await),
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    let cli = Cli::parse();
    let config = EngineConfig::from_env().context("loading configuration")?;
    let engine = build_engine(config).await?;

    let (handle, cancel) = cancel_pair();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            handle.cancel();
        }
    });

    let (operation, body) = match cli.command {
        Commands::Ingest { text, id } => (Operation::Ingest, json!({ "id": id, "text": text })),
        Commands::Search { query, limit } =>
            (Operation::Search, json!({ "query": query, "limit": limit })),
        Commands::Call { operation, body } => {
            let body: Value = serde_json::from_str(&body).context("request body is not JSON")?;
            (operation, body)
        }
    };

    if !run(&engine, operation, &body, &cancel).await? {
        std::process::exit(1);
    }
    Ok(())
}
