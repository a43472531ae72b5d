use spyne_nlq::config::Settings;
use spyne_nlq::llm::LlmClient;
use spyne_nlq::query_builder::QueryBuilder;
use spyne_nlq::schema::{load_schema_cache, save_schema_cache};
use spyne_nlq::{BackendKind, QueryOptions};

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "spyne-nlq")]
#[command(about = "Ask PostgreSQL or MongoDB questions in natural language")]
#[command(version)]
struct Args {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Generate, execute and summarize a query
    Ask {
        /// Backend to query: postgres or mongodb
        db_type: String,

        /// The request in natural language
        query: String,

        /// Table or collection to query instead of letting the LLM choose
        #[arg(long)]
        target: Option<String>,

        /// Override POSTGRES_SSLMODE for this run
        #[arg(long)]
        ssl_mode: Option<String>,

        /// Schema snapshot to use when no query needs narrowing
        #[arg(long)]
        schema_cache: Option<PathBuf>,
    },
    /// Print the introspected schema, optionally narrowed to a goal
    Schema {
        /// Backend to inspect: postgres or mongodb
        db_type: String,

        /// Goal used to pick the most relevant table or collection
        query: Option<String>,

        /// Write the schema as JSON to this file
        #[arg(long)]
        save: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() {
    dotenv::dotenv().ok();

    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();

    let outcome = match args.command {
        Commands::Ask { db_type, query, target, ssl_mode, schema_cache } => {
            run_ask(db_type, query, target, ssl_mode, schema_cache).await
        }
        Commands::Schema { db_type, query, save } => run_schema(db_type, query, save).await,
    };

    if let Err(e) = outcome {
        error!("{:#}", e);
        eprintln!("Failed: {:#}", e);
        std::process::exit(1);
    }
}

async fn open_session(
    settings: &Settings,
    db_type: &str,
    ssl_mode: Option<String>,
) -> Result<QueryBuilder> {
    let kind: BackendKind = db_type.parse()?;

    let descriptor = match (kind, ssl_mode) {
        (BackendKind::Relational, Some(mode)) => spyne_nlq::ConnectionDescriptor::new(
            kind,
            settings.postgres_connection_string(Some(&mode))?,
        ),
        _ => settings.resolve(kind)?,
    };
    info!("Connecting to database: {}", descriptor.redacted());

    let llm = LlmClient::new(settings.llm_settings()?);
    info!("Using LLM model {}", llm.model());

    let builder = QueryBuilder::connect(&descriptor, Arc::new(llm), &settings.postgres_schema())
        .await
        .context("Failed to open database session")?;
    Ok(builder)
}

async fn run_ask(
    db_type: String,
    query: String,
    target: Option<String>,
    ssl_mode: Option<String>,
    schema_cache: Option<PathBuf>,
) -> Result<()> {
    let settings = Settings::from_env();
    let mut builder = open_session(&settings, &db_type, ssl_mode).await?;

    if let Some(path) = schema_cache {
        let cache = load_schema_cache(&path)
            .with_context(|| format!("Failed to read schema cache {}", path.display()))?;
        builder = builder.with_schema_cache(cache);
    }

    info!("Generating query for: {}", query);
    let options = QueryOptions { target };
    let outcome = builder.process(&query, &options).await?;

    println!("\n=== Query ===");
    println!("{}", outcome.query);
    if let Some(target) = &outcome.target {
        println!("\nTarget: {}", target);
    }
    println!("\nRows returned: {}", outcome.results.len());
    println!("\n=== Result Interpretation ===");
    println!("{}", outcome.summary);

    Ok(())
}

async fn run_schema(db_type: String, query: Option<String>, save: Option<PathBuf>) -> Result<()> {
    let settings = Settings::from_env();
    let builder = open_session(&settings, &db_type, None).await?;

    let schema = builder.get_schema(query.as_deref()).await?;
    println!("{}", builder.format_schema(&schema));

    if let Some(path) = save {
        save_schema_cache(&path, &schema)
            .with_context(|| format!("Failed to write schema cache {}", path.display()))?;
        info!("Schema written to {}", path.display());
    }

    Ok(())
}
