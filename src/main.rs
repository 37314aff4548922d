//! # Corpus Engine Main Driver
//!
//! ## Purpose
//! Command-line entry point for the regulatory corpus engine: ingest known
//! documents, run full-text searches, and look up units, terms, citations,
//! and control mappings against the configured store.
//!
//! ## Input/Output Specification
//! - **Input**: Configuration file, subcommand arguments
//! - **Output**: JSON results on stdout, structured logs on stderr
//!
//! ## Key Features
//! - Backend selection (embedded or networked) purely through configuration
//! - Ingestion reads `<id>.txt` source files from a directory
//! - Health check subcommand for deployment probes

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use regulatory_corpus_search::{
    config::Config,
    errors::{CorpusError, Result},
    ingest::FileSourceFetcher,
    lookup::CorpusReader,
    store, IngestionPipeline, RetrievalEngine,
};

#[derive(Parser)]
#[command(
    name = "regcorpus",
    version,
    about = "Full-text search and citation graph over regulatory documents"
)]
struct Cli {
    /// Configuration file path
    #[arg(short, long, default_value = "config.toml")]
    config: PathBuf,

    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand)]
enum CliCommand {
    /// Ingest known documents from a directory of <id>.txt files
    Ingest {
        /// Directory holding raw source text
        #[arg(long, default_value = "sources")]
        sources: PathBuf,
        /// Ingest only this document id
        #[arg(long)]
        document: Option<String>,
    },
    /// Full-text search across articles and recitals
    Search {
        query: String,
        /// Maximum results to return
        #[arg(short, long)]
        limit: Option<i64>,
        /// Restrict the search to these document ids
        #[arg(short, long)]
        document: Vec<String>,
    },
    /// Look up one article or recital by locator
    Lookup { document: String, locator: String },
    /// Find defined terms containing a fragment
    Term {
        fragment: String,
        #[arg(long)]
        document: Option<String>,
    },
    /// List outbound citations of one article
    Refs { document: String, article: String },
    /// Show control mappings grouped by control identifier
    Controls {
        #[arg(long)]
        control: Option<String>,
        #[arg(long)]
        document: Option<String>,
    },
    /// Verify the configured store is reachable
    CheckHealth,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config = Config::from_file(&cli.config)?;
    init_logging(&config)?;
    info!(path = %cli.config.display(), "configuration loaded");

    let store = store::open(&config.store).await?;

    match cli.command {
        CliCommand::Ingest { sources, document } => {
            let pipeline = IngestionPipeline::new(
                &config.ingestion,
                Arc::new(FileSourceFetcher::new(sources)),
                store,
            );
            let documents: Vec<_> = match &document {
                Some(id) => config
                    .ingestion
                    .documents
                    .iter()
                    .filter(|d| d.id == *id)
                    .cloned()
                    .collect(),
                None => config.ingestion.documents.clone(),
            };
            if documents.is_empty() {
                return Err(CorpusError::Config {
                    message: match document {
                        Some(id) => format!("document '{id}' is not in the known-document registry"),
                        None => "no known documents configured under [ingestion]".to_string(),
                    },
                });
            }
            let reports = pipeline.ingest_all(&documents).await?;
            print_json(&reports)?;
        }
        CliCommand::Search {
            query,
            limit,
            document,
        } => {
            let engine = RetrievalEngine::new(config.search.clone(), store);
            let docs = (!document.is_empty()).then_some(document.as_slice());
            let hits = engine.search(&query, limit, docs).await?;
            print_json(&hits)?;
        }
        CliCommand::Lookup { document, locator } => {
            let reader = CorpusReader::new(store);
            match reader.get_unit(&document, &locator).await? {
                Some(unit) => print_json(&unit)?,
                None => println!("null"),
            }
        }
        CliCommand::Term { fragment, document } => {
            let reader = CorpusReader::new(store);
            let definitions = reader.lookup_term(document.as_deref(), &fragment).await?;
            print_json(&definitions)?;
        }
        CliCommand::Refs { document, article } => {
            let reader = CorpusReader::new(store);
            let references = reader.references_from(&document, &article).await?;
            print_json(&references)?;
        }
        CliCommand::Controls { control, document } => {
            let reader = CorpusReader::new(store);
            let mappings = reader
                .control_mappings(control.as_deref(), document.as_deref())
                .await?;
            print_json(&mappings)?;
        }
        CliCommand::CheckHealth => {
            store.health_check().await?;
            info!("store is reachable");
            println!("ok");
        }
    }

    Ok(())
}

/// Initialize logging and tracing. `RUST_LOG` overrides the configured level.
fn init_logging(config: &Config) -> Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.logging.level))
        .map_err(|e| CorpusError::Config {
            message: format!("invalid log level '{}': {e}", config.logging.level),
        })?;
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(true)
                .with_writer(std::io::stderr),
        )
        .with(filter)
        .init();
    Ok(())
}

fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
