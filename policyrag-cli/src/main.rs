//! PolicyRAG CLI - administrative front-end for the retrieval pipeline
//!
//! # Commands
//!
//! ```bash
//! # Build (or rebuild) the vector store from the policies directory
//! policyrag ingest data/policies
//!
//! # Ask a question, printing the retrieved context
//! policyrag search "How many casual leaves do I get?" -k 3
//!
//! # Preview how a document would be chunked
//! policyrag chunk data/policies/leave.txt --size 1000 --overlap 100
//!
//! # Show what the store was built with
//! policyrag status
//! ```

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use policyrag_lib::{
    chunk::{self, ChunkMetadata},
    config::{ChunkingSettings, ChunkingStrategy, Settings},
    document,
    ingest::Ingestor,
    search::{self, Retriever},
    store::{PersistentStore, VectorStore},
    Error,
};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "policyrag")]
#[command(about = "Semantic retrieval over policy documents")]
#[command(version)]
struct Cli {
    /// Path to a TOML config file (defaults to ./policyrag.toml if present)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Clone, Copy, ValueEnum)]
enum Strategy {
    Recursive,
    Fixed,
}

impl From<Strategy> for ChunkingStrategy {
    fn from(s: Strategy) -> Self {
        match s {
            Strategy::Recursive => ChunkingStrategy::Recursive,
            Strategy::Fixed => ChunkingStrategy::Fixed,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Load, chunk and embed every policy document, replacing the store
    Ingest {
        /// Directory of policy documents (defaults to documents_dir from config)
        dir: Option<PathBuf>,
    },

    /// Retrieve the most relevant policy passages for a question
    Search {
        /// Question to search for
        query: String,

        /// Number of passages to return (defaults to search.top_k from config)
        #[arg(short)]
        k: Option<usize>,
    },

    /// Chunk a document and show the result without embedding it
    Chunk {
        /// Input file to chunk
        input: PathBuf,

        /// Chunking strategy (defaults to chunking.strategy from config)
        #[arg(short, long, value_enum)]
        strategy: Option<Strategy>,

        /// Maximum chunk size in characters
        #[arg(long)]
        size: Option<usize>,

        /// Characters shared by adjacent chunks
        #[arg(long)]
        overlap: Option<usize>,
    },

    /// Show the state of the vector store
    Status,
}

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize logging
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let cli = Cli::parse();
    let settings = Settings::load(cli.config.as_deref()).context("failed to load configuration")?;

    match cli.command {
        Commands::Ingest { dir } => {
            let dir = dir.unwrap_or_else(|| settings.documents_dir.clone());
            let ingestor = Ingestor::from_settings(&settings)?;
            let report = ingestor
                .ingest(&dir)
                .await
                .with_context(|| format!("ingestion of {} failed", dir.display()))?;

            println!(
                "Loaded {} documents, {} chunks, {} records written to {}",
                report.documents,
                report.chunks,
                report.records,
                ingestor.store_dir().display()
            );
            for skipped in &report.skipped {
                println!("  skipped {}: {}", skipped.path.display(), skipped.reason);
            }
            if !report.committed() {
                println!(
                    "No documents indexed in {}; existing store left untouched.",
                    dir.display()
                );
            }
        }

        Commands::Search { query, k } => {
            let k = k.unwrap_or(settings.search.top_k);
            match Retriever::from_settings(&settings) {
                Ok(retriever) => println!("{}", retriever.retrieve(&query, k).await),
                Err(e) => println!("{}", search::error_text(&e)),
            }
        }

        Commands::Chunk {
            input,
            strategy,
            size,
            overlap,
        } => {
            let chunking = ChunkingSettings {
                strategy: strategy.map(Into::into).unwrap_or(settings.chunking.strategy),
                chunk_size: size.unwrap_or(settings.chunking.chunk_size),
                overlap: overlap.unwrap_or(settings.chunking.overlap),
            };
            let chunker = chunk::from_settings(&chunking)?;
            let doc = document::load(&input)?;

            let mut total = 0;
            for page in &doc.pages {
                let meta = ChunkMetadata {
                    source_id: doc.source_id.clone(),
                    page: page.number,
                    sequence: total,
                    ..ChunkMetadata::default()
                };
                for chunk in chunker.chunk(&page.text, meta) {
                    total += 1;
                    let page = chunk
                        .metadata
                        .page
                        .map(|p| format!(", page {p}"))
                        .unwrap_or_default();
                    println!(
                        "--- Chunk {} ({} chars{page}, id: {}) ---",
                        chunk.metadata.sequence + 1,
                        chunk.metadata.char_length,
                        &chunk.id[..8]
                    );
                    // Show preview (first 200 chars)
                    let preview: String = chunk.content.chars().take(200).collect();
                    let ellipsis = if chunk.metadata.char_length > 200 { "..." } else { "" };
                    println!("{preview}{ellipsis}\n");
                }
            }
            println!(
                "Chunked '{}' into {total} chunks using {} strategy",
                input.display(),
                chunker.name()
            );
        }

        Commands::Status => match PersistentStore::open(&settings.store_dir).await {
            Ok(store) => {
                let m = store.manifest();
                println!("Store:      {}", store.dir().display());
                println!("Records:    {}", store.len());
                println!("Model:      {} ({} dims)", m.model, m.dimension);
                println!("Chunking:   {} chars, {} overlap", m.chunk_size, m.overlap);
            }
            Err(Error::StoreNotFound(dir)) => {
                println!("No vector store at {}; run `policyrag ingest` first.", dir.display());
            }
            Err(e) => return Err(e.into()),
        },
    }

    Ok(())
}
