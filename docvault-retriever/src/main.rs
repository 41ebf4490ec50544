//! docvault CLI: index, search, and maintain the semantic document store.

use anyhow::Result;
use clap::{Parser, Subcommand};
use docvault_embed::{EmbedConfig, EmbeddingProvider, FastEmbedProvider, HashEmbedProvider};
use docvault_retriever::retrieval::{
    IndexRequest, RetrievalConfig, RetrievalEngine, SearchFilters, SearchRequest,
};
use std::fs;
use std::io::Read;
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(author, version, about = "Semantic document retrieval engine", long_about = None)]
struct Cli {
    /// Directory holding the index artifacts.
    #[arg(long, default_value = "data/docvault")]
    index_dir: PathBuf,

    /// Use the deterministic hashing embedder instead of the ONNX model
    /// (no downloads; lexical-overlap quality only).
    #[arg(long)]
    offline: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Chunk, embed, and index a document.
    Index {
        /// Identifier for the document.
        document_id: String,
        /// Path to the document text; reads stdin when omitted.
        #[arg(short, long)]
        input: Option<PathBuf>,
        /// Chunking strategy: paragraph, sentence, or fixed_size.
        #[arg(long, default_value = "paragraph")]
        strategy: String,
        /// Document type tag, usable as a search filter.
        #[arg(long)]
        document_type: Option<String>,
        /// Reindex even if the document is already present.
        #[arg(long)]
        force: bool,
    },
    /// Query the indices.
    Search {
        query: String,
        /// Search type: document, chunk, or hybrid.
        #[arg(long, default_value = "hybrid")]
        search_type: String,
        #[arg(long, default_value_t = 10)]
        top_k: usize,
        #[arg(long, default_value_t = 0.0)]
        min_score: f32,
        /// Restrict results to these document types.
        #[arg(long, value_delimiter = ',')]
        document_types: Option<Vec<String>>,
        /// Include matching chunk excerpts in the output.
        #[arg(long)]
        chunks: bool,
    },
    /// Tombstone all vectors of a document.
    Remove { document_id: String },
    /// Rebuild both indices, reclaiming tombstoned storage.
    Rebuild,
    /// Show vector counts.
    Stats,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();

    let embedder: Arc<dyn EmbeddingProvider> = if cli.offline {
        Arc::new(HashEmbedProvider::new(384))
    } else {
        Arc::new(FastEmbedProvider::create(EmbedConfig::default()).await?)
    };

    let config = RetrievalConfig::new(&cli.index_dir)
        .with_dimension(embedder.embedding_dimension());
    let engine = RetrievalEngine::new(config, embedder).await?;

    match cli.command {
        Command::Index {
            document_id,
            input,
            strategy,
            document_type,
            force,
        } => {
            let text = read_input(input.as_deref())?;
            let strategy = strategy.parse().map_err(anyhow::Error::msg)?;
            let mut request = IndexRequest::new(document_id, text)
                .with_strategy(strategy)
                .with_force(force);
            if let Some(document_type) = document_type {
                request = request.with_document_type(document_type);
            }
            let outcome = engine.embed_and_index(request).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Search {
            query,
            search_type,
            top_k,
            min_score,
            document_types,
            chunks,
        } => {
            let search_type = search_type.parse().map_err(anyhow::Error::msg)?;
            let request = SearchRequest::new(query, search_type)
                .with_top_k(top_k)
                .with_min_score(min_score)
                .with_filters(SearchFilters {
                    document_types,
                    ..Default::default()
                })
                .with_include_chunks(chunks);
            let response = engine.search(request).await?;
            println!("{}", serde_json::to_string_pretty(&response)?);
        }
        Command::Remove { document_id } => {
            let outcome = engine.remove_document(&document_id).await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Rebuild => {
            let outcome = engine.rebuild_index().await?;
            println!("{}", serde_json::to_string_pretty(&outcome)?);
        }
        Command::Stats => {
            let stats = engine.get_index_stats();
            println!("{}", serde_json::to_string_pretty(&stats)?);
        }
    }

    Ok(())
}

fn read_input(path: Option<&std::path::Path>) -> Result<String> {
    match path {
        Some(path) => Ok(fs::read_to_string(path)?),
        None => {
            let mut buffer = String::new();
            std::io::stdin().read_to_string(&mut buffer)?;
            Ok(buffer)
        }
    }
}
