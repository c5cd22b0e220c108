//! # `docrag-indexer` Library Crate
//!
//! Builds the documentation knowledge base: reads a directory of markdown pages,
//! chunks and embeds them, and stores the chunks in the SQLite database the
//! server searches.

use anyhow::{Context, Result};
use clap::Parser;
use docrag::{
    constants::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_SIZE},
    ingest::load_markdown_dir,
    providers::{
        db::{
            sqlite::SqliteProvider,
            storage::{DocumentStore, EmbeddingStore},
        },
        factory::build_embedder,
    },
    types::EmbeddingConfig,
    BatchEmbedder, CacheConfig, EmbeddingCache, IndexOptions, IndexReport, Indexer, RetryPolicy,
};
use std::{path::PathBuf, sync::Arc};
use tracing::info;

// --- CLI Arguments ---

#[derive(Parser, Debug, Clone)]
#[command(author, version, about = "Index a directory of markdown documentation", long_about = None)]
pub struct Cli {
    /// Directory containing `.md` / `.mdx` pages. Searched recursively.
    pub dir: PathBuf,
    /// Public URL the directory is served under; page URLs are built from it.
    #[arg(long, env = "DOCRAG_BASE_URL")]
    pub base_url: String,
    /// Path to the SQLite database file.
    #[arg(long, env = "DB_URL", default_value = "db/docrag.db")]
    pub db: String,
    /// The API URL for the embedding model.
    #[arg(long, env = "EMBEDDINGS_API_URL")]
    pub embedding_api_url: String,
    /// The name of the embedding model to use.
    #[arg(long, env = "EMBEDDINGS_MODEL", default_value = "text-embedding-3-small")]
    pub embedding_model: String,
    #[arg(long, env = "EMBEDDINGS_API_KEY", hide_env_values = true)]
    pub embedding_api_key: Option<String>,
    /// `openai` or `gemini`. Detected from the API URL when omitted.
    #[arg(long, env = "EMBEDDINGS_PROVIDER")]
    pub embedding_provider: Option<String>,
    /// Requested vector size, for models that accept one.
    #[arg(long)]
    pub dimensions: Option<usize>,
    /// Texts per embedding request.
    #[arg(long)]
    pub batch_size: Option<usize>,
    /// Maximum characters per chunk.
    #[arg(long, default_value_t = DEFAULT_CHUNK_SIZE)]
    pub chunk_size: usize,
    /// Characters shared between consecutive chunks.
    #[arg(long, default_value_t = DEFAULT_OVERLAP_SIZE)]
    pub overlap: usize,
}

impl Cli {
    fn embedding_config(&self) -> EmbeddingConfig {
        EmbeddingConfig {
            provider: self.embedding_provider.clone(),
            api_url: self.embedding_api_url.clone(),
            model_name: self.embedding_model.clone(),
            api_key: self.embedding_api_key.clone(),
            dimensions: self.dimensions,
            batch_size: self.batch_size,
        }
    }
}

// --- Public Entrypoint ---

/// Indexes `cli.dir` into `cli.db` and returns the run's counts.
///
/// Pending cache writes are drained and the database is closed before returning,
/// whether or not indexing succeeded.
pub async fn run(cli: Cli) -> Result<IndexReport> {
    info!("Starting indexer with args: {:?}", cli.dir);
    let documents = load_markdown_dir(&cli.dir, &cli.base_url)
        .with_context(|| format!("Failed to read documentation from '{}'", cli.dir.display()))?;
    info!(documents = documents.len(), "Loaded source documents.");

    if let Some(parent) = PathBuf::from(&cli.db).parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create '{}'", parent.display()))?;
        }
    }

    let retry_policy = RetryPolicy::default();
    let store = Arc::new(SqliteProvider::new(&cli.db, retry_policy).await?);
    store.initialize_schema().await?;

    let embedding_config = cli.embedding_config();
    let cache_store: Arc<dyn EmbeddingStore> = store.clone();
    let cache = EmbeddingCache::new(cache_store, CacheConfig::default());
    let mut embedder = BatchEmbedder::new(build_embedder(&embedding_config)?, cache, retry_policy);
    if let Some(batch_size) = embedding_config.batch_size {
        embedder = embedder.with_batch_size(batch_size);
    }
    let embedder = Arc::new(embedder);

    let document_store: Arc<dyn DocumentStore> = store.clone();
    let indexer = Indexer::new(
        embedder.clone(),
        document_store,
        IndexOptions {
            chunk_size: cli.chunk_size,
            overlap_size: cli.overlap,
        },
    );
    let outcome = indexer.index_documents(&documents).await;

    embedder.cache().shutdown().await;
    store.shutdown().await;

    Ok(outcome?)
}

/// One-line human summary of a run.
pub fn format_report(report: &IndexReport) -> String {
    format!(
        "Indexed {} documents into {} chunks: {} inserted, {} already present, {} failed.",
        report.documents, report.chunks, report.inserted, report.skipped_existing, report.failed
    )
}
