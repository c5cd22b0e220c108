//! # Application State
//!
//! This module defines the shared application state (`AppState`) and the logic
//! for building it at startup. The `AppState` holds the shared store, the
//! embedding pipeline and the chat orchestrator, making them accessible to all
//! request handlers.

use crate::config::AppConfig;
use anyhow::anyhow;
use docrag::{
    providers::{
        ai::Generator,
        db::{sqlite::SqliteProvider, storage::EmbeddingStore},
        factory::{build_embedder, build_generators},
    },
    BatchEmbedder, EmbeddingCache, RagOrchestrator, VectorRetriever,
};
use std::{collections::HashMap, path::Path, sync::Arc};
use tracing::info;

/// The shared application state, accessible from all request handlers.
#[derive(Clone, Debug)]
pub struct AppState {
    /// The application's configuration, loaded from `config.yml`.
    pub config: Arc<AppConfig>,
    /// Document store, embedding cache table and interaction log.
    pub sqlite_provider: Arc<SqliteProvider>,
    pub embedder: Arc<BatchEmbedder>,
    pub retriever: VectorRetriever,
    pub orchestrator: Arc<RagOrchestrator>,
}

impl AppState {
    /// Drains pending cache writes and closes the store.
    pub async fn shutdown(&self) {
        self.embedder.cache().shutdown().await;
        self.sqlite_provider.shutdown().await;
        info!("Application state shut down.");
    }
}

fn named_provider(
    providers: &HashMap<String, Arc<dyn Generator>>,
    name: &str,
) -> anyhow::Result<Arc<dyn Generator>> {
    providers
        .get(name)
        .cloned()
        .ok_or_else(|| anyhow!("Chat provider '{name}' is not defined in 'providers'"))
}

/// Builds the shared application state from the configuration.
///
/// This function initializes all necessary services:
/// - a generation provider for each entry in the `providers` section;
/// - the embedding provider, behind the embedding cache;
/// - the SQLite store, with its schema in place.
pub async fn build_app_state(config: AppConfig) -> anyhow::Result<AppState> {
    let generators = build_generators(&config.providers)?;
    let generator = named_provider(&generators, &config.chat.provider)?;
    let follow_up_generator = match &config.chat.follow_up_provider {
        Some(name) => named_provider(&generators, name)?,
        None => generator.clone(),
    };

    if config.db_url != ":memory:" {
        if let Some(parent) = Path::new(&config.db_url).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
    }
    let sqlite_provider = Arc::new(SqliteProvider::new(&config.db_url, config.retry).await?);
    info!(db_path = %config.db_url, "Initialized local storage provider (SQLite).");
    sqlite_provider.initialize_schema().await?;

    let cache_store: Arc<dyn EmbeddingStore> = sqlite_provider.clone();
    let cache = EmbeddingCache::new(cache_store, config.cache.clone());
    let mut embedder = BatchEmbedder::new(build_embedder(&config.embedding)?, cache, config.retry);
    if let Some(batch_size) = config.embedding.batch_size {
        embedder = embedder.with_batch_size(batch_size);
    }
    let embedder = Arc::new(embedder);

    let retriever = VectorRetriever::new(sqlite_provider.clone());
    let orchestrator = RagOrchestrator::new(
        embedder.clone(),
        retriever.clone(),
        generator,
        config.chat.options.clone(),
    )
    .with_follow_up_generator(follow_up_generator)
    .with_interaction_log(sqlite_provider.clone())
    .with_retry_policy(config.retry);

    Ok(AppState {
        config: Arc::new(config),
        sqlite_provider,
        embedder,
        retriever,
        orchestrator: Arc::new(orchestrator),
    })
}
