//! # Provider Factory
//!
//! Builds generation and embedding providers from configuration. Any consumer
//! (the server, the indexer CLI) goes through these functions so that provider
//! selection behaves the same everywhere.

use crate::{
    errors::RagError,
    providers::ai::{
        EmbeddingApi, Embedder, GeminiProvider, Generator, HttpEmbedder, OpenAiProvider,
    },
    types::{EmbeddingConfig, ProviderConfig},
};
use std::{collections::HashMap, sync::Arc};
use tracing::info;

const GEMINI_MODELS_URL: &str = "https://generativelanguage.googleapis.com/v1beta/models";

/// Creates one generation provider from its configuration.
pub fn build_generator(
    name: &str,
    config: &ProviderConfig,
) -> Result<Arc<dyn Generator>, RagError> {
    let provider: Arc<dyn Generator> = match config.provider.as_str() {
        "gemini" => {
            let api_key = config.api_key.clone().ok_or_else(|| {
                RagError::MissingProvider(format!(
                    "api_key is required for gemini provider '{name}'"
                ))
            })?;
            // If api_url is not provided, construct it from the model name.
            let api_url = config
                .api_url
                .clone()
                .unwrap_or_else(|| format!("{GEMINI_MODELS_URL}/{}", config.model_name));
            Arc::new(GeminiProvider::new(api_url, api_key)?)
        }
        "openai" | "local" => {
            let api_url = config.api_url.clone().ok_or_else(|| {
                RagError::MissingProvider(format!(
                    "api_url is required for {} provider '{name}'",
                    config.provider
                ))
            })?;
            Arc::new(
                OpenAiProvider::new(
                    api_url,
                    config.api_key.clone(),
                    Some(config.model_name.clone()),
                )?
                .with_headers(config.headers.clone()),
            )
        }
        other => {
            return Err(RagError::MissingProvider(format!(
                "Unsupported provider type '{other}' for provider '{name}'"
            )));
        }
    };
    info!(
        provider = %name,
        kind = %config.provider,
        model = %config.model_name,
        "Configured generation provider."
    );
    Ok(provider)
}

/// Creates every named generation provider in `providers`.
pub fn build_generators(
    providers: &HashMap<String, ProviderConfig>,
) -> Result<HashMap<String, Arc<dyn Generator>>, RagError> {
    providers
        .iter()
        .map(|(name, config)| {
            build_generator(name, config).map(|provider| (name.clone(), provider))
        })
        .collect()
}

/// Creates the embedding provider.
pub fn build_embedder(config: &EmbeddingConfig) -> Result<Arc<dyn Embedder>, RagError> {
    let mut embedder = HttpEmbedder::new(
        config.api_url.clone(),
        config.model_name.clone(),
        config.api_key.clone(),
    )?
    .with_dimensions(config.dimensions);
    match config.provider.as_deref() {
        None => {}
        Some("gemini") => embedder = embedder.with_api(EmbeddingApi::Gemini),
        Some("openai") | Some("local") => embedder = embedder.with_api(EmbeddingApi::OpenAi),
        Some(other) => {
            return Err(RagError::MissingProvider(format!(
                "Unsupported embedding provider type '{other}'"
            )));
        }
    }
    info!(model = %config.model_name, "Configured embedding provider.");
    Ok(Arc::new(embedder))
}
