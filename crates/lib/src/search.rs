//! # Semantic Search
//!
//! Embeds a query and returns the nearest stored passages, without generation.

use crate::{
    embedder::BatchEmbedder, errors::RagError, retriever::VectorRetriever, types::DocumentRef,
};
use tracing::info;

/// Returns up to `limit` passages closest to `query`, nearest first.
pub async fn search(
    embedder: &BatchEmbedder,
    retriever: &VectorRetriever,
    query: &str,
    limit: usize,
) -> Result<Vec<DocumentRef>, RagError> {
    let query = query.trim();
    if query.is_empty() {
        return Err(RagError::Validation("Missing query parameter".to_string()));
    }

    let query_vector = embedder.embed(query).await?;
    let results = retriever.retrieve(&query_vector, limit).await?;
    info!(limit, found = results.len(), "Search completed.");
    Ok(results)
}
