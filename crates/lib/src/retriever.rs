use crate::{
    constants::EMBEDDING_DIMENSIONS, embedder::validate_embedding, errors::RagError,
    providers::db::storage::VectorSearch, types::DocumentRef,
};
use std::sync::Arc;
use tracing::debug;

/// Top-K nearest-neighbour retrieval over stored document embeddings.
#[derive(Debug, Clone)]
pub struct VectorRetriever {
    store: Arc<dyn VectorSearch>,
    dimensions: usize,
}

impl VectorRetriever {
    pub fn new(store: Arc<dyn VectorSearch>) -> Self {
        Self {
            store,
            dimensions: EMBEDDING_DIMENSIONS,
        }
    }

    /// Returns at most `k` passages ordered by ascending cosine distance to `query_vector`.
    ///
    /// The vector is validated before the store is queried; `k == 0` returns nothing.
    pub async fn retrieve(
        &self,
        query_vector: &[f32],
        k: usize,
    ) -> Result<Vec<DocumentRef>, RagError> {
        validate_embedding(0, query_vector, self.dimensions)?;
        if k == 0 {
            return Ok(Vec::new());
        }

        let mut passages = self.store.vector_search(query_vector, k).await?;
        passages.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        passages.truncate(k);
        debug!(k, found = passages.len(), "Retrieved passages.");
        Ok(passages)
    }
}
