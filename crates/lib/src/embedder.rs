//! # Batch Embedding
//!
//! Turns texts into validated embeddings, consulting the [`EmbeddingCache`] first
//! and calling the provider only for texts it has not seen.

use crate::{
    cache::EmbeddingCache,
    constants::{EMBEDDING_DIMENSIONS, PROVIDER_BATCH_SIZE},
    errors::RagError,
    hash::hash_string,
    providers::ai::Embedder,
    retry::{retry, RetryPolicy},
    types::CacheEntry,
};
use futures::future::join_all;
use std::sync::Arc;
use tracing::{debug, info};

/// Checks that `embedding` has exactly `expected` finite components.
pub fn validate_embedding(
    index: usize,
    embedding: &[f32],
    expected: usize,
) -> Result<(), RagError> {
    if embedding.len() != expected {
        return Err(RagError::EmbeddingShape {
            index,
            expected,
            actual: embedding.len(),
        });
    }
    if let Some(position) = embedding.iter().position(|v| !v.is_finite()) {
        return Err(RagError::EmbeddingNotFinite { index, position });
    }
    Ok(())
}

#[derive(Debug, Clone)]
pub struct BatchEmbedder {
    provider: Arc<dyn Embedder>,
    cache: EmbeddingCache,
    retry_policy: RetryPolicy,
    batch_size: usize,
    dimensions: usize,
}

impl BatchEmbedder {
    pub fn new(
        provider: Arc<dyn Embedder>,
        cache: EmbeddingCache,
        retry_policy: RetryPolicy,
    ) -> Self {
        Self {
            provider,
            cache,
            retry_policy,
            batch_size: PROVIDER_BATCH_SIZE,
            dimensions: EMBEDDING_DIMENSIONS,
        }
    }

    /// Overrides the number of texts sent per provider request.
    pub fn with_batch_size(mut self, batch_size: usize) -> Self {
        self.batch_size = batch_size.max(1);
        self
    }

    /// Texts sent per provider request.
    pub fn batch_size(&self) -> usize {
        self.batch_size
    }

    pub fn cache(&self) -> &EmbeddingCache {
        &self.cache
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Embeds a single text: cache, then one provider call, then a queued cache write.
    ///
    /// There is no retry here; a provider failure is returned to the caller. The
    /// cache write is not awaited, and a failed write is only logged and counted.
    pub async fn embed(&self, text: &str) -> Result<Vec<f32>, RagError> {
        if let Some(embedding) = self.cache.get(text).await {
            debug!("Embedding cache hit.");
            return Ok(embedding);
        }

        let input = [text.to_string()];
        let mut vectors = self.provider.embed(&input).await?;
        if vectors.len() != 1 {
            return Err(RagError::EmbeddingCount {
                expected: 1,
                actual: vectors.len(),
            });
        }
        let embedding = vectors.remove(0);
        validate_embedding(0, &embedding, self.dimensions)?;

        self.cache.enqueue(vec![CacheEntry {
            hash: hash_string(text),
            text: text.to_string(),
            embedding: embedding.clone(),
        }]);
        Ok(embedding)
    }

    /// Embeds many texts and returns one vector per text, in input order.
    ///
    /// Cached texts are served from the cache. The rest go to the provider in
    /// sub-batches, each retried on transient provider errors. Any invalid vector
    /// fails its whole sub-batch and nothing from that sub-batch is cached. New
    /// vectors are queued for background caching; a full queue makes this call
    /// wait for room rather than drop them.
    pub async fn embed_batch(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }

        let cached = join_all(texts.iter().map(|t| self.cache.get(t))).await;
        let mut results: Vec<Option<Vec<f32>>> = cached;
        let missing: Vec<usize> = results
            .iter()
            .enumerate()
            .filter(|(_, r)| r.is_none())
            .map(|(i, _)| i)
            .collect();

        info!(
            total = texts.len(),
            cached = texts.len() - missing.len(),
            to_embed = missing.len(),
            "Embedding batch."
        );

        for positions in missing.chunks(self.batch_size) {
            let batch: Vec<String> = positions.iter().map(|&i| texts[i].clone()).collect();
            let batch = batch.as_slice();
            let vectors = retry(
                &self.retry_policy,
                "embedding sub-batch",
                RagError::is_transient_provider_error,
                |_| self.provider.embed(batch),
            )
            .await?;

            if vectors.len() != batch.len() {
                return Err(RagError::EmbeddingCount {
                    expected: batch.len(),
                    actual: vectors.len(),
                });
            }
            for (&position, vector) in positions.iter().zip(&vectors) {
                validate_embedding(position, vector, self.dimensions)?;
            }

            let entries = batch
                .iter()
                .zip(&vectors)
                .map(|(text, vector)| CacheEntry {
                    hash: hash_string(text),
                    text: text.clone(),
                    embedding: vector.clone(),
                })
                .collect();
            self.cache.enqueue_wait(entries).await;

            for (&position, vector) in positions.iter().zip(vectors) {
                results[position] = Some(vector);
            }
        }

        results
            .into_iter()
            .collect::<Option<Vec<_>>>()
            .ok_or(RagError::EmbeddingCount {
                expected: texts.len(),
                actual: 0,
            })
    }
}
