use crate::{
    errors::RagError,
    types::{CacheEntry, Document, DocumentRef, InteractionRecord},
};
use async_trait::async_trait;
use std::collections::HashSet;
use std::fmt::Debug;

/// Persistent map from a text fingerprint to its embedding.
#[async_trait]
pub trait EmbeddingStore: Send + Sync + Debug {
    /// Returns the entry stored under `hash`, if any. A miss is `Ok(None)`.
    async fn lookup_embedding(&self, hash: u32) -> Result<Option<CacheEntry>, RagError>;

    /// Stores `entry` unless its hash is already present. Returns whether a row was written.
    async fn store_embedding(&self, entry: &CacheEntry) -> Result<bool, RagError>;

    /// Returns the subset of `hashes` that are present.
    async fn lookup_embeddings(&self, hashes: &[u32]) -> Result<HashSet<u32>, RagError>;
}

/// Persistent set of embedded document chunks keyed by content hash.
#[async_trait]
pub trait DocumentStore: Send + Sync + Debug {
    /// Returns the subset of `hashes` that already have a stored document.
    async fn existing_document_hashes(&self, hashes: &[String])
        -> Result<HashSet<String>, RagError>;

    /// Inserts `document` unless its hash is already present. Returns whether a row was written.
    async fn insert_document(&self, document: &Document) -> Result<bool, RagError>;
}

/// Nearest-neighbour search over stored document embeddings.
#[async_trait]
pub trait VectorSearch: Send + Sync + Debug {
    /// Returns up to `limit` documents ordered by ascending cosine distance to `query_vector`.
    async fn vector_search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentRef>, RagError>;
}

/// Append-only record of answered questions.
#[async_trait]
pub trait InteractionLog: Send + Sync + Debug {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), RagError>;
}
