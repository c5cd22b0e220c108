//! # docrag
//!
//! Grounded question answering over a documentation corpus. Documents are split
//! into self-citing chunks, embedded once (with a content-addressed cache in front
//! of the embedding provider) and stored with their vectors. Questions are
//! answered by retrieving the nearest chunks and streaming a generated answer
//! alongside citations and follow-up questions.

pub mod cache;
pub mod chat;
pub mod chunker;
pub mod citations;
pub mod constants;
pub mod embedder;
pub mod errors;
pub mod hash;
pub mod ingest;
pub mod prompts;
pub mod providers;
pub mod retriever;
pub mod retry;
pub mod search;
pub mod types;

pub use cache::{CacheConfig, EmbeddingCache};
pub use chat::{ChatConfig, ChatEvent, RagOrchestrator};
pub use embedder::BatchEmbedder;
pub use errors::{IngestError, RagError};
pub use ingest::{IndexOptions, IndexReport, Indexer};
pub use retriever::VectorRetriever;
pub use retry::RetryPolicy;
