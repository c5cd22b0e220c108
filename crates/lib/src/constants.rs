//! Shared limits and defaults for the pipeline.

/// Every stored and queried embedding has exactly this many components.
pub const EMBEDDING_DIMENSIONS: usize = 512;

/// Texts sent to the embedding provider per request.
pub const PROVIDER_BATCH_SIZE: usize = 128;

/// Cache entries persisted concurrently before pausing.
pub const CACHE_WRITE_BATCH_SIZE: usize = 50;

/// Pause between cache persistence sub-batches, in milliseconds.
pub const CACHE_WRITE_PAUSE_MS: u64 = 100;

/// Keys per `IN (...)` lookup against the cache or document tables.
pub const LOOKUP_BATCH_SIZE: usize = 500;

/// Default character budget for a chunk.
pub const DEFAULT_CHUNK_SIZE: usize = 1024;

/// Default overlap budget between size-split chunks, in characters.
pub const DEFAULT_OVERLAP_SIZE: usize = 128;

/// Passages retrieved to ground a chat answer.
pub const CHAT_TOP_K: usize = 15;

/// Results returned by a search request that does not specify a limit.
pub const DEFAULT_SEARCH_LIMIT: usize = 10;

/// Most recent chat messages forwarded to the generator.
pub const CHAT_HISTORY_WINDOW: usize = 5;

/// Maximum characters of passage body shown in a citation.
pub const CITATION_SNIPPET_CHARS: usize = 200;

/// Number of follow-up questions requested per answer.
pub const FOLLOW_UP_PROMPT_COUNT: usize = 3;
