use thiserror::Error;

/// Custom error types for the retrieval and generation pipeline.
#[derive(Error, Debug)]
pub enum RagError {
    /// The caller sent something unusable, such as an empty query.
    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Failed to build Reqwest client: {0}")]
    ReqwestClientBuild(reqwest::Error),
    #[error("Failed to send request to provider: {0}")]
    ProviderRequest(reqwest::Error),
    #[error("Failed to deserialize provider response: {0}")]
    ProviderDeserialization(reqwest::Error),
    #[error("Provider returned an error (status {status}): {body}")]
    ProviderApi { status: u16, body: String },
    #[error("Provider stream failed: {0}")]
    ProviderStream(String),
    #[error("Provider is not configured: {0}")]
    MissingProvider(String),

    #[error("Invalid embedding at index {index}: expected {expected} dimensions, got {actual}")]
    EmbeddingShape {
        index: usize,
        expected: usize,
        actual: usize,
    },
    #[error("Invalid embedding at index {index}: component {position} is not a finite number")]
    EmbeddingNotFinite { index: usize, position: usize },
    #[error("Provider returned {actual} embeddings for {expected} inputs")]
    EmbeddingCount { expected: usize, actual: usize },

    #[error("Storage connection error: {0}")]
    StorageConnection(String),
    #[error("Storage operation failed: {0}")]
    StorageOperationFailed(String),
    #[error("Failed to write embedding cache entry: {0}")]
    CacheWrite(String),

    #[error("Failed to serialize or deserialize JSON: {0}")]
    JsonSerialization(#[from] serde_json::Error),
    #[error("Regex error: {0}")]
    Regex(#[from] regex::Error),
}

impl RagError {
    /// Whether the error is an embedding shape violation. These are never retried.
    pub fn is_shape_error(&self) -> bool {
        matches!(
            self,
            RagError::EmbeddingShape { .. }
                | RagError::EmbeddingNotFinite { .. }
                | RagError::EmbeddingCount { .. }
        )
    }

    /// Whether a provider call failed in a way that may succeed on a later attempt:
    /// rate limiting, server errors, timeouts and dropped connections.
    pub fn is_transient_provider_error(&self) -> bool {
        match self {
            RagError::ProviderRequest(e) => e.is_timeout() || e.is_connect() || e.is_request(),
            RagError::ProviderApi { status, .. } => *status == 429 || *status >= 500,
            RagError::ProviderStream(_) => true,
            _ => false,
        }
    }

    /// Whether the storage handle is gone and must be recreated before retrying.
    pub fn is_connection_closed(&self) -> bool {
        match self {
            RagError::StorageConnection(_) => true,
            RagError::StorageOperationFailed(msg) => {
                msg.contains("ConnectionClosed") || msg.contains("connection was closed")
            }
            _ => false,
        }
    }
}

impl From<turso::Error> for RagError {
    fn from(err: turso::Error) -> Self {
        RagError::StorageOperationFailed(err.to_string())
    }
}

/// Errors raised by the offline indexing pipeline.
#[derive(Error, Debug)]
pub enum IngestError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("Invalid input: {0}")]
    InvalidInput(String),
    #[error(transparent)]
    Rag(#[from] RagError),
}
