use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// The kind of source a stored document came from. Persisted in the `type` column.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DocumentKind {
    #[default]
    Document,
    Issue,
    IssueComment,
}

impl DocumentKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            DocumentKind::Document => "document",
            DocumentKind::Issue => "issue",
            DocumentKind::IssueComment => "issue_comment",
        }
    }
}

impl fmt::Display for DocumentKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw document before chunking, as produced by an ingestion source.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SourceDocument {
    pub title: String,
    pub url: String,
    pub content: String,
    #[serde(default)]
    pub kind: DocumentKind,
    #[serde(default)]
    pub created_at: Option<DateTime<Utc>>,
}

/// Citation provenance carried by every chunk.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub title: String,
    pub url: String,
}

/// A bounded, self-describing slice of a document: `content` starts with the
/// rendered metadata header.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub content: String,
    pub metadata: ChunkMetadata,
}

/// A row of the `docs` table.
#[derive(Debug, Clone)]
pub struct Document {
    pub hash: String,
    pub title: String,
    pub url: String,
    pub content: String,
    pub embedding: Vec<f32>,
    pub kind: DocumentKind,
    pub created_at: Option<DateTime<Utc>>,
}

/// A row of the `embedding_cache` table.
#[derive(Debug, Clone, PartialEq)]
pub struct CacheEntry {
    pub hash: u32,
    pub text: String,
    pub embedding: Vec<f32>,
}

/// A retrieved passage. `distance` is the cosine distance to the query (smaller is
/// closer) and is not part of the public response body.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocumentRef {
    pub url: String,
    pub content: String,
    #[serde(skip)]
    pub distance: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
}

impl Role {
    pub fn as_str(&self) -> &'static str {
        match self {
            Role::System => "system",
            Role::User => "user",
            Role::Assistant => "assistant",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: Role::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: Role::Assistant,
            content: content.into(),
        }
    }
}

/// A completed question/answer exchange, kept for later review.
#[derive(Debug, Clone, Serialize)]
pub struct InteractionRecord {
    pub id: String,
    pub user_message: String,
    pub ai_response: String,
    pub created_at: DateTime<Utc>,
}

/// A reusable configuration for a named generation provider.
#[derive(Debug, Clone, Deserialize)]
pub struct ProviderConfig {
    /// The type of provider: `openai` (any OpenAI-compatible endpoint, alias `local`) or `gemini`.
    pub provider: String,
    /// The API URL. Optional for Gemini, where it is derived from the model name.
    #[serde(default)]
    pub api_url: Option<String>,
    #[serde(default)]
    pub api_key: Option<String>,
    pub model_name: String,
    /// Extra headers sent with every request.
    #[serde(default)]
    pub headers: HashMap<String, String>,
}

/// Configuration for the embedding provider.
#[derive(Debug, Clone, Deserialize)]
pub struct EmbeddingConfig {
    /// `openai` or `gemini`. Detected from `api_url` when absent.
    #[serde(default)]
    pub provider: Option<String>,
    pub api_url: String,
    pub model_name: String,
    #[serde(default)]
    pub api_key: Option<String>,
    /// Requested vector size, for models that accept one.
    #[serde(default)]
    pub dimensions: Option<usize>,
    /// Texts per provider request. Defaults to the library batch size.
    #[serde(default)]
    pub batch_size: Option<usize>,
}
