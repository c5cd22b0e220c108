pub mod embedding;
pub mod gemini;
pub mod openai;
pub(crate) mod sse;

use crate::{errors::RagError, types::ChatMessage};
use async_trait::async_trait;
use futures::stream::BoxStream;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

pub use embedding::{EmbeddingApi, HttpEmbedder};
pub use gemini::GeminiProvider;
pub use openai::OpenAiProvider;

/// A stream of generated text deltas, in the order the provider produced them.
pub type TokenStream = BoxStream<'static, Result<String, RagError>>;

/// A trait for turning texts into embedding vectors.
///
/// Implementations make one provider request per call and return one vector per
/// input, in input order. Batching, caching and shape validation live above this
/// seam, in [`crate::embedder::BatchEmbedder`].
#[async_trait]
pub trait Embedder: Send + Sync + Debug {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError>;
}

/// Sampling knobs passed through to the generation provider.
#[derive(Debug, Clone, Default)]
pub struct GenerationOptions {
    pub temperature: Option<f32>,
    pub max_tokens: Option<u32>,
}

/// A trait for interacting with a text generation provider.
#[async_trait]
pub trait Generator: Send + Sync + Debug {
    /// Starts a streamed completion. The returned stream yields text deltas.
    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<TokenStream, RagError>;

    /// Generates a single response from a system and user prompt.
    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError>;

    /// Generates a JSON value that should conform to `schema`.
    ///
    /// The default implementation appends the schema to the system prompt and
    /// parses the reply; providers with a native JSON mode override it.
    async fn generate_json(
        &self,
        schema: &Value,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Value, RagError> {
        let system_prompt = format!(
            "{system_prompt}\n\nRespond with a single JSON object that matches this JSON schema, and nothing else:\n{schema}"
        );
        let raw = self.generate(&system_prompt, user_prompt).await?;
        debug!("<-- Structured response: {}", raw);
        Ok(serde_json::from_str(strip_code_fence(&raw))?)
    }
}

/// Runs a structured generation and deserializes the result into `T`.
pub async fn generate_structured<T: DeserializeOwned>(
    generator: &dyn Generator,
    schema: &Value,
    system_prompt: &str,
    user_prompt: &str,
) -> Result<T, RagError> {
    let value = generator
        .generate_json(schema, system_prompt, user_prompt)
        .await?;
    Ok(serde_json::from_value(value)?)
}

/// Removes a surrounding markdown code fence (```json ... ```), if any.
pub fn strip_code_fence(raw: &str) -> &str {
    let trimmed = raw.trim();
    let Some(rest) = trimmed.strip_prefix("```") else {
        return trimmed;
    };
    let rest = rest.strip_prefix("json").unwrap_or(rest);
    rest.strip_suffix("```").unwrap_or(rest).trim()
}
