//! # Embeddings Provider
//!
//! Generates vector embeddings by calling an external embeddings API. Two wire
//! formats are supported: the OpenAI-compatible `/embeddings` endpoint (OpenAI,
//! Voyage, local servers) and Gemini's `batchEmbedContents`.

use crate::{errors::RagError, providers::ai::Embedder};
use async_trait::async_trait;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use tracing::debug;

// --- OpenAI-compatible request and response structures ---

#[derive(Serialize, Debug)]
struct OpenAIEmbeddingRequest<'a> {
    model: &'a str,
    input: &'a [String],
    #[serde(skip_serializing_if = "Option::is_none")]
    dimensions: Option<usize>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingResponse {
    data: Vec<OpenAIEmbeddingData>,
}

#[derive(Deserialize, Debug)]
struct OpenAIEmbeddingData {
    embedding: Vec<f32>,
    #[serde(default)]
    index: Option<usize>,
}

// --- Gemini-specific request and response structures ---

#[derive(Serialize, Debug)]
struct GeminiBatchRequest<'a> {
    requests: Vec<GeminiEmbeddingRequest<'a>>,
}

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiEmbeddingRequest<'a> {
    model: &'a str,
    content: GeminiEmbeddingContent<'a>,
    #[serde(skip_serializing_if = "Option::is_none")]
    output_dimensionality: Option<usize>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingContent<'a> {
    parts: Vec<GeminiEmbeddingPart<'a>>,
}

#[derive(Serialize, Debug)]
struct GeminiEmbeddingPart<'a> {
    text: &'a str,
}

#[derive(Deserialize, Debug)]
struct GeminiBatchResponse {
    #[serde(default)]
    embeddings: Vec<GeminiEmbeddingValue>,
}

#[derive(Deserialize, Debug)]
struct GeminiEmbeddingValue {
    values: Vec<f32>,
}

/// The wire format spoken by an embeddings endpoint.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EmbeddingApi {
    OpenAi,
    Gemini,
}

impl EmbeddingApi {
    /// Gemini endpoints live on `generativelanguage.googleapis.com`; anything else
    /// is treated as OpenAI-compatible.
    pub fn detect(api_url: &str) -> Self {
        if api_url.contains("generativelanguage.googleapis.com") {
            EmbeddingApi::Gemini
        } else {
            EmbeddingApi::OpenAi
        }
    }
}

/// Calls an HTTP embeddings endpoint, one request per `embed` call.
#[derive(Clone, Debug)]
pub struct HttpEmbedder {
    client: ReqwestClient,
    api_url: String,
    model: String,
    api_key: Option<String>,
    dimensions: Option<usize>,
    api: EmbeddingApi,
}

impl HttpEmbedder {
    pub fn new(
        api_url: String,
        model: String,
        api_key: Option<String>,
    ) -> Result<Self, RagError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(RagError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api: EmbeddingApi::detect(&api_url),
            api_url,
            model,
            api_key,
            dimensions: None,
        })
    }

    /// Overrides the wire format detected from the URL.
    pub fn with_api(mut self, api: EmbeddingApi) -> Self {
        self.api = api;
        self
    }

    /// Asks the provider for vectors of a specific size, for models that support it.
    pub fn with_dimensions(mut self, dimensions: Option<usize>) -> Self {
        self.dimensions = dimensions;
        self
    }

    async fn embed_openai(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        let request_body = OpenAIEmbeddingRequest {
            model: &self.model,
            input: texts,
            dimensions: self.dimensions,
        };
        debug!(inputs = texts.len(), "--> Sending request to OpenAI-compatible Embeddings API");

        let mut request_builder = self.client.post(&self.api_url).json(&request_body);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }
        let response = send(request_builder).await?;

        let openai_response: OpenAIEmbeddingResponse = response
            .json()
            .await
            .map_err(RagError::ProviderDeserialization)?;

        let mut data = openai_response.data;
        // Entries carry their input position; a missing index means the list is already ordered.
        if data.iter().all(|d| d.index.is_some()) {
            data.sort_by_key(|d| d.index);
        }
        Ok(data.into_iter().map(|d| d.embedding).collect())
    }

    async fn embed_gemini(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        // Gemini requires the model name to be prefixed with "models/" in the payload.
        let model = if self.model.starts_with("models/") {
            self.model.clone()
        } else {
            format!("models/{}", self.model)
        };

        let request_body = GeminiBatchRequest {
            requests: texts
                .iter()
                .map(|text| GeminiEmbeddingRequest {
                    model: &model,
                    content: GeminiEmbeddingContent {
                        parts: vec![GeminiEmbeddingPart { text }],
                    },
                    output_dimensionality: self.dimensions,
                })
                .collect(),
        };
        debug!(inputs = texts.len(), "--> Sending request to Gemini Embeddings API");

        let mut request_builder = self.client.post(&self.api_url).json(&request_body);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.header("x-goog-api-key", key);
        }
        let response = send(request_builder).await?;

        let gemini_response: GeminiBatchResponse = response
            .json()
            .await
            .map_err(RagError::ProviderDeserialization)?;
        Ok(gemini_response
            .embeddings
            .into_iter()
            .map(|e| e.values)
            .collect())
    }
}

async fn send(request_builder: reqwest::RequestBuilder) -> Result<reqwest::Response, RagError> {
    let response = request_builder
        .send()
        .await
        .map_err(RagError::ProviderRequest)?;

    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(RagError::ProviderApi {
            status: status.as_u16(),
            body,
        });
    }
    Ok(response)
}

#[async_trait]
impl Embedder for HttpEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        if texts.is_empty() {
            return Ok(Vec::new());
        }
        match self.api {
            EmbeddingApi::Gemini => self.embed_gemini(texts).await,
            EmbeddingApi::OpenAi => self.embed_openai(texts).await,
        }
    }
}
