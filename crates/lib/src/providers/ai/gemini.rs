use crate::{
    errors::RagError,
    providers::ai::{sse::data_events, strip_code_fence, GenerationOptions, Generator, TokenStream},
    types::{ChatMessage, Role},
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::fmt::Debug;
use tracing::debug;

// --- Gemini-specific request and response structures ---

#[derive(Serialize, Debug)]
#[serde(rename_all = "camelCase")]
struct GeminiRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content<'a>>,
    contents: Vec<Content<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    generation_config: Option<GenerationConfig>,
}

#[derive(Serialize, Debug)]
struct Content<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'a str>,
    parts: Vec<Part<'a>>,
}

#[derive(Serialize, Debug)]
struct Part<'a> {
    text: &'a str,
}

#[derive(Serialize, Debug, Default)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_output_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize, Debug)]
struct GeminiResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
    #[serde(default)]
    error: Option<Value>,
}

#[derive(Deserialize, Debug)]
struct Candidate {
    #[serde(default)]
    content: Option<ContentResponse>,
}

#[derive(Deserialize, Debug)]
struct ContentResponse {
    #[serde(default)]
    parts: Vec<PartResponse>,
}

#[derive(Deserialize, Debug)]
struct PartResponse {
    #[serde(default)]
    text: String,
}

impl GeminiResponse {
    fn text(self) -> Result<String, RagError> {
        if let Some(error) = self.error {
            return Err(RagError::ProviderStream(error.to_string()));
        }
        Ok(self
            .candidates
            .into_iter()
            .next()
            .and_then(|c| c.content)
            .map(|c| c.parts.into_iter().map(|p| p.text).collect())
            .unwrap_or_default())
    }
}

// --- Gemini Provider implementation ---

/// A provider for interacting with the Google Gemini API.
///
/// `api_url` is the model resource URL, e.g.
/// `https://generativelanguage.googleapis.com/v1beta/models/gemini-2.0-flash`;
/// the `:generateContent` and `:streamGenerateContent` methods are appended to it.
#[derive(Clone, Debug)]
pub struct GeminiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: String,
}

impl GeminiProvider {
    /// Creates a new `GeminiProvider`.
    pub fn new(api_url: String, api_key: String) -> Result<Self, RagError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(RagError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url: api_url.trim_end_matches('/').to_string(),
            api_key,
        })
    }

    async fn send(
        &self,
        method: &str,
        query: &[(&str, &str)],
        body: &GeminiRequest<'_>,
    ) -> Result<reqwest::Response, RagError> {
        let url = format!("{}:{method}", self.api_url);
        let response = self
            .client
            .post(&url)
            .query(&[("key", self.api_key.as_str())])
            .query(query)
            .json(body)
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

    async fn generate_with(
        &self,
        system_prompt: &str,
        user_prompt: &str,
        config: GenerationConfig,
    ) -> Result<String, RagError> {
        let body = GeminiRequest {
            system_instruction: system_content(system_prompt),
            contents: vec![Content {
                role: Some("user"),
                parts: vec![Part { text: user_prompt }],
            }],
            generation_config: Some(config),
        };

        let response = self.send("generateContent", &[], &body).await?;
        let gemini_response: GeminiResponse = response
            .json()
            .await
            .map_err(RagError::ProviderDeserialization)?;
        gemini_response.text()
    }
}

fn system_content(system_prompt: &str) -> Option<Content<'_>> {
    (!system_prompt.is_empty()).then(|| Content {
        role: None,
        parts: vec![Part {
            text: system_prompt,
        }],
    })
}

/// Gemini calls the assistant role "model" and has no system role inside `contents`.
fn gemini_role(role: Role) -> &'static str {
    match role {
        Role::Assistant => "model",
        Role::User | Role::System => "user",
    }
}

#[async_trait]
impl Generator for GeminiProvider {
    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<TokenStream, RagError> {
        let body = GeminiRequest {
            system_instruction: system_content(system_prompt),
            contents: messages
                .iter()
                .map(|m| Content {
                    role: Some(gemini_role(m.role)),
                    parts: vec![Part { text: &m.content }],
                })
                .collect(),
            generation_config: Some(GenerationConfig {
                temperature: options.temperature,
                max_output_tokens: options.max_tokens,
                response_mime_type: None,
            }),
        };
        debug!(messages = messages.len(), "--> Starting streamed Gemini generation");
        let response = self
            .send("streamGenerateContent", &[("alt", "sse")], &body)
            .await?;

        let tokens = data_events(response.bytes_stream()).filter_map(|event| async move {
            let parsed = event.and_then(|data| {
                let chunk: GeminiResponse = serde_json::from_str(&data)?;
                chunk.text()
            });
            match parsed {
                Ok(text) if text.is_empty() => None,
                other => Some(other),
            }
        });

        Ok(tokens.boxed())
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        self.generate_with(
            system_prompt,
            user_prompt,
            GenerationConfig {
                temperature: Some(0.0),
                ..Default::default()
            },
        )
        .await
    }

    /// Uses Gemini's JSON response mode so the reply is a bare JSON document.
    async fn generate_json(
        &self,
        schema: &Value,
        system_prompt: &str,
        user_prompt: &str,
    ) -> Result<Value, RagError> {
        let system_prompt = format!(
            "{system_prompt}\n\nRespond with a single JSON object that matches this JSON schema:\n{schema}"
        );
        let raw = self
            .generate_with(
                &system_prompt,
                user_prompt,
                GenerationConfig {
                    response_mime_type: Some("application/json"),
                    ..Default::default()
                },
            )
            .await?;
        debug!("<-- Structured response: {}", raw);
        Ok(serde_json::from_str(strip_code_fence(&raw))?)
    }
}
