use crate::{
    errors::RagError,
    providers::ai::{sse::data_events, GenerationOptions, Generator, TokenStream},
    types::ChatMessage,
};
use async_trait::async_trait;
use futures::StreamExt;
use reqwest::Client as ReqwestClient;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt::Debug;
use tracing::debug;

// --- OpenAI-compatible request and response structures ---

#[derive(Serialize, Debug)]
struct ChatRequest<'a> {
    #[serde(skip_serializing_if = "Option::is_none")]
    model: Option<&'a str>,
    messages: Vec<WireMessage<'a>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    max_tokens: Option<u32>,
    stream: bool,
}

#[derive(Serialize, Debug)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Debug)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize, Debug)]
struct ChatChoice {
    message: ChoiceMessage,
}

#[derive(Deserialize, Debug)]
struct ChoiceMessage {
    #[serde(default)]
    content: Option<String>,
}

#[derive(Deserialize, Debug)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<StreamChoice>,
    #[serde(default)]
    error: Option<serde_json::Value>,
}

#[derive(Deserialize, Debug)]
struct StreamChoice {
    #[serde(default)]
    delta: StreamDelta,
}

#[derive(Deserialize, Debug, Default)]
struct StreamDelta {
    #[serde(default)]
    content: Option<String>,
}

const STREAM_DONE: &str = "[DONE]";

// --- Provider implementation ---

/// A provider for any OpenAI-compatible chat completions endpoint
/// (OpenAI, OpenRouter, Together, Cerebras, or a local server).
#[derive(Clone, Debug)]
pub struct OpenAiProvider {
    client: ReqwestClient,
    api_url: String,
    api_key: Option<String>,
    model: Option<String>,
    extra_headers: HashMap<String, String>,
}

impl OpenAiProvider {
    /// Creates a new `OpenAiProvider`. `api_url` is the full `/chat/completions` URL.
    pub fn new(
        api_url: String,
        api_key: Option<String>,
        model: Option<String>,
    ) -> Result<Self, RagError> {
        let client = ReqwestClient::builder()
            .build()
            .map_err(RagError::ReqwestClientBuild)?;
        Ok(Self {
            client,
            api_url,
            api_key,
            model,
            extra_headers: HashMap::new(),
        })
    }

    /// Adds headers sent with every request (e.g. OpenRouter's `HTTP-Referer` and `X-Title`).
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.extra_headers = headers;
        self
    }

    async fn send(&self, body: &ChatRequest<'_>) -> Result<reqwest::Response, RagError> {
        let mut request_builder = self.client.post(&self.api_url).json(body);
        if let Some(key) = &self.api_key {
            request_builder = request_builder.bearer_auth(key);
        }
        for (name, value) in &self.extra_headers {
            request_builder = request_builder.header(name, value);
        }

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
}

fn to_wire(messages: &[ChatMessage]) -> impl Iterator<Item = WireMessage<'_>> {
    messages.iter().map(|m| WireMessage {
        role: m.role.as_str(),
        content: &m.content,
    })
}

/// Extracts the text delta from one streamed chunk. `Ok(None)` for chunks that carry no text.
fn parse_stream_chunk(data: &str) -> Result<Option<String>, RagError> {
    let chunk: StreamChunk = serde_json::from_str(data)?;
    if let Some(error) = chunk.error {
        return Err(RagError::ProviderStream(error.to_string()));
    }
    Ok(chunk
        .choices
        .into_iter()
        .next()
        .and_then(|c| c.delta.content)
        .filter(|s| !s.is_empty()))
}

#[async_trait]
impl Generator for OpenAiProvider {
    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        options: &GenerationOptions,
    ) -> Result<TokenStream, RagError> {
        let mut wire = vec![WireMessage {
            role: "system",
            content: system_prompt,
        }];
        wire.extend(to_wire(messages));

        let body = ChatRequest {
            model: self.model.as_deref(),
            messages: wire,
            temperature: options.temperature,
            max_tokens: options.max_tokens,
            stream: true,
        };
        debug!(messages = body.messages.len(), "--> Starting streamed completion");
        let response = self.send(&body).await?;

        let tokens = data_events(response.bytes_stream())
            .take_while(|event| {
                let done = matches!(event, Ok(data) if data.trim() == STREAM_DONE);
                futures::future::ready(!done)
            })
            .filter_map(|event| async move {
                match event {
                    Ok(data) => parse_stream_chunk(&data).transpose(),
                    Err(e) => Some(Err(e)),
                }
            });

        Ok(tokens.boxed())
    }

    async fn generate(&self, system_prompt: &str, user_prompt: &str) -> Result<String, RagError> {
        let body = ChatRequest {
            model: self.model.as_deref(),
            messages: vec![
                WireMessage {
                    role: "system",
                    content: system_prompt,
                },
                WireMessage {
                    role: "user",
                    content: user_prompt,
                },
            ],
            temperature: Some(0.0),
            max_tokens: None,
            stream: false,
        };

        let response = self.send(&body).await?;
        let chat_response: ChatResponse = response
            .json()
            .await
            .map_err(RagError::ProviderDeserialization)?;

        Ok(chat_response
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .unwrap_or_default())
    }
}
