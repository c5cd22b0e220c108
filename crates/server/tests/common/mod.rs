//! # Common Test Utilities
//!
//! - `TestApp`: spawns a real server on a random port with a temporary database,
//!   configured against an `httpmock::MockServer` that plays both the embedding
//!   and the chat provider.
//! - Mock helpers for the provider endpoints.

// Not every test file uses every helper.
#![allow(unused)]

use anyhow::Result;
use axum::serve;
use docrag::{
    hash::document_key,
    providers::db::storage::DocumentStore,
    types::{Document, DocumentKind},
};
use docrag_server::{
    config::{self, AppConfig},
    router,
    state::{build_app_state, AppState},
};
use httpmock::{Method::POST, Mock, MockServer};
use reqwest::Client;
use serde_json::json;
use std::{fs::File, io::Write, net::SocketAddr, sync::Once};
use tempfile::{tempdir, TempDir};
use tokio::{net::TcpListener, task::JoinHandle};

static INIT: Once = Once::new();

pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenvy::dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .compact()
            .try_init();
    });
}

/// Writes a config file pointing every provider at `mock_server` and loads it.
pub fn write_test_config(mock_server: &MockServer, dir: &TempDir) -> Result<AppConfig> {
    let db_path = dir.path().join("docs.db");
    let config_path = dir.path().join("config.yml");
    let config_content = format!(
        r#"
port: 0
db_url: "{}"
embedding:
  provider: "openai"
  api_url: "{}"
  model_name: "mock-embedding-model"
providers:
  default:
    provider: "openai"
    api_url: "{}"
    api_key: null
    model_name: "mock-chat-model"
chat:
  provider: "default"
  project: "Widget"
  follow_up_timeout_secs: 5
cache:
  write_pause_ms: 0
retry:
  max_attempts: 2
  initial_delay_ms: 1
"#,
        db_path.display(),
        mock_server.url("/v1/embeddings"),
        mock_server.url("/v1/chat/completions")
    );
    let mut file = File::create(&config_path)?;
    file.write_all(config_content.as_bytes())?;

    Ok(config::get_config(config_path.to_str())?)
}

// --- Full Application Test Harness ---

/// A harness for end-to-end testing of the Axum server.
pub struct TestApp {
    pub address: String,
    pub client: Client,
    pub mock_server: MockServer,
    pub app_state: AppState,
    _config_dir: TempDir,
    _server_handle: JoinHandle<()>,
    shutdown_tx: Option<tokio::sync::oneshot::Sender<()>>,
}

impl TestApp {
    /// Spawns the application server and returns a `TestApp` instance.
    pub async fn spawn() -> Result<Self> {
        setup_tracing();

        let mock_server = MockServer::start();
        let config_dir = tempdir()?;
        let config = write_test_config(&mock_server, &config_dir)?;
        let app_state = build_app_state(config).await?;

        let listener = TcpListener::bind("127.0.0.1:0").await?;
        let addr: SocketAddr = listener.local_addr()?;
        let address = format!("http://{addr}");

        let (shutdown_tx, shutdown_rx) = tokio::sync::oneshot::channel();
        let router_state = app_state.clone();
        let server_handle = tokio::spawn(async move {
            let app = router::create_router(router_state);
            let server = serve(listener, app).with_graceful_shutdown(async move {
                shutdown_rx.await.ok();
            });
            if let Err(e) = server.await {
                tracing::error!("[TestApp] Server error: {}", e);
            }
        });

        Ok(Self {
            address,
            client: Client::new(),
            mock_server,
            app_state,
            _config_dir: config_dir,
            _server_handle: server_handle,
            shutdown_tx: Some(shutdown_tx),
        })
    }

    /// Stores a passage with a known embedding, bypassing the indexer.
    pub async fn add_passage(
        &self,
        title: &str,
        url: &str,
        body: &str,
        embedding: Vec<f32>,
    ) -> Result<()> {
        let content = format!("Title: {title}\nURL Source: {url}\n{body}");
        self.app_state
            .sqlite_provider
            .insert_document(&Document {
                hash: document_key(&content),
                title: title.to_string(),
                url: url.to_string(),
                content,
                embedding,
                kind: DocumentKind::Document,
                created_at: None,
            })
            .await?;
        Ok(())
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.address)
    }
}

impl Drop for TestApp {
    fn drop(&mut self) {
        if let Some(tx) = self.shutdown_tx.take() {
            let _ = tx.send(());
        }
    }
}

// --- Provider mocks ---

/// Answers an embeddings request for exactly `[text]` with `vector`.
pub fn mock_embedding<'a>(server: &'a MockServer, text: &str, vector: &[f32]) -> Mock<'a> {
    let body = json!({ "input": [text] }).to_string();
    let response = json!({
        "data": [{ "index": 0, "embedding": vector }]
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/embeddings")
            .json_body_partial(body);
        then.status(200).json_body(response);
    })
}

/// Streams `tokens` as an OpenAI-compatible SSE completion.
pub fn mock_chat_stream<'a>(server: &'a MockServer, tokens: &[&str]) -> Mock<'a> {
    let mut body = String::new();
    for token in tokens {
        let chunk = json!({ "choices": [{ "delta": { "content": token } }] });
        body.push_str(&format!("data: {chunk}\n\n"));
    }
    body.push_str("data: [DONE]\n\n");
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .json_body_partial(r#"{"stream": true}"#);
        then.status(200)
            .header("content-type", "text/event-stream")
            .body(body);
    })
}

/// Answers the structured follow-up request.
pub fn mock_follow_ups<'a>(server: &'a MockServer, prompts: &[&str]) -> Mock<'a> {
    let content = json!({ "followUpPrompts": prompts }).to_string();
    let response = json!({
        "choices": [{ "message": { "content": content } }]
    });
    server.mock(|when, then| {
        when.method(POST)
            .path("/v1/chat/completions")
            .json_body_partial(r#"{"stream": false}"#);
        then.status(200).json_body(response);
    })
}

/// One parsed server-sent event.
#[derive(Debug, Clone)]
pub struct SseFrame {
    pub event: String,
    pub data: serde_json::Value,
}

/// Splits an SSE body into frames, skipping comments and keep-alives.
pub fn parse_sse(body: &str) -> Vec<SseFrame> {
    body.split("\n\n")
        .filter_map(|block| {
            let mut event = None;
            let mut data = String::new();
            for line in block.lines() {
                if let Some(name) = line.strip_prefix("event:") {
                    event = Some(name.trim().to_string());
                } else if let Some(payload) = line.strip_prefix("data:") {
                    data.push_str(payload.trim_start());
                }
            }
            let event = event?;
            let data = serde_json::from_str(&data).unwrap_or(serde_json::Value::Null);
            Some(SseFrame { event, data })
        })
        .collect()
}
