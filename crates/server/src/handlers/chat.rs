//! # Chat Route Handler
//!
//! Streams a grounded answer as server-sent events. Event names and payloads:
//!
//! | event             | data                                     |
//! |-------------------|------------------------------------------|
//! | `citations`       | `[{url, title, content, index, indices}]` |
//! | `text`            | a JSON string holding one text delta     |
//! | `followUpPrompts` | `[string]`                               |
//! | `error`           | `{"error": "..."}` with a masked message |
//! | `finish`          | `{}`                                     |
//!
//! `indices` lists every passage position a citation stands for, so a
//! `<reference index={n}>` tag resolves to the citation whose `indices` holds `n`.

use super::{AppError, AppState};
use axum::{
    extract::{rejection::JsonRejection, State},
    response::sse::{Event, KeepAlive, Sse},
    Json,
};
use docrag::{types::ChatMessage, ChatEvent};
use futures::{Stream, StreamExt};
use serde::Deserialize;
use serde_json::json;
use tracing::info;

// --- API Payloads for Chat ---

#[derive(Deserialize, Debug)]
pub struct ChatRequest {
    #[serde(default)]
    pub messages: Vec<ChatMessage>,
}

/// Encodes one chat event as an SSE frame.
pub fn to_sse_event(event: &ChatEvent) -> Result<Event, axum::Error> {
    let frame = Event::default().event(event.name());
    match event {
        ChatEvent::Citations(citations) => frame.json_data(citations),
        ChatEvent::TextDelta(delta) => frame.json_data(delta),
        ChatEvent::FollowUpPrompts(prompts) => frame.json_data(prompts),
        ChatEvent::Error(message) => frame.json_data(json!({ "error": message })),
        ChatEvent::Finish => frame.json_data(json!({})),
    }
}

/// Handler for `POST /api/chat`.
///
/// Validation, embedding and retrieval failures are answered with a plain JSON
/// error before the stream opens; failures after that arrive as an `error` event.
pub async fn chat_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<ChatRequest>, JsonRejection>,
) -> Result<Sse<impl Stream<Item = Result<Event, axum::Error>>>, AppError> {
    let Json(payload) = payload?;
    info!(messages = payload.messages.len(), "Received chat request.");

    let events = app_state.orchestrator.answer(payload.messages).await?;
    let frames = events.map(|event| to_sse_event(&event));

    Ok(Sse::new(frames).keep_alive(KeepAlive::default()))
}
