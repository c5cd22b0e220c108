//! # Search Route Handler
//!
//! Semantic search over the stored passages, without generation.

use super::{AppError, AppState};
use axum::{extract::rejection::JsonRejection, extract::State, Json};
use docrag::{constants::DEFAULT_SEARCH_LIMIT, search::search, types::DocumentRef};
use serde::Deserialize;
use tracing::info;

// --- API Payloads for Search ---

#[derive(Deserialize, Debug)]
pub struct SearchRequest {
    #[serde(default)]
    pub query: Option<String>,
    #[serde(default)]
    pub limit: Option<usize>,
}

// --- Search Handlers ---

/// Handler for `POST /api/search`. Responds with `[{url, content}]`, nearest first.
pub async fn search_handler(
    State(app_state): State<AppState>,
    payload: Result<Json<SearchRequest>, JsonRejection>,
) -> Result<Json<Vec<DocumentRef>>, AppError> {
    let Json(payload) = payload?;
    let query = payload.query.unwrap_or_default();
    let limit = payload.limit.unwrap_or(DEFAULT_SEARCH_LIMIT);
    info!("Received search request for query: '{}' (limit {})", query, limit);

    let results = search(
        &app_state.embedder,
        &app_state.retriever,
        &query,
        limit,
    )
    .await?;

    Ok(Json(results))
}
