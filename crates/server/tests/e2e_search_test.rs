//! # End-to-End Search Test
//!
//! Seeds the store with passages at known distances from a query vector, then
//! searches through the HTTP API with the embedding provider mocked.

mod common;

use anyhow::Result;
use common::{mock_embedding, TestApp};
use docrag_test_utils::{axis_vector, blend, vector_for};
use serde_json::{json, Value};

async fn seed(app: &TestApp, query: &str, count: usize) -> Result<()> {
    let target = vector_for(query);
    let away = axis_vector(7);
    for i in 0..count {
        let weight = (i as f32 + 1.0) / (count as f32 + 2.0);
        app.add_passage(
            &format!("Page {i}"),
            &format!("https://docs.example.com/page-{i}.md"),
            &format!("Body of page {i}."),
            blend(&target, &away, weight),
        )
        .await?;
    }
    Ok(())
}

#[tokio::test]
async fn test_search_respects_limit_and_orders_by_similarity() -> Result<()> {
    // --- Arrange ---
    let app = TestApp::spawn().await?;
    seed(&app, "how to install", 8).await?;
    let embeddings = mock_embedding(
        &app.mock_server,
        "how to install",
        &vector_for("how to install"),
    );

    // --- Act ---
    let response = app
        .client
        .post(app.url("/api/search"))
        .json(&json!({ "query": "how to install", "limit": 5 }))
        .send()
        .await?;

    // --- Assert ---
    assert!(response.status().is_success(), "status: {}", response.status());
    let results: Vec<Value> = response.json().await?;
    assert!(results.len() <= 5);
    assert_eq!(results.len(), 5);
    let urls: Vec<&str> = results.iter().filter_map(|r| r["url"].as_str()).collect();
    assert_eq!(
        urls,
        (0..5)
            .map(|i| format!("https://docs.example.com/page-{i}.md"))
            .collect::<Vec<_>>()
    );
    // Only url and content are exposed.
    let keys: Vec<&String> = results[0].as_object().map(|o| o.keys().collect()).unwrap_or_default();
    assert_eq!(keys.len(), 2);
    assert!(results[0]["content"]
        .as_str()
        .is_some_and(|c| c.starts_with("Title: Page 0\nURL Source: ")));
    embeddings.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn test_search_defaults_to_ten_results() -> Result<()> {
    let app = TestApp::spawn().await?;
    seed(&app, "configuration", 12).await?;
    mock_embedding(&app.mock_server, "configuration", &vector_for("configuration"));

    let response = app
        .client
        .post(app.url("/api/search"))
        .json(&json!({ "query": "configuration" }))
        .send()
        .await?;

    assert!(response.status().is_success());
    let results: Vec<Value> = response.json().await?;
    assert_eq!(results.len(), 10);
    Ok(())
}

#[tokio::test]
async fn test_repeated_query_is_served_from_the_embedding_cache() -> Result<()> {
    let app = TestApp::spawn().await?;
    seed(&app, "upgrade", 2).await?;
    let embeddings = mock_embedding(&app.mock_server, "upgrade", &vector_for("upgrade"));

    for _ in 0..2 {
        let response = app
            .client
            .post(app.url("/api/search"))
            .json(&json!({ "query": "upgrade", "limit": 1 }))
            .send()
            .await?;
        assert!(response.status().is_success());
        // The query embedding is cached in the background.
        app.app_state.embedder.cache().flush().await;
    }

    embeddings.assert_hits(1);
    Ok(())
}

#[tokio::test]
async fn test_search_on_empty_store_returns_empty_list() -> Result<()> {
    let app = TestApp::spawn().await?;
    mock_embedding(&app.mock_server, "anything", &vector_for("anything"));

    let response = app
        .client
        .post(app.url("/api/search"))
        .json(&json!({ "query": "anything" }))
        .send()
        .await?;

    assert!(response.status().is_success());
    let results: Vec<Value> = response.json().await?;
    assert!(results.is_empty());
    Ok(())
}
