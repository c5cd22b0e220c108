mod common;

use anyhow::Result;
use common::{build_embedder, setup_tracing};
use docrag::{errors::RagError, retriever::VectorRetriever, search::search};
use docrag_test_utils::{axis_vector, blend, vector_for, MemoryStore, MockEmbedder};
use std::sync::Arc;

fn seeded_store(query: &str, count: usize) -> MemoryStore {
    let store = MemoryStore::new();
    let target = vector_for(query);
    let away = axis_vector(0);
    for i in 0..count {
        let weight = (i as f32 + 1.0) / (count as f32 + 1.0);
        store.add_document(
            &format!("https://docs.example.com/{i}.md"),
            &format!("Title: Page {i}\nURL Source: https://docs.example.com/{i}.md\nbody {i}"),
            blend(&target, &away, weight),
        );
    }
    store
}

#[tokio::test]
async fn test_search_returns_nearest_first_within_limit() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let store = seeded_store("install", 8);
    let embedder = build_embedder(Arc::new(store.clone()), MockEmbedder::new());
    let retriever = VectorRetriever::new(Arc::new(store));

    // --- Act ---
    let results = search(&embedder, &retriever, "  install ", 5).await?;

    // --- Assert ---
    let urls: Vec<&str> = results.iter().map(|r| r.url.as_str()).collect();
    assert_eq!(
        urls,
        vec![
            "https://docs.example.com/0.md",
            "https://docs.example.com/1.md",
            "https://docs.example.com/2.md",
            "https://docs.example.com/3.md",
            "https://docs.example.com/4.md",
        ]
    );
    assert!(results.windows(2).all(|w| w[0].distance <= w[1].distance));
    Ok(())
}

#[tokio::test]
async fn test_search_rejects_blank_query() {
    setup_tracing();
    let store = MemoryStore::new();
    let provider = MockEmbedder::new();
    let embedder = build_embedder(Arc::new(store.clone()), provider.clone());
    let retriever = VectorRetriever::new(Arc::new(store));

    let err = search(&embedder, &retriever, " \n ", 10).await.unwrap_err();

    assert!(matches!(err, RagError::Validation(ref m) if m == "Missing query parameter"));
    assert_eq!(provider.call_count(), 0);
}

#[tokio::test]
async fn test_retrieve_with_zero_k_is_empty() -> Result<()> {
    setup_tracing();
    let retriever = VectorRetriever::new(Arc::new(seeded_store("q", 3)));

    assert!(retriever.retrieve(&vector_for("q"), 0).await?.is_empty());
    Ok(())
}

#[tokio::test]
async fn test_retrieve_rejects_malformed_query_vectors() {
    setup_tracing();
    let retriever = VectorRetriever::new(Arc::new(seeded_store("q", 3)));

    let short = retriever.retrieve(&[1.0, 0.0], 3).await.unwrap_err();
    assert!(short.is_shape_error());

    let mut with_nan = vector_for("q");
    with_nan[0] = f32::NAN;
    let nan = retriever.retrieve(&with_nan, 3).await.unwrap_err();
    assert!(nan.is_shape_error());
}

#[tokio::test]
async fn test_retrieve_returns_everything_when_k_exceeds_corpus() -> Result<()> {
    setup_tracing();
    let retriever = VectorRetriever::new(Arc::new(seeded_store("q", 3)));

    let results = retriever.retrieve(&vector_for("q"), 100).await?;

    assert_eq!(results.len(), 3);
    Ok(())
}
