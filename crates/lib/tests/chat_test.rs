//! # Chat Orchestrator Tests
//!
//! Drives `RagOrchestrator` with scripted providers and an in-memory store and
//! checks the order and content of the emitted events.

mod common;

use anyhow::Result;
use common::{build_embedder, fast_retry, setup_tracing};
use docrag::{
    chat::{ChatConfig, ChatEvent, RagOrchestrator, MASKED_ERROR_MESSAGE},
    errors::RagError,
    retriever::VectorRetriever,
    types::ChatMessage,
};
use docrag_test_utils::{
    blend, vector_for, GeneratorScript, MemoryStore, MockEmbedder, MockGenerator,
};
use futures::StreamExt;
use std::sync::Arc;
use std::time::{Duration, Instant};

const QUESTION: &str = "How do I install the CLI?";

struct Harness {
    store: MemoryStore,
    generator: MockGenerator,
    orchestrator: RagOrchestrator,
}

fn harness(generator: MockGenerator) -> Harness {
    let store = MemoryStore::new();
    let query = vector_for(QUESTION);
    let other = vector_for("unrelated");
    store.add_document(
        "https://docs.example.com/install",
        "Title: Install\nURL Source: https://docs.example.com/install\nRun the installer.",
        blend(&query, &other, 0.1),
    );
    store.add_document(
        "https://docs.example.com/config",
        "Title: Config\nURL Source: https://docs.example.com/config\nEdit config.yml.",
        blend(&query, &other, 0.6),
    );
    store.add_document(
        "https://docs.example.com/install",
        "Title: Install\nURL Source: https://docs.example.com/install\nThen restart.",
        blend(&query, &other, 0.3),
    );

    let embedder = Arc::new(build_embedder(Arc::new(store.clone()), MockEmbedder::new()));
    let retriever = VectorRetriever::new(Arc::new(store.clone()));
    let config = ChatConfig {
        project: "Example".to_string(),
        follow_up_timeout_secs: 5,
        ..ChatConfig::default()
    };
    let orchestrator =
        RagOrchestrator::new(embedder, retriever, Arc::new(generator.clone()), config)
            .with_interaction_log(Arc::new(store.clone()))
            .with_retry_policy(fast_retry());

    Harness {
        store,
        generator,
        orchestrator,
    }
}

async fn collect(
    orchestrator: &RagOrchestrator,
    messages: Vec<ChatMessage>,
) -> Result<Vec<ChatEvent>> {
    let stream = orchestrator.answer(messages).await?;
    let events = tokio::time::timeout(Duration::from_secs(10), stream.collect::<Vec<_>>()).await?;
    Ok(events)
}

#[tokio::test]
async fn test_events_arrive_in_order() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let h = harness(MockGenerator::new(&[
        "Run ",
        "the ",
        "installer <reference index={2}>Restart</reference>.",
    ]));

    // --- Act ---
    let events = collect(&h.orchestrator, vec![ChatMessage::user(QUESTION)]).await?;

    // --- Assert ---
    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(
        names,
        vec!["citations", "text", "text", "text", "followUpPrompts", "finish"]
    );

    let ChatEvent::Citations(citations) = &events[0] else {
        panic!("first event must be citations");
    };
    // Passages come back nearest first; the second install passage is a duplicate URL.
    let summary: Vec<(&str, usize)> = citations.iter().map(|c| (c.url.as_str(), c.index)).collect();
    assert_eq!(
        summary,
        vec![
            ("https://docs.example.com/install", 0),
            ("https://docs.example.com/config", 2)
        ]
    );

    let text: String = events
        .iter()
        .filter_map(|e| match e {
            ChatEvent::TextDelta(t) => Some(t.as_str()),
            _ => None,
        })
        .collect();
    assert_eq!(text, "Run the installer <reference index={2}>Restart</reference>.");

    let ChatEvent::FollowUpPrompts(prompts) = &events[4] else {
        panic!("follow-ups must come after the answer");
    };
    assert_eq!(prompts.len(), 3);
    Ok(())
}

#[tokio::test]
async fn test_system_prompt_carries_numbered_context_and_recent_history() -> Result<()> {
    setup_tracing();
    let h = harness(MockGenerator::new(&["ok"]));
    let mut messages: Vec<ChatMessage> = (0..6)
        .flat_map(|i| {
            [
                ChatMessage::user(format!("question {i}")),
                ChatMessage::assistant(format!("answer {i}")),
            ]
        })
        .collect();
    messages.push(ChatMessage::user(QUESTION));

    collect(&h.orchestrator, messages).await?;

    let calls = h.generator.stream_calls();
    assert_eq!(calls.len(), 1);
    let (system_prompt, history) = &calls[0];
    assert!(system_prompt.contains("Reference Index #0\nReference Title: Install"));
    assert!(system_prompt.contains("Example"));
    assert_eq!(history.len(), 5);
    assert_eq!(history.last().map(|m| m.content.as_str()), Some(QUESTION));
    Ok(())
}

#[tokio::test]
async fn test_follow_up_failure_is_omitted() -> Result<()> {
    setup_tracing();
    let generator = MockGenerator::new(&["answer"]);
    generator.set_follow_ups(None);
    let h = harness(generator);

    let events = collect(&h.orchestrator, vec![ChatMessage::user(QUESTION)]).await?;

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["citations", "text", "finish"]);
    Ok(())
}

#[tokio::test]
async fn test_generation_failure_is_masked() -> Result<()> {
    setup_tracing();
    let generator = MockGenerator::new(&[]);
    generator.set_script(GeneratorScript::TokensThenError(vec!["partial".to_string()]));
    let h = harness(generator);

    let events = collect(&h.orchestrator, vec![ChatMessage::user(QUESTION)]).await?;

    let names: Vec<&str> = events.iter().map(|e| e.name()).collect();
    assert_eq!(names, vec!["citations", "text", "error"]);
    assert_eq!(
        events.last(),
        Some(&ChatEvent::Error(MASKED_ERROR_MESSAGE.to_string()))
    );
    Ok(())
}

#[tokio::test]
async fn test_provider_rejection_does_not_leak_details() -> Result<()> {
    setup_tracing();
    let generator = MockGenerator::new(&[]);
    generator.set_script(GeneratorScript::Fail);
    let h = harness(generator);

    let events = collect(&h.orchestrator, vec![ChatMessage::user(QUESTION)]).await?;

    let ChatEvent::Error(message) = events.last().expect("an error event") else {
        panic!("stream must end with an error");
    };
    assert!(!message.contains("sk-secret"));
    Ok(())
}

#[tokio::test]
async fn test_empty_query_is_rejected() {
    setup_tracing();
    let h = harness(MockGenerator::new(&["unused"]));

    let err = h
        .orchestrator
        .answer(vec![ChatMessage::user("   ")])
        .await
        .unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));

    let err = h.orchestrator.answer(Vec::new()).await.unwrap_err();
    assert!(matches!(err, RagError::Validation(_)));
    assert!(h.generator.stream_calls().is_empty());
}

#[tokio::test]
async fn test_no_matching_content_still_streams_an_answer() -> Result<()> {
    setup_tracing();
    let store = MemoryStore::new();
    let generator = MockGenerator::new(&["I don't know."]);
    let embedder = Arc::new(build_embedder(Arc::new(store.clone()), MockEmbedder::new()));
    let orchestrator = RagOrchestrator::new(
        embedder,
        VectorRetriever::new(Arc::new(store)),
        Arc::new(generator),
        ChatConfig::default(),
    );

    let events = collect(&orchestrator, vec![ChatMessage::user("anything")]).await?;

    assert_eq!(events.first(), Some(&ChatEvent::Citations(Vec::new())));
    assert_eq!(events.last(), Some(&ChatEvent::Finish));
    assert!(events.iter().any(|e| matches!(e, ChatEvent::TextDelta(_))));
    Ok(())
}

#[tokio::test]
async fn test_interaction_is_logged_with_remapped_references() -> Result<()> {
    setup_tracing();
    let h = harness(MockGenerator::new(&["See <reference index={1}>Again</reference>"]));

    collect(&h.orchestrator, vec![ChatMessage::user(QUESTION)]).await?;

    // The log write is off the response path; give it a moment.
    let mut records = h.store.interactions();
    for _ in 0..50 {
        if !records.is_empty() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
        records = h.store.interactions();
    }
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].user_message, QUESTION);
    assert_eq!(
        records[0].ai_response,
        "See <reference index={0}>Install</reference>"
    );
    Ok(())
}

#[tokio::test]
async fn test_reference_to_duplicate_passage_resolves_through_citations() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    // Position 1 is the second install passage, a duplicate URL of position 0.
    let h = harness(MockGenerator::new(&["Restart <reference index={1}>Again</reference>."]));

    // --- Act ---
    let events = collect(&h.orchestrator, vec![ChatMessage::user(QUESTION)]).await?;

    // --- Assert ---
    let ChatEvent::Citations(citations) = &events[0] else {
        panic!("first event must be citations");
    };
    assert_eq!(citations.len(), 2);
    assert_eq!(citations[0].indices, vec![0, 1]);
    assert_eq!(citations[1].indices, vec![2]);

    let cited = citations
        .iter()
        .find(|c| c.covers(1))
        .expect("index 1 must resolve");
    assert_eq!(cited.url, "https://docs.example.com/install");
    assert_eq!(cited.title, "Install");
    assert_eq!(cited.index, 0);
    Ok(())
}

/// Waits until the follow-up call has started, so the test knows it is in flight.
async fn wait_for_follow_up_start(generator: &MockGenerator) {
    for _ in 0..100 {
        if generator.structured_call_count() > 0 {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("follow-up generation never started");
}

#[tokio::test]
async fn test_disconnect_while_awaiting_follow_ups_aborts_them() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let generator = MockGenerator::new(&["Answer."]);
    generator.set_follow_up_delay(Duration::from_millis(300));
    let h = harness(generator);

    // --- Act ---
    let mut stream = h.orchestrator.answer(vec![ChatMessage::user(QUESTION)]).await?;
    assert!(matches!(stream.next().await, Some(ChatEvent::Citations(_))));
    assert!(matches!(stream.next().await, Some(ChatEvent::TextDelta(_))));
    wait_for_follow_up_start(&h.generator).await;
    drop(stream);
    tokio::time::sleep(Duration::from_millis(600)).await;

    // --- Assert ---
    assert_eq!(h.generator.structured_call_count(), 1);
    assert_eq!(h.generator.structured_completed_count(), 0);
    Ok(())
}

#[tokio::test]
async fn test_disconnect_before_answer_starts_aborts_follow_ups() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let generator = MockGenerator::new(&["Too late."]);
    generator.set_stream_delay(Duration::from_secs(2));
    generator.set_follow_up_delay(Duration::from_millis(300));
    let h = harness(generator);

    // --- Act ---
    let mut stream = h.orchestrator.answer(vec![ChatMessage::user(QUESTION)]).await?;
    assert!(matches!(stream.next().await, Some(ChatEvent::Citations(_))));
    wait_for_follow_up_start(&h.generator).await;
    drop(stream);
    tokio::time::sleep(Duration::from_millis(600)).await;

    // --- Assert ---
    assert_eq!(h.generator.structured_completed_count(), 0);
    assert!(h.store.interactions().is_empty());
    Ok(())
}

#[tokio::test]
async fn test_slow_follow_ups_do_not_delay_answer_tokens() -> Result<()> {
    // --- Arrange ---
    setup_tracing();
    let generator = MockGenerator::new(&["Fast ", "answer."]);
    generator.set_follow_up_delay(Duration::from_secs(3));
    let h = harness(generator);
    let started = Instant::now();

    // --- Act ---
    let mut stream = h.orchestrator.answer(vec![ChatMessage::user(QUESTION)]).await?;
    assert!(matches!(stream.next().await, Some(ChatEvent::Citations(_))));
    let first_text = stream.next().await;
    let elapsed = started.elapsed();

    // --- Assert ---
    assert_eq!(first_text, Some(ChatEvent::TextDelta("Fast ".to_string())));
    assert!(elapsed < Duration::from_secs(1), "first token took {elapsed:?}");
    Ok(())
}
