//! # `docrag-indexer` Integration Tests
//!
//! Runs the indexer end to end against a temporary directory of markdown pages,
//! a temporary SQLite file and a `wiremock` embedding endpoint.

use anyhow::Result;
use clap::Parser;
use docrag::IndexReport;
use docrag_indexer::{format_report, run, Cli};
use docrag_test_utils::vector_for;
use serde_json::{json, Value};
use std::{fs, path::Path};
use tempfile::{tempdir, TempDir};
use wiremock::matchers::{method, path};
use wiremock::{Mock, MockServer, Request, Respond, ResponseTemplate};

/// Answers an OpenAI-style embeddings request with one vector per input text.
struct EchoEmbeddings;

impl Respond for EchoEmbeddings {
    fn respond(&self, request: &Request) -> ResponseTemplate {
        let body: Value = serde_json::from_slice(&request.body).unwrap_or(Value::Null);
        let data: Vec<Value> = body["input"]
            .as_array()
            .map(|inputs| {
                inputs
                    .iter()
                    .enumerate()
                    .map(|(index, text)| {
                        json!({
                            "index": index,
                            "embedding": vector_for(text.as_str().unwrap_or_default())
                        })
                    })
                    .collect()
            })
            .unwrap_or_default();
        ResponseTemplate::new(200).set_body_json(json!({ "data": data }))
    }
}

fn write_docs(root: &Path) -> Result<()> {
    fs::create_dir_all(root.join("guides"))?;
    fs::write(
        root.join("install.md"),
        "# Installation\n\nDownload the installer and run it.\n",
    )?;
    fs::write(
        root.join("guides/config.md"),
        "# Configuration\n\nEdit `widget.toml` to change the port.\n",
    )?;
    fs::write(root.join("notes.txt"), "Not documentation.")?;
    Ok(())
}

fn cli_for(docs: &Path, db: &Path, server: &MockServer) -> Result<Cli> {
    Ok(Cli::try_parse_from([
        "docrag-indexer".to_string(),
        docs.display().to_string(),
        "--base-url".to_string(),
        "https://docs.example.com".to_string(),
        "--db".to_string(),
        db.display().to_string(),
        "--embedding-api-url".to_string(),
        format!("{}/v1/embeddings", server.uri()),
        "--embedding-provider".to_string(),
        "openai".to_string(),
    ])?)
}

async fn fixture() -> Result<(TempDir, MockServer)> {
    let dir = tempdir()?;
    write_docs(&dir.path().join("docs"))?;
    let server = MockServer::start().await;
    Ok((dir, server))
}

#[tokio::test]
async fn test_indexes_markdown_and_skips_on_rerun() -> Result<()> {
    // --- Arrange ---
    let (dir, server) = fixture().await?;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(EchoEmbeddings)
        .expect(1)
        .mount(&server)
        .await;
    let docs = dir.path().join("docs");
    let db = dir.path().join("db").join("docs.db");

    // --- Act ---
    let first = run(cli_for(&docs, &db, &server)?).await?;
    let second = run(cli_for(&docs, &db, &server)?).await?;

    // --- Assert ---
    assert_eq!(first.documents, 2);
    assert_eq!(first.chunks, 2);
    assert_eq!(first.inserted, 2);
    assert_eq!(first.failed, 0);
    assert!(db.exists());

    assert_eq!(
        second,
        IndexReport {
            documents: 2,
            chunks: 2,
            skipped_existing: 2,
            inserted: 0,
            failed: 0,
        }
    );
    Ok(())
}

#[tokio::test]
async fn test_embedding_failures_are_counted_not_fatal() -> Result<()> {
    let (dir, server) = fixture().await?;
    Mock::given(method("POST"))
        .and(path("/v1/embeddings"))
        .respond_with(ResponseTemplate::new(400).set_body_string("bad model"))
        .mount(&server)
        .await;
    let docs = dir.path().join("docs");
    let db = dir.path().join("docs.db");

    let report = run(cli_for(&docs, &db, &server)?).await?;

    assert_eq!(report.chunks, 2);
    assert_eq!(report.inserted, 0);
    assert_eq!(report.failed, 2);
    Ok(())
}

#[tokio::test]
async fn test_missing_directory_is_an_error() -> Result<()> {
    let dir = tempdir()?;
    let server = MockServer::start().await;

    let cli = cli_for(&dir.path().join("nowhere"), &dir.path().join("docs.db"), &server)?;
    let result = run(cli).await;

    let message = format!("{:?}", result.err());
    assert!(message.contains("Failed to read documentation"), "{message}");
    Ok(())
}

#[test]
fn test_cli_defaults() -> Result<()> {
    let cli = Cli::try_parse_from([
        "docrag-indexer",
        "./docs",
        "--base-url",
        "https://docs.example.com",
        "--db",
        "db/docrag.db",
        "--embedding-api-url",
        "http://localhost:11434/v1/embeddings",
        "--embedding-model",
        "nomic-embed-text",
    ])?;

    assert_eq!(cli.chunk_size, 1024);
    assert_eq!(cli.overlap, 128);
    assert_eq!(cli.embedding_model, "nomic-embed-text");
    assert!(cli.batch_size.is_none());
    Ok(())
}

#[test]
fn test_cli_requires_base_url() {
    let result = Cli::try_parse_from([
        "docrag-indexer",
        "./docs",
        "--embedding-api-url",
        "http://localhost:11434/v1/embeddings",
    ]);

    if std::env::var("DOCRAG_BASE_URL").is_err() {
        assert!(result.is_err());
    }
}

#[test]
fn test_format_report() {
    let report = IndexReport {
        documents: 3,
        chunks: 10,
        skipped_existing: 4,
        inserted: 5,
        failed: 1,
    };

    assert_eq!(
        format_report(&report),
        "Indexed 3 documents into 10 chunks: 5 inserted, 4 already present, 1 failed."
    );
}
