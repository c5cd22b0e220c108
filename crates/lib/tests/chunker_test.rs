//! # Chunker Tests
//!
//! Verifies section boundaries, size splitting with overlap, the metadata header
//! on every chunk, and that stripping the headers recovers every input line.

use docrag::chunker::{chunk_markdown, parse_passage, render_header, strip_header};
use docrag::types::ChunkMetadata;

fn metadata() -> ChunkMetadata {
    ChunkMetadata {
        title: "Getting Started".to_string(),
        url: "https://docs.example.com/getting-started.md".to_string(),
    }
}

#[test]
fn test_three_sections_produce_three_chunks() {
    let doc = "# A\ntext a\n# B\ntext b\n# C\ntext c";
    let chunks = chunk_markdown(doc, &metadata(), 1024, 128);

    assert_eq!(chunks.len(), 3);
    for (chunk, section) in chunks.iter().zip(["# A", "# B", "# C"]) {
        assert!(strip_header(&chunk.content).starts_with(section));
    }
    assert_eq!(strip_header(&chunks[1].content), "# B\ntext b");
}

#[test]
fn test_every_chunk_starts_with_header() {
    let doc = (0..60)
        .map(|i| format!("line number {i} with some words in it"))
        .collect::<Vec<_>>()
        .join("\n");
    let header = render_header(&metadata());
    let chunks = chunk_markdown(&doc, &metadata(), 200, 128);

    assert!(chunks.len() > 1);
    for chunk in &chunks {
        assert!(chunk.content.starts_with(&format!("{header}\n")));
        assert_eq!(chunk.metadata, metadata());
        let parsed = parse_passage(&chunk.content);
        assert_eq!(parsed.title, Some("Getting Started"));
        assert_eq!(
            parsed.url,
            Some("https://docs.example.com/getting-started.md")
        );
    }
}

#[test]
fn test_chunks_cover_every_line_with_overlap() {
    let lines: Vec<String> = (0..40).map(|i| format!("content line {i:02}")).collect();
    let doc = lines.join("\n\n");
    let chunks = chunk_markdown(&doc, &metadata(), 100, 128);

    // Every non-blank input line appears in some chunk.
    for line in &lines {
        assert!(
            chunks.iter().any(|c| strip_header(&c.content).lines().any(|l| l == line)),
            "line '{line}' is missing"
        );
    }

    // ceil(128 / 50) = 3 lines of overlap between size-split chunks.
    let first: Vec<&str> = strip_header(&chunks[0].content).lines().collect();
    let second: Vec<&str> = strip_header(&chunks[1].content).lines().collect();
    assert_eq!(&first[first.len() - 3..], &second[..3]);
}

#[test]
fn test_blank_lines_are_dropped_and_document_is_trimmed() {
    let doc = "\n\n  first\n\n\nsecond\n\n";
    let chunks = chunk_markdown(doc, &metadata(), 1024, 128);
    assert_eq!(chunks.len(), 1);
    assert_eq!(strip_header(&chunks[0].content), "first\nsecond");
}

#[test]
fn test_empty_document_has_no_chunks() {
    assert!(chunk_markdown("", &metadata(), 1024, 128).is_empty());
    assert!(chunk_markdown("  \n\n \n", &metadata(), 1024, 128).is_empty());
}

#[test]
fn test_oversized_line_is_its_own_chunk() {
    let long = "x".repeat(3000);
    let doc = format!("short intro\n{long}\nshort outro");
    let chunks = chunk_markdown(&doc, &metadata(), 100, 0);

    assert_eq!(chunks.len(), 3);
    assert_eq!(strip_header(&chunks[1].content), long);
}

#[test]
fn test_header_on_first_line_does_not_emit_empty_chunk() {
    let chunks = chunk_markdown("# Only\nbody", &metadata(), 1024, 128);
    assert_eq!(chunks.len(), 1);
    assert_eq!(strip_header(&chunks[0].content), "# Only\nbody");
}

#[test]
fn test_parse_passage_without_header_returns_whole_body() {
    let parsed = parse_passage("just some text");
    assert_eq!(parsed.title, None);
    assert_eq!(parsed.url, None);
    assert_eq!(parsed.body, "just some text");
}
