//! # Markdown Chunking
//!
//! Splits a markdown document into line-based chunks that stay under a character
//! budget, carry a few lines of overlap across size splits, and never run across
//! a markdown header. Each chunk is prefixed with a header naming its source so it
//! can be cited on its own:
//!
//! ```text
//! Title: Getting Started
//! URL Source: https://example.com/docs/getting-started.md
//! # Getting Started
//! ...
//! ```

use crate::types::{Chunk, ChunkMetadata};

const TITLE_PREFIX: &str = "Title: ";
const URL_PREFIX: &str = "URL Source: ";

/// Approximate characters per line used to turn the overlap budget into a line count.
const OVERLAP_CHARS_PER_LINE: usize = 50;

/// Renders the two-line header that starts every chunk of a document.
pub fn render_header(metadata: &ChunkMetadata) -> String {
    format!(
        "{TITLE_PREFIX}{}\n{URL_PREFIX}{}",
        metadata.title, metadata.url
    )
}

/// Chunks `markdown` into self-citing passages.
///
/// Blank lines are dropped. When adding a line would push the running chunk past
/// `chunk_size` characters, the chunk is closed and the next one starts with the
/// last `ceil(overlap_size / 50)` lines of it. A line starting with `#` always
/// opens a new chunk. A single line longer than `chunk_size` is kept whole.
pub fn chunk_markdown(
    markdown: &str,
    metadata: &ChunkMetadata,
    chunk_size: usize,
    overlap_size: usize,
) -> Vec<Chunk> {
    let header = render_header(metadata);
    let overlap_lines = overlap_size.div_ceil(OVERLAP_CHARS_PER_LINE);

    let mut bodies: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    let mut current_size = 0usize;

    for line in markdown.trim().lines().filter(|l| !l.trim().is_empty()) {
        let line_size = line.chars().count();

        if line.starts_with('#') && !current.is_empty() {
            bodies.push(current.join("\n"));
            current.clear();
            current_size = 0;
        } else if current_size + line_size > chunk_size && !current.is_empty() {
            bodies.push(current.join("\n"));
            let keep_from = current.len().saturating_sub(overlap_lines);
            current.drain(..keep_from);
            current_size = current.iter().map(|l| l.chars().count()).sum();
        }

        current.push(line);
        current_size += line_size;
    }

    if !current.is_empty() {
        bodies.push(current.join("\n"));
    }

    bodies
        .into_iter()
        .map(|body| Chunk {
            content: format!("{header}\n{body}"),
            metadata: metadata.clone(),
        })
        .collect()
}

/// The pieces of a stored passage: its header fields and the document slice.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ParsedPassage<'a> {
    pub title: Option<&'a str>,
    pub url: Option<&'a str>,
    pub body: &'a str,
}

/// Splits chunk content back into header fields and body.
///
/// Content without a header is returned whole as the body.
pub fn parse_passage(content: &str) -> ParsedPassage<'_> {
    let mut title = None;
    let mut url = None;
    let mut rest = content;

    if let Some(after) = rest.strip_prefix(TITLE_PREFIX) {
        let (line, tail) = split_first_line(after);
        title = Some(line);
        rest = tail;
    }
    if let Some(after) = rest.strip_prefix(URL_PREFIX) {
        let (line, tail) = split_first_line(after);
        url = Some(line);
        rest = tail;
    }

    if title.is_none() && url.is_none() {
        return ParsedPassage {
            title,
            url,
            body: content,
        };
    }

    ParsedPassage {
        title,
        url,
        body: rest,
    }
}

/// Returns the document slice of a chunk, without its metadata header.
pub fn strip_header(content: &str) -> &str {
    parse_passage(content).body
}

fn split_first_line(s: &str) -> (&str, &str) {
    match s.split_once('\n') {
        Some((line, tail)) => (line.trim_end_matches('\r'), tail),
        None => (s, ""),
    }
}
