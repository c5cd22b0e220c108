//! # Citations
//!
//! Converts retrieved passages into the citations shown to the user and into
//! the numbered reference block the model answers from. Reference numbers in
//! the block are positions in the retrieved list, so a model answer can point
//! back at a citation with `<reference index={N}>Title</reference>`.
//!
//! Citations shown to the user are deduplicated by URL, but every retrieved
//! position stays resolvable: a kept citation lists all positions that share its
//! URL in `indices`.

use crate::{
    chunker::parse_passage, constants::CITATION_SNIPPET_CHARS, errors::RagError,
    types::DocumentRef,
};
use regex::{Captures, Regex};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

const REFERENCE_TAG_PATTERN: &str = r"<reference index=\{?(\d+)\}?>(.*?)</reference>";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Citation {
    pub url: String,
    pub title: String,
    pub content: String,
    /// Position of the passage in the retrieved list.
    pub index: usize,
    /// Every retrieved position with this URL, starting with `index`.
    pub indices: Vec<usize>,
}

impl Citation {
    /// Whether a reference to retrieved position `index` resolves to this citation.
    pub fn covers(&self, index: usize) -> bool {
        self.indices.contains(&index)
    }
}

/// One citation per retrieved passage, in retrieval order.
pub fn build_citations(passages: &[DocumentRef]) -> Vec<Citation> {
    passages
        .iter()
        .enumerate()
        .map(|(index, passage)| {
            let parsed = parse_passage(&passage.content);
            Citation {
                url: parsed.url.unwrap_or(&passage.url).to_string(),
                title: parsed.title.unwrap_or_default().to_string(),
                content: snippet(parsed.body),
                index,
                indices: vec![index],
            }
        })
        .collect()
}

/// The first `CITATION_SNIPPET_CHARS` characters of `body`, followed by `...`.
fn snippet(body: &str) -> String {
    let mut out: String = body.chars().take(CITATION_SNIPPET_CHARS).collect();
    out.push_str("...");
    out
}

/// Keeps the first citation for each URL, preserving order and original indices.
/// Positions of the dropped duplicates are folded into the kept citation's `indices`.
pub fn dedup_by_url(citations: &[Citation]) -> Vec<Citation> {
    let mut positions: HashMap<&str, usize> = HashMap::new();
    let mut deduped: Vec<Citation> = Vec::new();
    for citation in citations {
        match positions.get(citation.url.as_str()) {
            Some(&kept) => {
                for &index in &citation.indices {
                    if !deduped[kept].indices.contains(&index) {
                        deduped[kept].indices.push(index);
                    }
                }
            }
            None => {
                positions.insert(citation.url.as_str(), deduped.len());
                deduped.push(citation.clone());
            }
        }
    }
    deduped
}

/// Renders the reference block handed to the model. Reference numbers equal
/// positions in `passages`.
pub fn format_grounding_context(passages: &[DocumentRef]) -> String {
    passages
        .iter()
        .enumerate()
        .map(|(i, passage)| {
            let parsed = parse_passage(&passage.content);
            format!(
                "Reference Index #{i}\nReference Title: {}\nURL Source: {}\n----------\n{}\n----------",
                parsed.title.unwrap_or_default(),
                parsed.url.unwrap_or(&passage.url),
                parsed.body.trim(),
            )
        })
        .collect::<Vec<_>>()
        .join("\n")
}

/// Index of the first citation that shares a URL with the citation at `index`.
pub fn canonical_index(citations: &[Citation], index: usize) -> Option<usize> {
    let url = &citations.get(index)?.url;
    citations.iter().position(|c| &c.url == url)
}

/// Rewrites reference tags so that each points at the canonical (first) citation
/// for its URL, with that citation's title. Tags with an unknown index are left as is.
pub fn remap_references(text: &str, citations: &[Citation]) -> Result<String, RagError> {
    let re = Regex::new(REFERENCE_TAG_PATTERN)?;
    let remapped = re.replace_all(text, |caps: &Captures| {
        let original = caps[0].to_string();
        let Ok(index) = caps[1].parse::<usize>() else {
            return original;
        };
        match canonical_index(citations, index) {
            Some(canonical) => format!(
                "<reference index={{{}}}>{}</reference>",
                canonical, citations[canonical].title
            ),
            None => original,
        }
    });
    Ok(remapped.into_owned())
}
