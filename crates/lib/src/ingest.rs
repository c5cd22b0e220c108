//! # Document Indexing
//!
//! Turns source documents into stored, embedded chunks:
//! chunk, fingerprint, skip what is already stored, embed, insert if absent.
//! Failures of individual chunks are counted and logged; they never abort a run.

use crate::{
    chunker::chunk_markdown,
    constants::{DEFAULT_CHUNK_SIZE, DEFAULT_OVERLAP_SIZE},
    embedder::BatchEmbedder,
    errors::IngestError,
    hash::document_key,
    providers::db::storage::DocumentStore,
    types::{ChunkMetadata, Document, SourceDocument},
};
use std::{
    collections::HashMap,
    path::{Path, PathBuf},
    sync::Arc,
};
use tracing::{info, warn};

/// Counts from one indexing run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct IndexReport {
    /// Source documents processed.
    pub documents: usize,
    /// Unique chunks produced.
    pub chunks: usize,
    /// Chunks already stored before (or during) this run.
    pub skipped_existing: usize,
    pub inserted: usize,
    /// Chunks that could not be embedded or stored.
    pub failed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct IndexOptions {
    pub chunk_size: usize,
    pub overlap_size: usize,
}

impl Default for IndexOptions {
    fn default() -> Self {
        Self {
            chunk_size: DEFAULT_CHUNK_SIZE,
            overlap_size: DEFAULT_OVERLAP_SIZE,
        }
    }
}

struct PendingChunk<'a> {
    hash: String,
    content: String,
    metadata: ChunkMetadata,
    source: &'a SourceDocument,
}

#[derive(Debug, Clone)]
pub struct Indexer {
    embedder: Arc<BatchEmbedder>,
    store: Arc<dyn DocumentStore>,
    options: IndexOptions,
}

impl Indexer {
    pub fn new(
        embedder: Arc<BatchEmbedder>,
        store: Arc<dyn DocumentStore>,
        options: IndexOptions,
    ) -> Self {
        Self {
            embedder,
            store,
            options,
        }
    }

    pub async fn index_documents(
        &self,
        documents: &[SourceDocument],
    ) -> Result<IndexReport, IngestError> {
        if self.options.chunk_size == 0 {
            return Err(IngestError::InvalidInput(
                "chunk size must be greater than zero".to_string(),
            ));
        }

        let mut report = IndexReport {
            documents: documents.len(),
            ..Default::default()
        };

        // --- 1. Chunk and fingerprint, dropping repeats within this run ---
        let mut seen: HashMap<String, usize> = HashMap::new();
        let mut pending: Vec<PendingChunk> = Vec::new();
        for source in documents {
            let metadata = ChunkMetadata {
                title: source.title.clone(),
                url: source.url.clone(),
            };
            for chunk in chunk_markdown(
                &source.content,
                &metadata,
                self.options.chunk_size,
                self.options.overlap_size,
            ) {
                let hash = document_key(&chunk.content);
                if let Some(&first) = seen.get(&hash) {
                    if pending[first].content != chunk.content {
                        warn!(
                            hash = %hash,
                            url = %source.url,
                            "Document hash collision; keeping the first chunk."
                        );
                    }
                    report.skipped_existing += 1;
                    continue;
                }
                seen.insert(hash.clone(), pending.len());
                pending.push(PendingChunk {
                    hash,
                    content: chunk.content,
                    metadata: chunk.metadata,
                    source,
                });
            }
        }
        report.chunks = pending.len();

        // --- 2. Skip chunks that are already stored ---
        let hashes: Vec<String> = pending.iter().map(|c| c.hash.clone()).collect();
        let existing = self.store.existing_document_hashes(&hashes).await?;
        let before = pending.len();
        pending.retain(|c| !existing.contains(&c.hash));
        report.skipped_existing += before - pending.len();
        info!(
            documents = report.documents,
            chunks = report.chunks,
            new = pending.len(),
            "Prepared chunks for indexing."
        );

        // --- 3. Embed and insert, one provider batch at a time ---
        for batch in pending.chunks(self.embedder.batch_size()) {
            let texts: Vec<String> = batch.iter().map(|c| c.content.clone()).collect();
            let embeddings = match self.embedder.embed_batch(&texts).await {
                Ok(embeddings) => embeddings,
                Err(e) => {
                    warn!(chunks = batch.len(), "Failed to embed chunk batch: {e}");
                    report.failed += batch.len();
                    continue;
                }
            };

            for (chunk, embedding) in batch.iter().zip(embeddings) {
                let document = Document {
                    hash: chunk.hash.clone(),
                    title: chunk.metadata.title.clone(),
                    url: chunk.metadata.url.clone(),
                    content: chunk.content.clone(),
                    embedding,
                    kind: chunk.source.kind,
                    created_at: chunk.source.created_at,
                };
                match self.store.insert_document(&document).await {
                    Ok(true) => report.inserted += 1,
                    Ok(false) => report.skipped_existing += 1,
                    Err(e) => {
                        warn!(
                            hash = %document.hash,
                            url = %document.url,
                            "Failed to insert document: {e}"
                        );
                        report.failed += 1;
                    }
                }
            }
        }

        info!(
            inserted = report.inserted,
            skipped = report.skipped_existing,
            failed = report.failed,
            "Indexing finished."
        );
        Ok(report)
    }
}

/// Reads every `.md` and `.mdx` file under `root` as a source document.
///
/// The title is the first `# ` heading, or the file stem. The URL is `base_url`
/// joined with the path relative to `root`. Files are returned in path order.
pub fn load_markdown_dir(root: &Path, base_url: &str) -> Result<Vec<SourceDocument>, IngestError> {
    if !root.is_dir() {
        return Err(IngestError::InvalidInput(format!(
            "'{}' is not a directory",
            root.display()
        )));
    }

    let mut files = Vec::new();
    collect_markdown_files(root, &mut files)?;
    files.sort();

    let base_url = base_url.trim_end_matches('/');
    files
        .into_iter()
        .map(|path| {
            let content = std::fs::read_to_string(&path)?;
            let relative = path
                .strip_prefix(root)
                .unwrap_or(&path)
                .components()
                .map(|c| c.as_os_str().to_string_lossy())
                .collect::<Vec<_>>()
                .join("/");
            let title = content
                .lines()
                .find_map(|l| l.strip_prefix("# "))
                .map(|t| t.trim().to_string())
                .unwrap_or_else(|| {
                    path.file_stem()
                        .map(|s| s.to_string_lossy().into_owned())
                        .unwrap_or_default()
                });
            Ok(SourceDocument {
                title,
                url: format!("{base_url}/{relative}"),
                content,
                kind: Default::default(),
                created_at: None,
            })
        })
        .collect()
}

fn collect_markdown_files(dir: &Path, files: &mut Vec<PathBuf>) -> Result<(), IngestError> {
    for entry in std::fs::read_dir(dir)? {
        let path = entry?.path();
        if path.is_dir() {
            collect_markdown_files(&path, files)?;
        } else if matches!(
            path.extension().and_then(|e| e.to_str()),
            Some("md") | Some("mdx")
        ) {
            files.push(path);
        }
    }
    Ok(())
}
