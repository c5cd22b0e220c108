//! # Embedding Cache
//!
//! Content-addressed cache of embeddings in front of an [`EmbeddingStore`].
//! Reads go straight to the store. Writes from batch embedding go through a
//! bounded queue drained by a single background task, so the caller never waits
//! on persistence and a failed write never fails an embedding call.

use crate::{
    constants::{CACHE_WRITE_BATCH_SIZE, CACHE_WRITE_PAUSE_MS},
    errors::RagError,
    hash::hash_string,
    providers::db::storage::EmbeddingStore,
    types::CacheEntry,
};
use futures::future::join_all;
use serde::Deserialize;
use std::{
    collections::HashSet,
    sync::{
        atomic::{AtomicU64, Ordering},
        Arc,
    },
    time::Duration,
};
use tokio::{
    sync::{mpsc, oneshot, Mutex},
    task::JoinHandle,
};
use tracing::{debug, info, warn};

/// Tuning for the background cache writer.
#[derive(Debug, Clone, Deserialize)]
pub struct CacheConfig {
    /// Pending write jobs. Beyond this, `enqueue` drops and `enqueue_wait` waits.
    #[serde(default = "default_queue_capacity")]
    pub queue_capacity: usize,
    /// Entries persisted concurrently before pausing.
    #[serde(default = "default_write_batch_size")]
    pub write_batch_size: usize,
    /// Pause between write sub-batches, in milliseconds.
    #[serde(default = "default_write_pause_ms")]
    pub write_pause_ms: u64,
}

fn default_queue_capacity() -> usize {
    64
}

fn default_write_batch_size() -> usize {
    CACHE_WRITE_BATCH_SIZE
}

fn default_write_pause_ms() -> u64 {
    CACHE_WRITE_PAUSE_MS
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            queue_capacity: default_queue_capacity(),
            write_batch_size: default_write_batch_size(),
            write_pause_ms: default_write_pause_ms(),
        }
    }
}

/// Outcome of persisting one batch of cache entries.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheWriteReport {
    pub successes: usize,
    pub failures: usize,
}

/// Process-wide cache write counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    /// Entries persisted (or already present).
    pub written: u64,
    /// Entries whose write failed.
    pub failed: u64,
    /// Entries discarded because the queue was full or closed.
    pub dropped: u64,
}

#[derive(Debug, Default)]
struct Counters {
    written: AtomicU64,
    failed: AtomicU64,
    dropped: AtomicU64,
}

impl Counters {
    fn record(&self, report: CacheWriteReport) {
        self.written
            .fetch_add(report.successes as u64, Ordering::Relaxed);
        self.failed
            .fetch_add(report.failures as u64, Ordering::Relaxed);
    }
}

enum WriteJob {
    Persist(Vec<CacheEntry>),
    Flush(oneshot::Sender<()>),
    Shutdown(oneshot::Sender<()>),
}

/// The embedding cache. Cheap to clone; clones share the store and the writer.
#[derive(Clone, Debug)]
pub struct EmbeddingCache {
    store: Arc<dyn EmbeddingStore>,
    sender: mpsc::Sender<WriteJob>,
    counters: Arc<Counters>,
    config: CacheConfig,
    writer: Arc<Mutex<Option<JoinHandle<()>>>>,
}

impl std::fmt::Debug for WriteJob {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            WriteJob::Persist(entries) => write!(f, "Persist({})", entries.len()),
            WriteJob::Flush(_) => f.write_str("Flush"),
            WriteJob::Shutdown(_) => f.write_str("Shutdown"),
        }
    }
}

impl EmbeddingCache {
    /// Creates the cache and starts its background writer. Must be called inside a Tokio runtime.
    pub fn new(store: Arc<dyn EmbeddingStore>, config: CacheConfig) -> Self {
        let (sender, receiver) = mpsc::channel(config.queue_capacity.max(1));
        let counters = Arc::new(Counters::default());
        let handle = tokio::spawn(run_writer(
            store.clone(),
            receiver,
            counters.clone(),
            config.clone(),
        ));
        Self {
            store,
            sender,
            counters,
            config,
            writer: Arc::new(Mutex::new(Some(handle))),
        }
    }

    /// Returns the cached embedding for `text`.
    ///
    /// Lookup failures are logged and reported as a miss. An entry whose stored
    /// text differs from `text` is a fingerprint collision and is also a miss.
    pub async fn get(&self, text: &str) -> Option<Vec<f32>> {
        let hash = hash_string(text);
        match self.store.lookup_embedding(hash).await {
            Ok(Some(entry)) if entry.text == text => Some(entry.embedding),
            Ok(Some(_)) => {
                warn!(hash, "Embedding cache key collision; treating as a miss.");
                None
            }
            Ok(None) => None,
            Err(e) => {
                warn!(hash, "Embedding cache lookup failed, treating as a miss: {e}");
                None
            }
        }
    }

    pub async fn lookup(&self, hash: u32) -> Result<Option<CacheEntry>, RagError> {
        self.store.lookup_embedding(hash).await
    }

    /// Stores one entry and waits for the write. First write wins.
    pub async fn store(&self, entry: &CacheEntry) -> Result<bool, RagError> {
        self.store.store_embedding(entry).await
    }

    /// Returns which of `hashes` are cached.
    pub async fn lookup_many(&self, hashes: &[u32]) -> Result<HashSet<u32>, RagError> {
        self.store.lookup_embeddings(hashes).await
    }

    /// Queues `entries` for background persistence without waiting.
    ///
    /// When the queue is full (or the writer has shut down) the job is dropped
    /// with a warning and counted in [`CacheStats::dropped`].
    pub fn enqueue(&self, entries: Vec<CacheEntry>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        if let Err(e) = self.sender.try_send(WriteJob::Persist(entries)) {
            let reason = match e {
                mpsc::error::TrySendError::Full(_) => "queue is full",
                mpsc::error::TrySendError::Closed(_) => "writer has shut down",
            };
            warn!(entries = count, "Dropping embedding cache write: {reason}.");
            self.counters
                .dropped
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Queues `entries` for background persistence, waiting for room when the
    /// queue is full. Only a shut-down writer drops the job.
    pub async fn enqueue_wait(&self, entries: Vec<CacheEntry>) {
        if entries.is_empty() {
            return;
        }
        let count = entries.len();
        if self.sender.send(WriteJob::Persist(entries)).await.is_err() {
            warn!(entries = count, "Dropping embedding cache write: writer has shut down.");
            self.counters
                .dropped
                .fetch_add(count as u64, Ordering::Relaxed);
        }
    }

    /// Waits until every job queued before this call has been persisted.
    pub async fn flush(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WriteJob::Flush(tx)).await.is_ok() {
            let _ = rx.await;
        }
    }

    /// Persists everything still queued and stops the writer. Later enqueues are dropped.
    pub async fn shutdown(&self) {
        let (tx, rx) = oneshot::channel();
        if self.sender.send(WriteJob::Shutdown(tx)).await.is_ok() {
            let _ = rx.await;
        }
        if let Some(handle) = self.writer.lock().await.take() {
            if let Err(e) = handle.await {
                warn!("Embedding cache writer ended abnormally: {e}");
            }
        }
        let stats = self.stats();
        info!(
            written = stats.written,
            failed = stats.failed,
            dropped = stats.dropped,
            "Embedding cache writer stopped."
        );
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            written: self.counters.written.load(Ordering::Relaxed),
            failed: self.counters.failed.load(Ordering::Relaxed),
            dropped: self.counters.dropped.load(Ordering::Relaxed),
        }
    }

    pub fn config(&self) -> &CacheConfig {
        &self.config
    }
}

async fn run_writer(
    store: Arc<dyn EmbeddingStore>,
    mut receiver: mpsc::Receiver<WriteJob>,
    counters: Arc<Counters>,
    config: CacheConfig,
) {
    let pause = Duration::from_millis(config.write_pause_ms);
    while let Some(job) = receiver.recv().await {
        match job {
            WriteJob::Persist(entries) => {
                let report =
                    persist_batch(store.as_ref(), &entries, config.write_batch_size, pause).await;
                debug!(
                    successes = report.successes,
                    failures = report.failures,
                    "Persisted embedding cache batch."
                );
                counters.record(report);
            }
            WriteJob::Flush(ack) => {
                let _ = ack.send(());
            }
            WriteJob::Shutdown(ack) => {
                receiver.close();
                // Drain jobs that were accepted before the channel closed.
                while let Some(job) = receiver.recv().await {
                    match job {
                        WriteJob::Persist(entries) => {
                            let report = persist_batch(
                                store.as_ref(),
                                &entries,
                                config.write_batch_size,
                                pause,
                            )
                            .await;
                            counters.record(report);
                        }
                        WriteJob::Flush(ack) | WriteJob::Shutdown(ack) => {
                            let _ = ack.send(());
                        }
                    }
                }
                let _ = ack.send(());
                return;
            }
        }
    }
}

/// Writes `entries` in concurrent sub-batches of `batch_size`, pausing between
/// sub-batches. Failures are logged and counted; nothing is returned as an error.
pub async fn persist_batch(
    store: &dyn EmbeddingStore,
    entries: &[CacheEntry],
    batch_size: usize,
    pause: Duration,
) -> CacheWriteReport {
    let mut report = CacheWriteReport::default();
    let batches: Vec<&[CacheEntry]> = entries.chunks(batch_size.max(1)).collect();
    let total = batches.len();

    for (i, batch) in batches.into_iter().enumerate() {
        let results = join_all(batch.iter().map(|entry| store.store_embedding(entry))).await;
        for (entry, result) in batch.iter().zip(results) {
            match result {
                Ok(_) => report.successes += 1,
                Err(e) => {
                    report.failures += 1;
                    warn!(hash = entry.hash, "Failed to cache embedding: {e}");
                }
            }
        }
        if i + 1 < total && !pause.is_zero() {
            tokio::time::sleep(pause).await;
        }
    }
    report
}
