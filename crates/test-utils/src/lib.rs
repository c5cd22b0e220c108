use anyhow::Result;
use async_trait::async_trait;
use docrag::{
    constants::EMBEDDING_DIMENSIONS,
    errors::RagError,
    hash::hash_string,
    providers::{
        ai::{Embedder, GenerationOptions, Generator, TokenStream},
        db::{
            sqlite::SqliteProvider,
            storage::{DocumentStore, EmbeddingStore, InteractionLog, VectorSearch},
        },
    },
    retry::RetryPolicy,
    types::{CacheEntry, ChatMessage, Document, DocumentRef, InteractionRecord},
};
use futures::{stream, StreamExt};
use std::collections::{HashMap, HashSet};
use std::fmt::Debug;
use std::time::Duration;
use std::sync::{
    atomic::{AtomicUsize, Ordering},
    Arc, Mutex,
};

// --- Test Setup ---

/// A helper struct to manage database creation for each test.
pub struct TestSetup {
    pub provider: SqliteProvider,
}

impl TestSetup {
    /// Creates a new, isolated in-memory database and initializes the schema.
    pub async fn new() -> Result<Self> {
        let provider = SqliteProvider::new(":memory:", RetryPolicy::none()).await?;
        provider.initialize_schema().await?;
        Ok(Self { provider })
    }
}

// --- Vectors ---

/// A deterministic, normalised pseudo-random vector derived from `text`.
pub fn vector_for(text: &str) -> Vec<f32> {
    let mut state = u64::from(hash_string(text)) | 1;
    let raw: Vec<f32> = (0..EMBEDDING_DIMENSIONS)
        .map(|_| {
            // xorshift64
            state ^= state << 13;
            state ^= state >> 7;
            state ^= state << 17;
            (state % 2000) as f32 / 1000.0 - 1.0
        })
        .collect();
    normalise(raw)
}

/// A unit vector along `axis`.
pub fn axis_vector(axis: usize) -> Vec<f32> {
    let mut v = vec![0.0; EMBEDDING_DIMENSIONS];
    v[axis % EMBEDDING_DIMENSIONS] = 1.0;
    v
}

/// A unit vector in the plane of `a` and `b`, at `weight` of the way from `a` to `b`.
pub fn blend(a: &[f32], b: &[f32], weight: f32) -> Vec<f32> {
    normalise(
        a.iter()
            .zip(b)
            .map(|(x, y)| x * (1.0 - weight) + y * weight)
            .collect(),
    )
}

fn normalise(v: Vec<f32>) -> Vec<f32> {
    let norm = v.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm == 0.0 {
        return v;
    }
    v.into_iter().map(|x| x / norm).collect()
}

/// Cosine distance, `1 - cos(a, b)`.
pub fn cosine_distance(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b).map(|(x, y)| f64::from(*x) * f64::from(*y)).sum();
    let na: f64 = a.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| f64::from(*x).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 1.0;
    }
    1.0 - dot / (na * nb)
}

// --- Mock Embedder ---

/// What the next provider calls should do instead of succeeding.
#[derive(Debug, Clone)]
pub enum EmbedFailure {
    /// Respond with an HTTP-style API error.
    Status(u16),
    /// Return vectors of the wrong length.
    Dimensions(usize),
    /// Return one vector fewer than requested.
    MissingVector,
}

#[derive(Clone, Debug, Default)]
pub struct MockEmbedder {
    vectors: Arc<Mutex<HashMap<String, Vec<f32>>>>,
    calls: Arc<Mutex<Vec<Vec<String>>>>,
    failures: Arc<Mutex<Vec<EmbedFailure>>>,
}

impl MockEmbedder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Pre-programs the vector returned for `text`. Other texts get [`vector_for`].
    pub fn set_vector(&self, text: &str, vector: Vec<f32>) {
        self.vectors.lock().unwrap().insert(text.to_string(), vector);
    }

    /// Makes the next call fail in the given way. Failures are consumed in order.
    pub fn push_failure(&self, failure: EmbedFailure) {
        self.failures.lock().unwrap().push(failure);
    }

    /// The number of provider calls made.
    pub fn call_count(&self) -> usize {
        self.calls.lock().unwrap().len()
    }

    /// The inputs of every provider call, in call order.
    pub fn calls(&self) -> Vec<Vec<String>> {
        self.calls.lock().unwrap().clone()
    }
}

#[async_trait]
impl Embedder for MockEmbedder {
    async fn embed(&self, texts: &[String]) -> Result<Vec<Vec<f32>>, RagError> {
        self.calls.lock().unwrap().push(texts.to_vec());

        let failure = {
            let mut failures = self.failures.lock().unwrap();
            (!failures.is_empty()).then(|| failures.remove(0))
        };

        let vectors = self.vectors.lock().unwrap();
        let mut out: Vec<Vec<f32>> = texts
            .iter()
            .map(|t| vectors.get(t).cloned().unwrap_or_else(|| vector_for(t)))
            .collect();

        match failure {
            None => Ok(out),
            Some(EmbedFailure::Status(status)) => Err(RagError::ProviderApi {
                status,
                body: "mock failure".to_string(),
            }),
            Some(EmbedFailure::Dimensions(n)) => Ok(out.into_iter().map(|mut v| {
                v.resize(n, 0.1);
                v
            })
            .collect()),
            Some(EmbedFailure::MissingVector) => {
                out.pop();
                Ok(out)
            }
        }
    }
}

// --- Mock Generator ---

#[derive(Debug, Clone)]
pub enum GeneratorScript {
    /// Stream these tokens, then end.
    Tokens(Vec<String>),
    /// Stream these tokens, then fail.
    TokensThenError(Vec<String>),
    /// Fail before the stream starts.
    Fail,
}

/// A scripted generator. `generate` and `generate_json` serve follow-up questions.
#[derive(Clone, Debug)]
pub struct MockGenerator {
    script: Arc<Mutex<GeneratorScript>>,
    follow_ups: Arc<Mutex<Option<Vec<String>>>>,
    stream_calls: Arc<Mutex<Vec<(String, Vec<ChatMessage>)>>>,
    structured_calls: Arc<AtomicUsize>,
    structured_completed: Arc<AtomicUsize>,
    stream_delay: Arc<Mutex<Duration>>,
    follow_up_delay: Arc<Mutex<Duration>>,
}

impl MockGenerator {
    pub fn new(tokens: &[&str]) -> Self {
        Self {
            script: Arc::new(Mutex::new(GeneratorScript::Tokens(
                tokens.iter().map(|t| t.to_string()).collect(),
            ))),
            follow_ups: Arc::new(Mutex::new(Some(vec![
                "How do I install it?".to_string(),
                "How do I configure it?".to_string(),
                "Where are the logs?".to_string(),
            ]))),
            stream_calls: Arc::new(Mutex::new(Vec::new())),
            structured_calls: Arc::new(AtomicUsize::new(0)),
            structured_completed: Arc::new(AtomicUsize::new(0)),
            stream_delay: Arc::new(Mutex::new(Duration::ZERO)),
            follow_up_delay: Arc::new(Mutex::new(Duration::ZERO)),
        }
    }

    pub fn set_script(&self, script: GeneratorScript) {
        *self.script.lock().unwrap() = script;
    }

    /// `None` makes follow-up generation fail.
    pub fn set_follow_ups(&self, follow_ups: Option<Vec<String>>) {
        *self.follow_ups.lock().unwrap() = follow_ups;
    }

    /// The system prompt and messages of every `stream` call.
    pub fn stream_calls(&self) -> Vec<(String, Vec<ChatMessage>)> {
        self.stream_calls.lock().unwrap().clone()
    }

    pub fn structured_call_count(&self) -> usize {
        self.structured_calls.load(Ordering::SeqCst)
    }

    /// Structured calls that ran to completion (not cancelled mid-way).
    pub fn structured_completed_count(&self) -> usize {
        self.structured_completed.load(Ordering::SeqCst)
    }

    /// Delays the start of every answer stream.
    pub fn set_stream_delay(&self, delay: Duration) {
        *self.stream_delay.lock().unwrap() = delay;
    }

    /// Delays every structured (follow-up) call.
    pub fn set_follow_up_delay(&self, delay: Duration) {
        *self.follow_up_delay.lock().unwrap() = delay;
    }
}

#[async_trait]
impl Generator for MockGenerator {
    async fn stream(
        &self,
        system_prompt: &str,
        messages: &[ChatMessage],
        _options: &GenerationOptions,
    ) -> Result<TokenStream, RagError> {
        self.stream_calls
            .lock()
            .unwrap()
            .push((system_prompt.to_string(), messages.to_vec()));

        let delay = *self.stream_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let script = self.script.lock().unwrap().clone();
        match script {
            GeneratorScript::Tokens(tokens) => Ok(stream::iter(tokens.into_iter().map(Ok)).boxed()),
            GeneratorScript::TokensThenError(tokens) => Ok(stream::iter(
                tokens
                    .into_iter()
                    .map(Ok)
                    .chain(std::iter::once(Err(RagError::ProviderStream(
                        "connection reset by peer".to_string(),
                    )))),
            )
            .boxed()),
            GeneratorScript::Fail => Err(RagError::ProviderApi {
                status: 401,
                body: "invalid api key sk-secret".to_string(),
            }),
        }
    }

    async fn generate(&self, _system_prompt: &str, _user_prompt: &str) -> Result<String, RagError> {
        self.structured_calls.fetch_add(1, Ordering::SeqCst);
        let delay = *self.follow_up_delay.lock().unwrap();
        if !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }
        self.structured_completed.fetch_add(1, Ordering::SeqCst);
        let follow_ups = self.follow_ups.lock().unwrap().clone();
        match follow_ups {
            Some(prompts) => Ok(serde_json::json!({ "followUpPrompts": prompts }).to_string()),
            None => Err(RagError::ProviderApi {
                status: 400,
                body: "no object generated".to_string(),
            }),
        }
    }
}

// --- In-memory store ---

/// An in-memory implementation of every storage seam, with cosine distance
/// computed in Rust.
#[derive(Clone, Debug, Default)]
pub struct MemoryStore {
    cache: Arc<Mutex<HashMap<u32, CacheEntry>>>,
    documents: Arc<Mutex<Vec<Document>>>,
    interactions: Arc<Mutex<Vec<InteractionRecord>>>,
    fail_cache_writes: Arc<Mutex<bool>>,
    fail_document_urls: Arc<Mutex<HashSet<String>>>,
    cache_writes: Arc<AtomicUsize>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set_fail_cache_writes(&self, fail: bool) {
        *self.fail_cache_writes.lock().unwrap() = fail;
    }

    /// Makes inserts of documents with this URL fail.
    pub fn fail_documents_from(&self, url: &str) {
        self.fail_document_urls.lock().unwrap().insert(url.to_string());
    }

    pub fn cache_entries(&self) -> Vec<CacheEntry> {
        self.cache.lock().unwrap().values().cloned().collect()
    }

    /// Attempted cache writes, including failed ones.
    pub fn cache_write_attempts(&self) -> usize {
        self.cache_writes.load(Ordering::SeqCst)
    }

    pub fn documents(&self) -> Vec<Document> {
        self.documents.lock().unwrap().clone()
    }

    pub fn interactions(&self) -> Vec<InteractionRecord> {
        self.interactions.lock().unwrap().clone()
    }

    /// Stores a document directly, bypassing the indexer.
    pub fn add_document(&self, url: &str, content: &str, embedding: Vec<f32>) {
        self.documents.lock().unwrap().push(Document {
            hash: docrag::hash::document_key(content),
            title: String::new(),
            url: url.to_string(),
            content: content.to_string(),
            embedding,
            kind: Default::default(),
            created_at: None,
        });
    }
}

#[async_trait]
impl EmbeddingStore for MemoryStore {
    async fn lookup_embedding(&self, hash: u32) -> Result<Option<CacheEntry>, RagError> {
        Ok(self.cache.lock().unwrap().get(&hash).cloned())
    }

    async fn store_embedding(&self, entry: &CacheEntry) -> Result<bool, RagError> {
        self.cache_writes.fetch_add(1, Ordering::SeqCst);
        if *self.fail_cache_writes.lock().unwrap() {
            return Err(RagError::CacheWrite("mock cache write failure".to_string()));
        }
        let mut cache = self.cache.lock().unwrap();
        if cache.contains_key(&entry.hash) {
            return Ok(false);
        }
        cache.insert(entry.hash, entry.clone());
        Ok(true)
    }

    async fn lookup_embeddings(&self, hashes: &[u32]) -> Result<HashSet<u32>, RagError> {
        let cache = self.cache.lock().unwrap();
        Ok(hashes
            .iter()
            .filter(|h| cache.contains_key(h))
            .copied()
            .collect())
    }
}

#[async_trait]
impl DocumentStore for MemoryStore {
    async fn existing_document_hashes(
        &self,
        hashes: &[String],
    ) -> Result<HashSet<String>, RagError> {
        let documents = self.documents.lock().unwrap();
        Ok(hashes
            .iter()
            .filter(|h| documents.iter().any(|d| &d.hash == *h))
            .cloned()
            .collect())
    }

    async fn insert_document(&self, document: &Document) -> Result<bool, RagError> {
        if self.fail_document_urls.lock().unwrap().contains(&document.url) {
            return Err(RagError::StorageOperationFailed(
                "mock insert failure".to_string(),
            ));
        }
        let mut documents = self.documents.lock().unwrap();
        if documents.iter().any(|d| d.hash == document.hash) {
            return Ok(false);
        }
        documents.push(document.clone());
        Ok(true)
    }
}

#[async_trait]
impl VectorSearch for MemoryStore {
    async fn vector_search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentRef>, RagError> {
        let documents = self.documents.lock().unwrap();
        let mut results: Vec<DocumentRef> = documents
            .iter()
            .map(|d| DocumentRef {
                url: d.url.clone(),
                content: d.content.clone(),
                distance: cosine_distance(&d.embedding, query_vector),
            })
            .collect();
        results.sort_by(|a, b| a.distance.total_cmp(&b.distance));
        results.truncate(limit);
        Ok(results)
    }
}

#[async_trait]
impl InteractionLog for MemoryStore {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), RagError> {
        self.interactions.lock().unwrap().push(record.clone());
        Ok(())
    }
}
