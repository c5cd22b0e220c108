use crate::{
    constants::LOOKUP_BATCH_SIZE,
    errors::RagError,
    providers::db::storage::{DocumentStore, EmbeddingStore, InteractionLog, VectorSearch},
    retry::{retry, RetryPolicy},
    types::{CacheEntry, Document, DocumentRef, InteractionRecord},
};
use async_trait::async_trait;
use std::{
    collections::HashSet,
    fmt::{self, Debug},
    future::Future,
    sync::{
        atomic::{AtomicBool, Ordering},
        Arc,
    },
};
use tokio::sync::RwLock;
use tracing::{debug, info, warn};
use turso::{Connection, Database, Row, Value as TursoValue};

mod sql;

const IN_MEMORY: &str = ":memory:";

/// A provider for a local SQLite-compatible database using Turso.
///
/// The provider owns the database handle for the whole process: it is created once
/// with [`SqliteProvider::new`], prepared with [`SqliteProvider::initialize_schema`]
/// and released with [`SqliteProvider::shutdown`]. Every operation opens its own
/// connection. When an operation fails because the connection was closed, the
/// handle is recreated and the operation retried with exponential backoff.
///
/// Clones share the same handle. To share an in-memory database (e.g. in tests),
/// create one provider and `.clone()` it.
#[derive(Clone)]
pub struct SqliteProvider {
    db_path: String,
    db: Arc<RwLock<Database>>,
    retry_policy: RetryPolicy,
    closed: Arc<AtomicBool>,
}

impl SqliteProvider {
    /// Opens the database at `db_path`. Use ":memory:" for an isolated in-memory database.
    pub async fn new(db_path: &str, retry_policy: RetryPolicy) -> Result<Self, RagError> {
        let db = Self::open(db_path).await?;
        info!(db_path = %db_path, "Opened SQLite storage provider.");
        Ok(Self {
            db_path: db_path.to_string(),
            db: Arc::new(RwLock::new(db)),
            retry_policy,
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    async fn open(db_path: &str) -> Result<Database, RagError> {
        let db = turso::Builder::new_local(db_path)
            .build()
            .await
            .map_err(|e| RagError::StorageConnection(e.to_string()))?;

        // WAL improves concurrent readers on file-backed databases and is a no-op in memory.
        let conn = db
            .connect()
            .map_err(|e| RagError::StorageConnection(e.to_string()))?;
        conn.query("PRAGMA journal_mode=WAL;", ())
            .await
            .map_err(|e| RagError::StorageConnection(e.to_string()))?;
        Ok(db)
    }

    /// Ensures that all required tables exist. Idempotent; safe to call on every startup.
    pub async fn initialize_schema(&self) -> Result<(), RagError> {
        self.run_with_retry("initialize_schema", |conn| async move {
            for statement in sql::ALL_TABLE_CREATION_SQL {
                conn.execute(statement, ()).await?;
            }
            Ok(())
        })
        .await
    }

    /// Marks the provider closed. Later operations fail instead of reopening the database.
    pub async fn shutdown(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            info!(db_path = %self.db_path, "SQLite storage provider shut down.");
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    async fn connect(&self) -> Result<Connection, RagError> {
        if self.is_shut_down() {
            return Err(RagError::StorageOperationFailed(
                "storage provider has been shut down".to_string(),
            ));
        }
        self.db
            .read()
            .await
            .connect()
            .map_err(|e| RagError::StorageConnection(e.to_string()))
    }

    /// Replaces the database handle after a closed connection. An in-memory database
    /// cannot be reopened without losing its contents, so only a new connection is made.
    async fn reconnect(&self) -> Result<(), RagError> {
        if self.db_path == IN_MEMORY {
            return Ok(());
        }
        warn!(db_path = %self.db_path, "Recreating database handle after a closed connection.");
        let fresh = Self::open(&self.db_path).await?;
        *self.db.write().await = fresh;
        Ok(())
    }

    /// Runs `operation` on a fresh connection, recreating the handle and retrying
    /// when the connection turns out to be closed.
    async fn run_with_retry<T, F, Fut>(&self, label: &str, operation: F) -> Result<T, RagError>
    where
        F: Fn(Connection) -> Fut,
        Fut: Future<Output = Result<T, RagError>>,
    {
        let operation = &operation;
        retry(
            &self.retry_policy,
            label,
            RagError::is_connection_closed,
            |attempt| async move {
                if attempt > 0 {
                    self.reconnect().await?;
                }
                let conn = self.connect().await?;
                operation(conn).await
            },
        )
        .await
    }

    /// Executes multiple `;`-separated statements. Used by tests to pre-populate data.
    pub async fn initialize_with_data(&self, init_sql: &str) -> Result<(), RagError> {
        let conn = self.connect().await?;
        for statement in init_sql.split(';').filter(|s| !s.trim().is_empty()) {
            conn.execute(statement, ()).await?;
        }
        Ok(())
    }
}

impl Debug for SqliteProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SqliteProvider")
            .field("db_path", &self.db_path)
            .finish_non_exhaustive()
    }
}

fn text_at(row: &Row, index: usize) -> Result<String, RagError> {
    Ok(match row.get_value(index)? {
        TursoValue::Text(s) => s,
        TursoValue::Integer(i) => i.to_string(),
        _ => String::new(),
    })
}

/// Little-endian f32 bytes, the layout Turso's vector functions read from a blob.
fn vector_to_blob(vector: &[f32]) -> Vec<u8> {
    vector.iter().flat_map(|f| f.to_le_bytes()).collect()
}

#[async_trait]
impl EmbeddingStore for SqliteProvider {
    async fn lookup_embedding(&self, hash: u32) -> Result<Option<CacheEntry>, RagError> {
        self.run_with_retry("lookup_embedding", |conn| async move {
            let mut rows = conn
                .query(sql::SELECT_CACHE_ENTRY, vec![TursoValue::Integer(hash.into())])
                .await?;
            let Some(row) = rows.next().await? else {
                return Ok(None);
            };
            let text = text_at(&row, 1)?;
            let embedding: Vec<f32> = serde_json::from_str(&text_at(&row, 2)?)?;
            Ok(Some(CacheEntry {
                hash,
                text,
                embedding,
            }))
        })
        .await
    }

    async fn store_embedding(&self, entry: &CacheEntry) -> Result<bool, RagError> {
        let embedding_json = serde_json::to_string(&entry.embedding)?;
        let embedding_json = embedding_json.as_str();
        self.run_with_retry("store_embedding", |conn| async move {
            let written = conn
                .execute(
                    sql::INSERT_CACHE_ENTRY,
                    vec![
                        TursoValue::Integer(entry.hash.into()),
                        TursoValue::Text(entry.text.clone()),
                        TursoValue::Text(embedding_json.to_string()),
                    ],
                )
                .await
                .map_err(|e| RagError::CacheWrite(e.to_string()))?;
            Ok(written > 0)
        })
        .await
    }

    async fn lookup_embeddings(&self, hashes: &[u32]) -> Result<HashSet<u32>, RagError> {
        let mut present = HashSet::new();
        for batch in hashes.chunks(LOOKUP_BATCH_SIZE) {
            let found = self
                .run_with_retry("lookup_embeddings", |conn| async move {
                    let params: Vec<TursoValue> = batch
                        .iter()
                        .map(|h| TursoValue::Integer((*h).into()))
                        .collect();
                    let mut rows = conn
                        .query(&sql::select_cached_hashes(batch.len()), params)
                        .await?;
                    let mut found = Vec::new();
                    while let Some(row) = rows.next().await? {
                        if let TursoValue::Integer(h) = row.get_value(0)? {
                            if let Ok(h) = u32::try_from(h) {
                                found.push(h);
                            }
                        }
                    }
                    Ok(found)
                })
                .await?;
            present.extend(found);
        }
        Ok(present)
    }
}

#[async_trait]
impl DocumentStore for SqliteProvider {
    async fn existing_document_hashes(
        &self,
        hashes: &[String],
    ) -> Result<HashSet<String>, RagError> {
        let mut present = HashSet::new();
        for batch in hashes.chunks(LOOKUP_BATCH_SIZE) {
            let found = self
                .run_with_retry("existing_document_hashes", |conn| async move {
                    let params: Vec<TursoValue> =
                        batch.iter().map(|h| TursoValue::Text(h.clone())).collect();
                    let mut rows = conn
                        .query(&sql::select_document_hashes(batch.len()), params)
                        .await?;
                    let mut found = Vec::new();
                    while let Some(row) = rows.next().await? {
                        found.push(text_at(&row, 0)?);
                    }
                    Ok(found)
                })
                .await?;
            debug!(batch = batch.len(), found = found.len(), "Checked existing documents.");
            present.extend(found);
        }
        Ok(present)
    }

    async fn insert_document(&self, document: &Document) -> Result<bool, RagError> {
        let blob = vector_to_blob(&document.embedding);
        let blob = blob.as_slice();
        self.run_with_retry("insert_document", |conn| async move {
            let created_at = match document.created_at {
                Some(ts) => TursoValue::Text(ts.to_rfc3339()),
                None => TursoValue::Null,
            };
            let written = conn
                .execute(
                    sql::INSERT_DOCUMENT,
                    vec![
                        TursoValue::Text(document.hash.clone()),
                        TursoValue::Text(document.title.clone()),
                        TursoValue::Text(document.url.clone()),
                        TursoValue::Text(document.content.clone()),
                        TursoValue::Blob(blob.to_vec()),
                        TursoValue::Text(document.kind.as_str().to_string()),
                        created_at,
                    ],
                )
                .await?;
            Ok(written > 0)
        })
        .await
    }
}

#[async_trait]
impl VectorSearch for SqliteProvider {
    async fn vector_search(
        &self,
        query_vector: &[f32],
        limit: usize,
    ) -> Result<Vec<DocumentRef>, RagError> {
        let query = sql::vector_search(query_vector, limit);
        let query = query.as_str();
        debug!(limit, "--> Executing vector search");
        self.run_with_retry("vector_search", |conn| async move {
            let mut rows = conn.query(query, ()).await?;
            let mut results = Vec::new();
            while let Some(row) = rows.next().await? {
                let distance = match row.get_value(2)? {
                    TursoValue::Real(f) => f,
                    TursoValue::Integer(i) => i as f64,
                    _ => f64::MAX,
                };
                results.push(DocumentRef {
                    url: text_at(&row, 0)?,
                    content: text_at(&row, 1)?,
                    distance,
                });
            }
            Ok(results)
        })
        .await
    }
}

#[async_trait]
impl InteractionLog for SqliteProvider {
    async fn record_interaction(&self, record: &InteractionRecord) -> Result<(), RagError> {
        self.run_with_retry("record_interaction", |conn| async move {
            conn.execute(
                sql::INSERT_INTERACTION,
                vec![
                    TursoValue::Text(record.id.clone()),
                    TursoValue::Text(record.user_message.clone()),
                    TursoValue::Text(record.ai_response.clone()),
                    TursoValue::Text(record.created_at.to_rfc3339()),
                ],
            )
            .await?;
            Ok(())
        })
        .await
    }
}
