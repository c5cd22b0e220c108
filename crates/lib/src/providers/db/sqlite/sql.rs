//! # SQLite Specific SQL Queries
//!
//! This module centralizes SQL query strings for the SQLite provider.

pub const CREATE_DOCS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS docs (
        hash TEXT PRIMARY KEY,
        title TEXT NOT NULL,
        url TEXT NOT NULL,
        content TEXT NOT NULL,
        full_emb F32_BLOB(512) NOT NULL,
        type TEXT NOT NULL DEFAULT 'document',
        created_at TEXT DEFAULT CURRENT_TIMESTAMP
    )";

pub const CREATE_EMBEDDING_CACHE_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS embedding_cache (
        hash INTEGER PRIMARY KEY,
        text TEXT NOT NULL,
        embedding TEXT NOT NULL
    )";

pub const CREATE_AI_LOGS_TABLE: &str = "
    CREATE TABLE IF NOT EXISTS ai_logs (
        id TEXT PRIMARY KEY,
        user_message TEXT NOT NULL,
        ai_response TEXT NOT NULL,
        created_at TEXT NOT NULL
    )";

pub const ALL_TABLE_CREATION_SQL: &[&str] = &[
    CREATE_DOCS_TABLE,
    CREATE_EMBEDDING_CACHE_TABLE,
    CREATE_AI_LOGS_TABLE,
];

pub const SELECT_CACHE_ENTRY: &str =
    "SELECT hash, text, embedding FROM embedding_cache WHERE hash = ?";

pub const INSERT_CACHE_ENTRY: &str = "
    INSERT INTO embedding_cache (hash, text, embedding) VALUES (?, ?, ?)
    ON CONFLICT(hash) DO NOTHING";

pub const INSERT_DOCUMENT: &str = "
    INSERT INTO docs (hash, title, url, content, full_emb, type, created_at)
    VALUES (?, ?, ?, ?, ?, ?, COALESCE(?, CURRENT_TIMESTAMP))
    ON CONFLICT(hash) DO NOTHING";

pub const INSERT_INTERACTION: &str =
    "INSERT INTO ai_logs (id, user_message, ai_response, created_at) VALUES (?, ?, ?, ?)";

/// `SELECT hash FROM embedding_cache WHERE hash IN (?, ..)` with `count` placeholders.
pub fn select_cached_hashes(count: usize) -> String {
    format!(
        "SELECT hash FROM embedding_cache WHERE hash IN ({})",
        placeholders(count)
    )
}

/// `SELECT hash FROM docs WHERE hash IN (?, ..)` with `count` placeholders.
pub fn select_document_hashes(count: usize) -> String {
    format!(
        "SELECT hash FROM docs WHERE hash IN ({})",
        placeholders(count)
    )
}

/// Returns the nearest-neighbour query for `query_vector`.
///
/// Turso's vector functions expect the query vector as a literal within the statement.
pub fn vector_search(query_vector: &[f32], limit: usize) -> String {
    let vector_str = format!(
        "vector32('[{}]')",
        query_vector
            .iter()
            .map(|f| f.to_string())
            .collect::<Vec<_>>()
            .join(", ")
    );
    format!(
        "SELECT url, content, vector_distance_cos(full_emb, {vector_str}) AS distance
         FROM docs
         WHERE full_emb IS NOT NULL
         ORDER BY distance ASC
         LIMIT {limit}"
    )
}

fn placeholders(count: usize) -> String {
    vec!["?"; count].join(", ")
}
