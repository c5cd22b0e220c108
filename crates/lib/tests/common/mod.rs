#![allow(dead_code)]
//! # Common Test Utilities

use docrag::{
    cache::{CacheConfig, EmbeddingCache},
    embedder::BatchEmbedder,
    providers::db::storage::EmbeddingStore,
    retry::RetryPolicy,
};
use docrag_test_utils::MockEmbedder;
use dotenvy::dotenv;
use std::sync::{Arc, Once};
use std::time::Duration;

static INIT: Once = Once::new();

/// Initializes the tracing subscriber and loads .env for tests.
pub fn setup_tracing() {
    INIT.call_once(|| {
        dotenv().ok();
        let _ = tracing_subscriber::fmt()
            .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
            .with_test_writer()
            .try_init();
    });
}

/// A retry policy with short delays, so retry tests run fast.
pub fn fast_retry() -> RetryPolicy {
    RetryPolicy::new(3, Duration::from_millis(1))
}

/// Cache settings without the pause between write batches.
pub fn fast_cache_config() -> CacheConfig {
    CacheConfig {
        write_pause_ms: 0,
        ..CacheConfig::default()
    }
}

/// A batch embedder over `store` backed by `provider`.
pub fn build_embedder(store: Arc<dyn EmbeddingStore>, provider: MockEmbedder) -> BatchEmbedder {
    let cache = EmbeddingCache::new(store, fast_cache_config());
    BatchEmbedder::new(Arc::new(provider), cache, fast_retry())
}
