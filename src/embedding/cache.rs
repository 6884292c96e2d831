//! Read-through embedding cache: in-memory LRU over a persistent table.
//!
//! Keys are SHA-256 hashes of the canonical text, scoped by (provider,
//! model). Persistent writes are insert-if-absent; cache failures are logged
//! and bypassed, never surfaced.

use lru::LruCache;
use sqlx::PgPool;
use std::num::NonZeroUsize;
use std::sync::{Arc, Mutex};
use tracing::warn;

pub struct EmbeddingCache {
    memory: Mutex<LruCache<String, Arc<Vec<f32>>>>,
    pool: Option<PgPool>,
    provider: String,
    model: String,
}

impl EmbeddingCache {
    pub fn new(pool: Option<PgPool>, provider: &str, model: &str, capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity.max(1)).expect("capacity is at least 1");
        Self {
            memory: Mutex::new(LruCache::new(capacity)),
            pool,
            provider: provider.to_string(),
            model: model.to_string(),
        }
    }

    pub async fn get(&self, text_hash: &str) -> Option<Arc<Vec<f32>>> {
        if let Ok(mut memory) = self.memory.lock() {
            if let Some(hit) = memory.get(text_hash) {
                return Some(Arc::clone(hit));
            }
        }

        let pool = self.pool.as_ref()?;
        let row: Option<(Vec<f32>,)> = match sqlx::query_as(
            r#"
            SELECT embedding
            FROM embedding_cache
            WHERE text_hash = $1 AND provider = $2 AND model = $3
            "#,
        )
        .bind(text_hash)
        .bind(&self.provider)
        .bind(&self.model)
        .fetch_optional(pool)
        .await
        {
            Ok(row) => row,
            Err(e) => {
                warn!(error = %e, "embedding cache read failed; bypassing");
                None
            }
        };

        let embedding = Arc::new(row?.0);
        if let Ok(mut memory) = self.memory.lock() {
            memory.put(text_hash.to_string(), Arc::clone(&embedding));
        }
        Some(embedding)
    }

    pub async fn put(&self, text_hash: &str, text_canon: &str, embedding: Arc<Vec<f32>>) {
        if let Ok(mut memory) = self.memory.lock() {
            memory.put(text_hash.to_string(), Arc::clone(&embedding));
        }

        let Some(pool) = self.pool.as_ref() else {
            return;
        };
        let result = sqlx::query(
            r#"
            INSERT INTO embedding_cache (text_hash, text_canon, embedding, provider, model)
            VALUES ($1, $2, $3, $4, $5)
            ON CONFLICT (text_hash) DO NOTHING
            "#,
        )
        .bind(text_hash)
        .bind(text_canon)
        .bind(embedding.as_slice())
        .bind(&self.provider)
        .bind(&self.model)
        .execute(pool)
        .await;

        if let Err(e) = result {
            warn!(error = %e, "embedding cache write failed; bypassing");
        }
    }
}
