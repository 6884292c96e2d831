//! Embedding provider: canonical text → fixed-dimension unit vector.
//!
//! One remote provider (OpenAI) and one deterministic local fallback, behind
//! a read-through cache. Remote failures fall back to the local projection
//! with a warning; `embed` never fails.

pub mod cache;
pub mod local;
pub mod openai;

pub use local::local_embedding;
pub use openai::OpenAiEmbeddings;

use sha2::{Digest, Sha256};
use sqlx::PgPool;
use std::sync::Arc;
use tracing::warn;

use cache::EmbeddingCache;

const LRU_CAPACITY: usize = 10_000;

/// Which provider backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProviderKind {
    OpenAi,
    Local,
    None,
}

impl ProviderKind {
    pub fn parse(raw: &str) -> Self {
        match raw {
            "openai" => Self::OpenAi,
            "none" => Self::None,
            _ => Self::Local,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::OpenAi => "openai",
            Self::Local => "local",
            Self::None => "none",
        }
    }
}

/// Embedding service with a two-tier read-through cache.
pub struct EmbeddingService {
    kind: ProviderKind,
    dimensions: usize,
    remote: Option<OpenAiEmbeddings>,
    cache: EmbeddingCache,
}

impl EmbeddingService {
    /// Build a service. `provider` is one of "openai", "local", "none"; when
    /// "openai" is requested without an API key the service degrades to the
    /// local projection with a warning.
    pub fn new(
        provider: &str,
        api_key: Option<String>,
        model: &str,
        dimensions: usize,
        pool: Option<PgPool>,
    ) -> Self {
        let kind = ProviderKind::parse(provider);
        let remote = match (kind, api_key) {
            (ProviderKind::OpenAi, Some(key)) if !key.is_empty() => {
                match OpenAiEmbeddings::new(key, model.to_string(), dimensions) {
                    Ok(client) => Some(client),
                    Err(e) => {
                        warn!(error = %e, "failed to build OpenAI client; using local fallback");
                        None
                    }
                }
            }
            (ProviderKind::OpenAi, _) => {
                warn!("embeddings provider is openai but OPENAI_API_KEY is missing; using local fallback");
                None
            }
            _ => None,
        };

        Self {
            kind,
            dimensions,
            remote,
            cache: EmbeddingCache::new(pool, kind.as_str(), model, LRU_CAPACITY),
        }
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// False when the provider is configured off; the vector view is skipped
    /// entirely in that case.
    pub fn enabled(&self) -> bool {
        self.kind != ProviderKind::None
    }

    /// SHA-256 hex digest used as the cache key.
    pub fn text_hash(text: &str) -> String {
        hex::encode(Sha256::digest(text.as_bytes()))
    }

    /// Embed canonical text. Empty text maps to the zero vector. Never
    /// fails: remote errors degrade to the deterministic local projection.
    pub async fn embed(&self, text_canon: &str) -> Vec<f32> {
        if text_canon.is_empty() || !self.enabled() {
            return vec![0.0; self.dimensions];
        }

        let hash = Self::text_hash(text_canon);
        if let Some(cached) = self.cache.get(&hash).await {
            return cached.as_ref().clone();
        }

        let embedding = match &self.remote {
            Some(client) => match client.embed(text_canon).await {
                Ok(vector) => vector,
                Err(e) => {
                    warn!(error = %e, "remote embedding failed; using local fallback");
                    local_embedding(text_canon, self.dimensions)
                }
            },
            None => local_embedding(text_canon, self.dimensions),
        };

        let shared = Arc::new(embedding);
        self.cache.put(&hash, text_canon, Arc::clone(&shared)).await;
        shared.as_ref().clone()
    }
}
