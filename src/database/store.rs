//! Abstract storage contract for the matching core.
//!
//! The pipeline treats the registry store as an opaque capability provider:
//! exact canonical probe, trigram top-K, cosine ANN top-K, phonetic-code
//! intersection top-K, row fetch, review enqueue. Implementations must keep
//! every view score in `[0, 1]` and each list sorted by descending score.

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};

/// A registry payee row as the matching core sees it. Address fields are
/// carried for display, never scored.
#[derive(Debug, Clone, Serialize, Deserialize, sqlx::FromRow)]
pub struct PayeeRecord {
    pub payee_id: i64,
    pub external_id: Option<String>,
    pub name_raw: String,
    pub name_canon: String,
    pub name_tokens: Vec<String>,
    pub dm_codes: Vec<String>,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
}

/// One hit from a single similarity view.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ViewHit {
    pub payee_id: i64,
    pub score: f64,
}

/// Ingestion input for one payee. `external_id` is the source-of-truth key;
/// re-ingesting the same id updates rather than inserts.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PayeeInput {
    pub external_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

/// Whether an upsert created a new row or refreshed an existing one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UpsertOutcome {
    Inserted(i64),
    Updated(i64),
}

/// Storage capabilities required by the matcher.
#[async_trait]
pub trait MatchStore: Send + Sync {
    /// Exact canonical probe (fast path). Returns at most one payee id.
    async fn exact_candidate(&self, name_canon: &str) -> Result<Option<i64>>;

    /// Top-K by trigram similarity on `name_canon`, scores descending.
    async fn trigram_candidates(&self, name_canon: &str, limit: usize) -> Result<Vec<ViewHit>>;

    /// Top-K by cosine similarity over `name_vec`, scores descending.
    async fn vector_candidates(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ViewHit>>;

    /// Top-K payees whose Double Metaphone codes intersect the query's,
    /// scored by Jaccard of the two code sets.
    async fn phonetic_candidates(&self, dm_codes: &[String], limit: usize) -> Result<Vec<ViewHit>>;

    /// Full row fetch for feature extraction.
    async fn fetch_payee(&self, payee_id: i64) -> Result<Option<PayeeRecord>>;

    /// Append an open review item carrying the serialized scored candidates.
    async fn enqueue_review(
        &self,
        q_name_raw: &str,
        q_name_canon: &str,
        candidates: &serde_json::Value,
    ) -> Result<i64>;

    /// Registry size, for health reporting.
    async fn payee_count(&self) -> Result<i64>;

    /// Every payee's token list, for the startup IDF build.
    async fn token_corpus(&self) -> Result<Vec<Vec<String>>>;
}
