//! PostgreSQL implementation of the matcher's storage contract.
//!
//! Relies on `pg_trgm` for trigram search, `pgvector` for cosine ANN and
//! `text[]` GIN intersection for phonetic codes; `init_database` installs
//! the schema and `check_extensions` verifies both extensions at startup.

use anyhow::{Context, Result};
use async_trait::async_trait;
use pgvector::Vector;
use sqlx::PgPool;
use tracing::debug;

use crate::canonicalize::CanonicalName;

use super::store::{MatchStore, PayeeInput, PayeeRecord, UpsertOutcome, ViewHit};

/// Registry store backed by PostgreSQL.
#[derive(Clone)]
pub struct PgMatchStore {
    pool: PgPool,
}

impl PgMatchStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    pub fn pool(&self) -> &PgPool {
        &self.pool
    }

    /// Insert or update a payee. When `external_id` is present and already
    /// known, the existing row is refreshed; otherwise a new row is created.
    /// The vector column is only touched when an embedding is supplied.
    pub async fn upsert_payee(
        &self,
        input: &PayeeInput,
        canon: &CanonicalName,
        embedding: Option<&[f32]>,
    ) -> Result<UpsertOutcome> {
        let existing: Option<(i64,)> = match &input.external_id {
            Some(external_id) => {
                sqlx::query_as("SELECT payee_id FROM payees WHERE external_id = $1")
                    .bind(external_id)
                    .fetch_optional(&self.pool)
                    .await
                    .context("Failed to look up payee by external_id")?
            }
            None => None,
        };

        match existing {
            Some((payee_id,)) => {
                if let Some(vec) = embedding {
                    sqlx::query(
                        r#"
                        UPDATE payees
                        SET name_raw = $2, name_canon = $3, name_tokens = $4,
                            dm_codes = $5, name_vec = $6,
                            address = $7, city = $8, state = $9,
                            zip_code = $10, country = $11,
                            updated_at = now()
                        WHERE payee_id = $1
                        "#,
                    )
                    .bind(payee_id)
                    .bind(&input.name)
                    .bind(&canon.canon)
                    .bind(&canon.tokens)
                    .bind(&canon.dm_codes)
                    .bind(Vector::from(vec.to_vec()))
                    .bind(&input.address)
                    .bind(&input.city)
                    .bind(&input.state)
                    .bind(&input.zip_code)
                    .bind(&input.country)
                    .execute(&self.pool)
                    .await
                    .context("Failed to update payee")?;
                } else {
                    sqlx::query(
                        r#"
                        UPDATE payees
                        SET name_raw = $2, name_canon = $3, name_tokens = $4,
                            dm_codes = $5,
                            address = $6, city = $7, state = $8,
                            zip_code = $9, country = $10,
                            updated_at = now()
                        WHERE payee_id = $1
                        "#,
                    )
                    .bind(payee_id)
                    .bind(&input.name)
                    .bind(&canon.canon)
                    .bind(&canon.tokens)
                    .bind(&canon.dm_codes)
                    .bind(&input.address)
                    .bind(&input.city)
                    .bind(&input.state)
                    .bind(&input.zip_code)
                    .bind(&input.country)
                    .execute(&self.pool)
                    .await
                    .context("Failed to update payee")?;
                }
                Ok(UpsertOutcome::Updated(payee_id))
            }
            None => {
                let (payee_id,): (i64,) = if let Some(vec) = embedding {
                    sqlx::query_as(
                        r#"
                        INSERT INTO payees
                            (external_id, name_raw, name_canon, name_tokens, dm_codes,
                             name_vec, address, city, state, zip_code, country)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
                        RETURNING payee_id
                        "#,
                    )
                    .bind(&input.external_id)
                    .bind(&input.name)
                    .bind(&canon.canon)
                    .bind(&canon.tokens)
                    .bind(&canon.dm_codes)
                    .bind(Vector::from(vec.to_vec()))
                    .bind(&input.address)
                    .bind(&input.city)
                    .bind(&input.state)
                    .bind(&input.zip_code)
                    .bind(&input.country)
                    .fetch_one(&self.pool)
                    .await
                    .context("Failed to insert payee")?
                } else {
                    sqlx::query_as(
                        r#"
                        INSERT INTO payees
                            (external_id, name_raw, name_canon, name_tokens, dm_codes,
                             address, city, state, zip_code, country)
                        VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
                        RETURNING payee_id
                        "#,
                    )
                    .bind(&input.external_id)
                    .bind(&input.name)
                    .bind(&canon.canon)
                    .bind(&canon.tokens)
                    .bind(&canon.dm_codes)
                    .bind(&input.address)
                    .bind(&input.city)
                    .bind(&input.state)
                    .bind(&input.zip_code)
                    .bind(&input.country)
                    .fetch_one(&self.pool)
                    .await
                    .context("Failed to insert payee")?
                };
                Ok(UpsertOutcome::Inserted(payee_id))
            }
        }
    }
}

#[async_trait]
impl MatchStore for PgMatchStore {
    async fn exact_candidate(&self, name_canon: &str) -> Result<Option<i64>> {
        let row: Option<(i64,)> =
            sqlx::query_as("SELECT payee_id FROM payees WHERE name_canon = $1 LIMIT 1")
                .bind(name_canon)
                .fetch_optional(&self.pool)
                .await
                .context("Exact probe failed")?;
        Ok(row.map(|(id,)| id))
    }

    async fn trigram_candidates(&self, name_canon: &str, limit: usize) -> Result<Vec<ViewHit>> {
        let rows: Vec<(i64, f64)> = sqlx::query_as(
            r#"
            SELECT payee_id, similarity(name_canon, $1)::float8 AS score
            FROM payees
            WHERE name_canon % $1
            ORDER BY score DESC, payee_id
            LIMIT $2
            "#,
        )
        .bind(name_canon)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Trigram search failed")?;

        debug!(count = rows.len(), "trigram candidates");
        Ok(rows
            .into_iter()
            .map(|(payee_id, score)| ViewHit {
                payee_id,
                score: score.clamp(0.0, 1.0),
            })
            .collect())
    }

    async fn vector_candidates(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ViewHit>> {
        let embedding = Vector::from(query_vec.to_vec());

        let rows: Vec<(i64, f64)> = sqlx::query_as(
            r#"
            SELECT payee_id, (1 - (name_vec <=> $1::vector))::float8 AS score
            FROM payees
            WHERE name_vec IS NOT NULL
            ORDER BY name_vec <=> $1::vector, payee_id
            LIMIT $2
            "#,
        )
        .bind(&embedding)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Vector search failed")?;

        debug!(count = rows.len(), "vector candidates");
        Ok(rows
            .into_iter()
            .map(|(payee_id, score)| ViewHit {
                payee_id,
                score: score.clamp(0.0, 1.0),
            })
            .collect())
    }

    async fn phonetic_candidates(&self, dm_codes: &[String], limit: usize) -> Result<Vec<ViewHit>> {
        if dm_codes.is_empty() {
            return Ok(Vec::new());
        }

        let rows: Vec<(i64, Option<i32>, i32)> = sqlx::query_as(
            r#"
            SELECT
                payee_id,
                array_length(
                    ARRAY(SELECT unnest(dm_codes) INTERSECT SELECT unnest($1::text[])),
                    1
                ) AS overlap,
                cardinality(dm_codes) AS code_count
            FROM payees
            WHERE dm_codes && $1::text[]
            ORDER BY overlap DESC NULLS LAST, payee_id
            LIMIT $2
            "#,
        )
        .bind(dm_codes)
        .bind(limit as i64)
        .fetch_all(&self.pool)
        .await
        .context("Phonetic search failed")?;

        let query_len = dm_codes.len() as f64;
        let mut hits: Vec<ViewHit> = rows
            .into_iter()
            .filter_map(|(payee_id, overlap, code_count)| {
                let overlap = overlap.unwrap_or(0) as f64;
                if overlap <= 0.0 {
                    return None;
                }
                let union = query_len + code_count as f64 - overlap;
                let jaccard = if union > 0.0 { overlap / union } else { 0.0 };
                Some(ViewHit {
                    payee_id,
                    score: jaccard.clamp(0.0, 1.0),
                })
            })
            .collect();

        hits.sort_by(|a, b| {
            b.score
                .total_cmp(&a.score)
                .then(a.payee_id.cmp(&b.payee_id))
        });
        hits.truncate(limit);

        debug!(count = hits.len(), "phonetic candidates");
        Ok(hits)
    }

    async fn fetch_payee(&self, payee_id: i64) -> Result<Option<PayeeRecord>> {
        let record = sqlx::query_as::<_, PayeeRecord>(
            r#"
            SELECT payee_id, external_id, name_raw, name_canon, name_tokens,
                   dm_codes, address, city, state
            FROM payees
            WHERE payee_id = $1
            "#,
        )
        .bind(payee_id)
        .fetch_optional(&self.pool)
        .await
        .context("Failed to fetch payee")?;
        Ok(record)
    }

    async fn enqueue_review(
        &self,
        q_name_raw: &str,
        q_name_canon: &str,
        candidates: &serde_json::Value,
    ) -> Result<i64> {
        let (rq_id,): (i64,) = sqlx::query_as(
            r#"
            INSERT INTO review_queue (q_name_raw, q_name_canon, candidates, status)
            VALUES ($1, $2, $3, 'open')
            RETURNING rq_id
            "#,
        )
        .bind(q_name_raw)
        .bind(q_name_canon)
        .bind(candidates)
        .fetch_one(&self.pool)
        .await
        .context("Failed to enqueue review item")?;
        Ok(rq_id)
    }

    async fn payee_count(&self) -> Result<i64> {
        let (count,): (i64,) = sqlx::query_as("SELECT COUNT(*) FROM payees")
            .fetch_one(&self.pool)
            .await
            .context("Failed to count payees")?;
        Ok(count)
    }

    async fn token_corpus(&self) -> Result<Vec<Vec<String>>> {
        let rows: Vec<(Vec<String>,)> =
            sqlx::query_as("SELECT name_tokens FROM payees WHERE name_tokens IS NOT NULL")
                .fetch_all(&self.pool)
                .await
                .context("Failed to load token corpus")?;
        Ok(rows.into_iter().map(|(tokens,)| tokens).collect())
    }
}
