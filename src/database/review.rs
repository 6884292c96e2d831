//! Review queue operations: listing open items and recording reviewer
//! decisions.
//!
//! The state machine is `open → approved | rejected`; transitions are
//! irreversible, stamp `reviewed_at`, and emit a positive or negative label
//! row for future retraining of the scorer.

use anyhow::{Context, Result};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::json;
use sqlx::PgPool;
use tracing::info;

/// One open review item, as returned to reviewers.
#[derive(Debug, Clone, Serialize)]
pub struct ReviewItem {
    pub rq_id: i64,
    pub query_name: String,
    pub canonical_name: String,
    pub candidates: serde_json::Value,
    pub created_at: DateTime<Utc>,
}

/// A reviewer's verdict on a queued item.
#[derive(Debug, Clone, Deserialize)]
pub struct ReviewDecision {
    pub approved: bool,
    pub payee_id: Option<i64>,
    pub notes: Option<String>,
}

/// Terminal status applied to a review item.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ReviewStatus {
    Approved,
    Rejected,
}

impl ReviewStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Approved => "approved",
            Self::Rejected => "rejected",
        }
    }
}

/// Database service for review-queue mutations.
pub struct ReviewService {
    pool: PgPool,
}

impl ReviewService {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// Open review items, newest first.
    pub async fn list_open(&self, limit: i64) -> Result<Vec<ReviewItem>> {
        let rows: Vec<(i64, String, String, serde_json::Value, DateTime<Utc>)> = sqlx::query_as(
            r#"
            SELECT rq_id, q_name_raw, q_name_canon, candidates, created_at
            FROM review_queue
            WHERE status = 'open'
            ORDER BY created_at DESC
            LIMIT $1
            "#,
        )
        .bind(limit)
        .fetch_all(&self.pool)
        .await
        .context("Failed to list open review items")?;

        Ok(rows
            .into_iter()
            .map(
                |(rq_id, query_name, canonical_name, candidates, created_at)| ReviewItem {
                    rq_id,
                    query_name,
                    canonical_name,
                    candidates,
                    created_at,
                },
            )
            .collect())
    }

    /// Transition an open item to `approved` or `rejected` under a row lock,
    /// writing a label when the decision names a payee. Returns `None` when
    /// the item does not exist or was already resolved.
    pub async fn resolve(
        &self,
        rq_id: i64,
        status: ReviewStatus,
        decision: &ReviewDecision,
    ) -> Result<Option<()>> {
        let mut tx = self.pool.begin().await.context("Failed to open transaction")?;

        let item: Option<(String, String)> = sqlx::query_as(
            r#"
            SELECT q_name_raw, q_name_canon
            FROM review_queue
            WHERE rq_id = $1 AND status = 'open'
            FOR UPDATE
            "#,
        )
        .bind(rq_id)
        .fetch_optional(&mut *tx)
        .await
        .context("Failed to lock review item")?;

        let Some((q_name_raw, q_name_canon)) = item else {
            return Ok(None);
        };

        let label_payee = match status {
            // An approval only labels when the reviewer confirmed a payee.
            ReviewStatus::Approved if decision.approved => decision.payee_id,
            ReviewStatus::Approved => None,
            // A rejection of a specific payee is a negative label.
            ReviewStatus::Rejected => decision.payee_id,
        };

        if let Some(payee_id) = label_payee {
            let meta = json!({ "notes": decision.notes });
            sqlx::query(
                r#"
                INSERT INTO labels (q_name_raw, q_name_canon, c_payee_id, y, meta)
                VALUES ($1, $2, $3, $4, $5)
                "#,
            )
            .bind(&q_name_raw)
            .bind(&q_name_canon)
            .bind(payee_id)
            .bind(status == ReviewStatus::Approved)
            .bind(&meta)
            .execute(&mut *tx)
            .await
            .context("Failed to write label")?;
        }

        sqlx::query(
            r#"
            UPDATE review_queue
            SET status = $2, reviewed_at = now(), reviewer_notes = $3
            WHERE rq_id = $1
            "#,
        )
        .bind(rq_id)
        .bind(status.as_str())
        .bind(&decision.notes)
        .execute(&mut *tx)
        .await
        .context("Failed to update review status")?;

        tx.commit().await.context("Failed to commit review decision")?;

        info!(
            rq_id,
            status = status.as_str(),
            payee_id = ?decision.payee_id,
            "review resolved"
        );
        Ok(Some(()))
    }
}
