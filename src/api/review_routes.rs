//! Review queue endpoints.

use axum::extract::{Path, Query, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::database::{ReviewDecision, ReviewItem, ReviewStatus};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct OpenReviewsQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Serialize)]
pub struct OpenReviewsResponse {
    pub count: usize,
    pub items: Vec<ReviewItem>,
}

/// GET /v1/review/open?limit=N - open review items, newest first.
pub async fn open_reviews(
    State(state): State<AppState>,
    Query(query): Query<OpenReviewsQuery>,
) -> Result<Json<OpenReviewsResponse>, ApiError> {
    let limit = query.limit.unwrap_or(100).clamp(1, 1000);
    let items = state.review.list_open(limit).await?;
    Ok(Json(OpenReviewsResponse {
        count: items.len(),
        items,
    }))
}

/// POST /v1/review/{id}/approve - confirm a match; writes a positive label.
pub async fn approve(
    State(state): State<AppState>,
    Path(rq_id): Path<i64>,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<Value>, ApiError> {
    resolve(&state, rq_id, ReviewStatus::Approved, decision).await
}

/// POST /v1/review/{id}/reject - reject a match; writes a negative label
/// when a payee was named.
pub async fn reject(
    State(state): State<AppState>,
    Path(rq_id): Path<i64>,
    Json(decision): Json<ReviewDecision>,
) -> Result<Json<Value>, ApiError> {
    resolve(&state, rq_id, ReviewStatus::Rejected, decision).await
}

async fn resolve(
    state: &AppState,
    rq_id: i64,
    status: ReviewStatus,
    decision: ReviewDecision,
) -> Result<Json<Value>, ApiError> {
    match state.review.resolve(rq_id, status, &decision).await? {
        Some(()) => Ok(Json(json!({ "status": status.as_str(), "rq_id": rq_id }))),
        None => Err(ApiError::NotFound("Review item not found".to_string())),
    }
}
