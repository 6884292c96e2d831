//! REST API for the payee matcher.
//!
//! | Endpoint | Method | Description |
//! |----------|--------|-------------|
//! | `/v1/match` | POST | Match a single payee name |
//! | `/v1/match/batch` | POST | Batch match (NDJSON stream or array) |
//! | `/v1/payees/ingest` | POST | Ingest payees (JSON) |
//! | `/v1/payees/ingest/csv` | POST | Ingest payees (multipart CSV) |
//! | `/v1/review/open` | GET | List open review items |
//! | `/v1/review/{id}/approve` | POST | Approve a review item |
//! | `/v1/review/{id}/reject` | POST | Reject a review item |
//! | `/health` | GET | Liveness + registry size |
//! | `/` | GET | Service descriptor |

pub mod health;
pub mod ingest_routes;
pub mod match_routes;
pub mod review_routes;

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use axum::{Json, Router};
use serde_json::json;
use sqlx::PgPool;
use std::sync::Arc;
use tracing::error;

use crate::config::Settings;
use crate::database::{PgMatchStore, ReviewService};
use crate::embedding::EmbeddingService;
use crate::matching::MatchPipeline;

/// Shared state for all routes.
#[derive(Clone)]
pub struct AppState {
    pub pipeline: Arc<MatchPipeline>,
    pub store: Arc<PgMatchStore>,
    pub embeddings: Arc<EmbeddingService>,
    pub review: Arc<ReviewService>,
    pub pool: PgPool,
    pub settings: Arc<Settings>,
}

/// Errors surfaced by route handlers, mapped to structured bodies.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    NotFound(String),

    #[error(transparent)]
    Internal(#[from] anyhow::Error),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match &self {
            Self::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg.clone()),
            Self::NotFound(msg) => (StatusCode::NOT_FOUND, msg.clone()),
            Self::Internal(e) => {
                error!(error = %e, "internal error");
                (StatusCode::INTERNAL_SERVER_ERROR, e.to_string())
            }
        };
        (status, Json(json!({ "error": message }))).into_response()
    }
}

/// Assemble the service router.
pub fn create_router(state: AppState) -> Router {
    Router::new()
        .route("/", get(health::root))
        .route("/health", get(health::health_check))
        .route("/v1/match", post(match_routes::match_single))
        .route("/v1/match/batch", post(match_routes::match_batch))
        .route("/v1/payees/ingest", post(ingest_routes::ingest_payees))
        .route("/v1/payees/ingest/csv", post(ingest_routes::ingest_csv))
        .route("/v1/review/open", get(review_routes::open_reviews))
        .route("/v1/review/:rq_id/approve", post(review_routes::approve))
        .route("/v1/review/:rq_id/reject", post(review_routes::reject))
        .with_state(state)
}
