//! Health and service-descriptor endpoints.

use axum::extract::State;
use axum::Json;
use serde_json::{json, Value};
use tracing::error;

use crate::database::MatchStore;

use super::AppState;

/// GET /health - database liveness plus registry size.
pub async fn health_check(State(state): State<AppState>) -> Json<Value> {
    let database = sqlx::query("SELECT 1").execute(&state.pool).await;

    match database {
        Ok(_) => {
            let suppliers = state.store.payee_count().await.unwrap_or(0);
            Json(json!({
                "status": "healthy",
                "database": "connected",
                "suppliers": suppliers,
            }))
        }
        Err(e) => {
            error!(error = %e, "health check failed");
            Json(json!({
                "status": "unhealthy",
                "error": e.to_string(),
            }))
        }
    }
}

/// GET / - service descriptor.
pub async fn root() -> Json<Value> {
    Json(json!({
        "service": "payee-match",
        "version": env!("CARGO_PKG_VERSION"),
        "status": "ready",
        "endpoints": {
            "health": "/health",
            "ingest": "/v1/payees/ingest",
            "match": "/v1/match",
            "match_batch": "/v1/match/batch",
            "review": "/v1/review/open",
        },
    }))
}
