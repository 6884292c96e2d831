//! Matching endpoints: single and batch.

use axum::body::{Body, Bytes};
use axum::extract::State;
use axum::http::header::CONTENT_TYPE;
use axum::response::Response;
use axum::Json;
use futures::stream::StreamExt;
use serde::Deserialize;

use crate::matching::{BatchMatchRow, MatchOutcome};

use super::{ApiError, AppState};

#[derive(Debug, Deserialize)]
pub struct MatchRequest {
    pub name: String,
}

#[derive(Debug, Deserialize)]
pub struct BatchMatchRequest {
    pub names: Vec<String>,
    #[serde(default = "default_stream")]
    pub stream: bool,
}

fn default_stream() -> bool {
    true
}

/// POST /v1/match - match a single payee name.
pub async fn match_single(
    State(state): State<AppState>,
    Json(request): Json<MatchRequest>,
) -> Result<Json<MatchOutcome>, ApiError> {
    let outcome = state.pipeline.match_one(&request.name).await;
    Ok(Json(outcome))
}

/// POST /v1/match/batch - match a batch of names.
///
/// With `stream: true` the response is newline-delimited JSON, one object
/// per input, preserving input order; otherwise a single JSON array in
/// input order.
pub async fn match_batch(
    State(state): State<AppState>,
    Json(request): Json<BatchMatchRequest>,
) -> Result<Response, ApiError> {
    if request.stream {
        let pipeline = state.pipeline.clone();
        let workers = pipeline.config().batch_workers;

        let lines = futures::stream::iter(request.names.into_iter())
            .map(move |name| {
                let pipeline = pipeline.clone();
                async move {
                    let outcome = pipeline.match_one(&name).await;
                    let row = BatchMatchRow {
                        query: name,
                        outcome,
                    };
                    let mut line =
                        serde_json::to_string(&row).unwrap_or_else(|_| "{}".to_string());
                    line.push('\n');
                    Ok::<Bytes, std::convert::Infallible>(Bytes::from(line))
                }
            })
            .buffered(workers.max(1));

        let response = Response::builder()
            .header(CONTENT_TYPE, "application/x-ndjson")
            .body(Body::from_stream(lines))
            .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;
        Ok(response)
    } else {
        let rows = state.pipeline.match_batch(request.names).await;
        let body =
            serde_json::to_vec(&rows).map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;
        let response = Response::builder()
            .header(CONTENT_TYPE, "application/json")
            .body(Body::from(body))
            .map_err(|e| ApiError::Internal(anyhow::Error::new(e)))?;
        Ok(response)
    }
}
