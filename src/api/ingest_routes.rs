//! Ingestion endpoints: JSON batches and CSV upload.
//!
//! Row failures are isolated: a bad row lands in `errors[]` while the rest
//! of the batch proceeds.

use axum::extract::{Multipart, State};
use axum::Json;
use serde::{Deserialize, Serialize};
use tracing::{error, info};

use crate::canonicalize::canonicalize;
use crate::database::{PayeeInput, UpsertOutcome};

use super::{ApiError, AppState};

/// One payee in an ingest request. `payee_id` is the external
/// source-of-truth identifier.
#[derive(Debug, Clone, Deserialize)]
pub struct PayeeBody {
    pub payee_id: Option<String>,
    pub name: String,
    pub address: Option<String>,
    pub city: Option<String>,
    pub state: Option<String>,
    pub zip_code: Option<String>,
    pub country: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct IngestRequest {
    pub payees: Vec<PayeeBody>,
}

#[derive(Debug, Serialize)]
pub struct IngestError {
    pub name: String,
    pub error: String,
}

#[derive(Debug, Serialize)]
pub struct IngestResponse {
    pub inserted: usize,
    pub updated: usize,
    pub errors: Vec<IngestError>,
    pub success: bool,
}

/// POST /v1/payees/ingest - ingest a JSON batch of payees.
pub async fn ingest_payees(
    State(state): State<AppState>,
    Json(request): Json<IngestRequest>,
) -> Result<Json<IngestResponse>, ApiError> {
    Ok(Json(ingest_batch(&state, request.payees).await))
}

/// POST /v1/payees/ingest/csv - multipart CSV upload.
///
/// Accepted header columns: `payee_id`, `name|supplier_name|payee_name`,
/// `address`, `city`, `state`, `zip_code|zip`, `country`.
pub async fn ingest_csv(
    State(state): State<AppState>,
    mut multipart: Multipart,
) -> Result<Json<IngestResponse>, ApiError> {
    let mut contents: Option<String> = None;

    while let Some(field) = multipart
        .next_field()
        .await
        .map_err(|e| ApiError::BadRequest(format!("invalid multipart body: {e}")))?
    {
        let is_file = field.file_name().is_some() || field.name() == Some("file");
        if !is_file {
            continue;
        }
        if let Some(file_name) = field.file_name() {
            if !file_name.to_lowercase().ends_with(".csv") {
                return Err(ApiError::BadRequest("File must be CSV".to_string()));
            }
        }
        contents = Some(
            field
                .text()
                .await
                .map_err(|e| ApiError::BadRequest(format!("unreadable upload: {e}")))?,
        );
        break;
    }

    let Some(contents) = contents else {
        return Err(ApiError::BadRequest("missing CSV file field".to_string()));
    };

    let payees = parse_csv_payees(&contents)?;
    Ok(Json(ingest_batch(&state, payees).await))
}

fn parse_csv_payees(contents: &str) -> Result<Vec<PayeeBody>, ApiError> {
    let mut reader = csv::ReaderBuilder::new()
        .trim(csv::Trim::All)
        .from_reader(contents.as_bytes());

    let headers = reader
        .headers()
        .map_err(|e| ApiError::BadRequest(format!("invalid CSV header: {e}")))?
        .clone();

    let column = |names: &[&str]| -> Option<usize> {
        headers
            .iter()
            .position(|h| names.contains(&h.to_lowercase().as_str()))
    };

    let id_col = column(&["payee_id"]);
    let name_col = column(&["name", "supplier_name", "payee_name"])
        .ok_or_else(|| ApiError::BadRequest("CSV is missing a name column".to_string()))?;
    let address_col = column(&["address"]);
    let city_col = column(&["city"]);
    let state_col = column(&["state"]);
    let zip_col = column(&["zip_code", "zip"]);
    let country_col = column(&["country"]);

    let cell = |record: &csv::StringRecord, col: Option<usize>| -> Option<String> {
        col.and_then(|i| record.get(i))
            .map(str::to_string)
            .filter(|v| !v.is_empty())
    };

    let mut payees = Vec::new();
    for record in reader.records() {
        let record = record.map_err(|e| ApiError::BadRequest(format!("invalid CSV row: {e}")))?;
        let Some(name) = cell(&record, Some(name_col)) else {
            continue;
        };
        payees.push(PayeeBody {
            payee_id: cell(&record, id_col),
            name,
            address: cell(&record, address_col),
            city: cell(&record, city_col),
            state: cell(&record, state_col),
            zip_code: cell(&record, zip_col),
            country: cell(&record, country_col),
        });
    }
    Ok(payees)
}

async fn ingest_batch(state: &AppState, payees: Vec<PayeeBody>) -> IngestResponse {
    let mut inserted = 0usize;
    let mut updated = 0usize;
    let mut errors = Vec::new();

    for payee in payees {
        let canon = canonicalize(&payee.name);
        if canon.is_empty() {
            errors.push(IngestError {
                name: payee.name.clone(),
                error: "Empty or invalid name".to_string(),
            });
            continue;
        }

        let embedding = if state.embeddings.enabled() {
            Some(state.embeddings.embed(&canon.canon).await)
        } else {
            None
        };

        let input = PayeeInput {
            external_id: payee.payee_id.clone(),
            name: payee.name.clone(),
            address: payee.address.clone(),
            city: payee.city.clone(),
            state: payee.state.clone(),
            zip_code: payee.zip_code.clone(),
            country: payee.country.clone(),
        };

        match state
            .store
            .upsert_payee(&input, &canon, embedding.as_deref())
            .await
        {
            Ok(UpsertOutcome::Inserted(_)) => inserted += 1,
            Ok(UpsertOutcome::Updated(_)) => updated += 1,
            Err(e) => {
                error!(name = %payee.name, error = %e, "payee ingest failed");
                errors.push(IngestError {
                    name: payee.name,
                    error: e.to_string(),
                });
            }
        }
    }

    info!(inserted, updated, failed = errors.len(), "ingest complete");
    IngestResponse {
        success: errors.is_empty(),
        inserted,
        updated,
        errors,
    }
}
