//! Database layer: schema bootstrap, the abstract storage contract, its
//! PostgreSQL implementation, and review-queue services.

pub mod postgres;
pub mod review;
pub mod store;

pub use postgres::PgMatchStore;
pub use review::{ReviewDecision, ReviewItem, ReviewService, ReviewStatus};
pub use store::{MatchStore, PayeeInput, PayeeRecord, UpsertOutcome, ViewHit};

use anyhow::{bail, Context, Result};
use sqlx::PgPool;
use tracing::{info, warn};

const SCHEMA_SQL: &str = include_str!("../../schema.sql");

/// Execute the bootstrap schema. Idempotent; safe to run at every startup.
pub async fn init_database(pool: &PgPool) -> Result<()> {
    for statement in SCHEMA_SQL.split(';') {
        let statement = statement.trim();
        if statement.is_empty() {
            continue;
        }
        sqlx::query(statement)
            .execute(pool)
            .await
            .with_context(|| format!("Schema statement failed: {}", first_line(statement)))?;
    }
    info!("database schema initialized");
    Ok(())
}

/// Verify the required PostgreSQL extensions. Missing extensions are fatal:
/// without them the trigram and vector views cannot run at all.
pub async fn check_extensions(pool: &PgPool) -> Result<()> {
    let rows: Vec<(String,)> = sqlx::query_as(
        "SELECT extname FROM pg_extension WHERE extname IN ('pg_trgm', 'vector')",
    )
    .fetch_all(pool)
    .await
    .context("Failed to query installed extensions")?;

    let installed: Vec<&str> = rows.iter().map(|(name,)| name.as_str()).collect();
    let missing: Vec<&str> = ["pg_trgm", "vector"]
        .into_iter()
        .filter(|ext| !installed.contains(ext))
        .collect();

    if !missing.is_empty() {
        warn!(?missing, "required extensions missing");
        bail!("missing required PostgreSQL extensions: {}", missing.join(", "));
    }

    info!(?installed, "extensions verified");
    Ok(())
}

fn first_line(statement: &str) -> &str {
    statement.lines().next().unwrap_or(statement)
}
