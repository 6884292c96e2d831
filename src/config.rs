//! Configuration management from environment variables.
//!
//! Every knob is an environment variable (`.env` supported via dotenvy in
//! the binaries). `DATABASE_URL` is required; everything else has a default.

use anyhow::{Context, Result};
use std::fmt::Display;
use std::str::FromStr;

/// Application settings.
#[derive(Debug, Clone)]
pub struct Settings {
    /// PostgreSQL connection URL.
    pub database_url: String,

    // Supplier warehouse (BigQuery) configuration. The sync collaborator is
    // external; the keys are carried so deployments configure one place.
    pub bigquery_project_id: Option<String>,
    pub bigquery_dataset: Option<String>,
    pub bigquery_table: String,
    pub bigquery_credentials_path: Option<String>,

    /// OpenAI API key, used by the embeddings provider and the reranker.
    pub openai_api_key: Option<String>,

    /// Embeddings provider: "openai", "local" or "none".
    pub embeddings_provider: String,
    pub embedding_model: String,
    pub embedding_dim: usize,

    /// Rerank provider: "openai" or "none".
    pub rerank_provider: String,

    // Candidate generation bounds.
    pub topk_trigram: usize,
    pub topk_vector: usize,
    pub topk_phonetic: usize,
    pub k_union: usize,

    // Decision thresholds on calibrated probability.
    pub t_high: f64,
    pub t_low: f64,

    // Batch driver sizing.
    pub batch_workers: usize,
    pub batch_chunk_size: usize,

    pub log_level: String,
    pub enable_review_ui: bool,

    /// Listen address for the HTTP server.
    pub bind_addr: String,

    /// Path of the learned scorer artifact; the heuristic scorer is used
    /// when the file is absent.
    pub model_artifact_path: String,
}

impl Settings {
    /// Build settings from the process environment.
    pub fn from_env() -> Result<Self> {
        Ok(Self {
            database_url: std::env::var("DATABASE_URL")
                .context("DATABASE_URL must be set (PostgreSQL connection URL)")?,
            bigquery_project_id: opt_var("BIGQUERY_PROJECT_ID"),
            bigquery_dataset: opt_var("BIGQUERY_DATASET"),
            bigquery_table: var_or("BIGQUERY_TABLE", "suppliers"),
            bigquery_credentials_path: opt_var("BIGQUERY_CREDENTIALS_PATH"),
            openai_api_key: opt_var("OPENAI_API_KEY"),
            embeddings_provider: var_or("EMBEDDINGS_PROVIDER", "openai"),
            embedding_model: var_or("EMBEDDING_MODEL", "text-embedding-3-large"),
            embedding_dim: parsed_var("EMBEDDING_DIM", 1024)?,
            rerank_provider: var_or("RERANK_PROVIDER", "none"),
            topk_trigram: parsed_var("TOPK_TRIGRAM", 50)?,
            topk_vector: parsed_var("TOPK_VECTOR", 50)?,
            topk_phonetic: parsed_var("TOPK_PHONETIC", 50)?,
            k_union: parsed_var("K_UNION", 120)?,
            t_high: parsed_var("T_HIGH", 0.97)?,
            t_low: parsed_var("T_LOW", 0.60)?,
            batch_workers: parsed_var("BATCH_WORKERS", 8)?,
            batch_chunk_size: parsed_var("BATCH_CHUNK_SIZE", 1000)?,
            log_level: var_or("LOG_LEVEL", "info"),
            enable_review_ui: parsed_var("ENABLE_REVIEW_UI", true)?,
            bind_addr: var_or("BIND_ADDR", "0.0.0.0:8000"),
            model_artifact_path: var_or("MODEL_ARTIFACT_PATH", "artifacts/model.json"),
        })
    }
}

fn opt_var(key: &str) -> Option<String> {
    std::env::var(key).ok().filter(|v| !v.is_empty())
}

fn var_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.to_string())
}

fn parsed_var<T>(key: &str, default: T) -> Result<T>
where
    T: FromStr,
    T::Err: Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse::<T>()
            .map_err(|e| anyhow::anyhow!("invalid value for {key}: {e}")),
        Err(_) => Ok(default),
    }
}
