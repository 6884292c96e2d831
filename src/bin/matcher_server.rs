//! Payee matcher HTTP server.
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/payees cargo run --bin matcher_server
//!
//! curl -X POST http://localhost:8000/v1/match \
//!   -H "Content-Type: application/json" \
//!   -d '{"name": "Microsoft Corp"}'
//! ```

use anyhow::{Context, Result};
use sqlx::postgres::PgPoolOptions;
use std::path::Path;
use std::sync::Arc;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

use payee_match::api::{create_router, AppState};
use payee_match::database::{self, MatchStore, PgMatchStore, ReviewService};
use payee_match::embedding::EmbeddingService;
use payee_match::matching::{MatchConfig, OpenAiReranker, Reranker, Scorer};
use payee_match::{IdfCache, MatchPipeline, Settings};

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    let settings = Settings::from_env()?;

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(settings.log_level.clone())),
        )
        .init();

    info!("starting payee matcher");

    let pool = PgPoolOptions::new()
        .max_connections(20)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to database")?;

    // Schema and extensions are startup-fatal: without pg_trgm and vector
    // the candidate views cannot run.
    database::init_database(&pool).await?;
    database::check_extensions(&pool).await?;

    let store = Arc::new(PgMatchStore::new(pool.clone()));

    let corpus = store.token_corpus().await?;
    let idf = IdfCache::build(corpus);
    info!(
        tokens = idf.token_count(),
        documents = idf.document_count(),
        "IDF cache loaded"
    );

    let embeddings = Arc::new(EmbeddingService::new(
        &settings.embeddings_provider,
        settings.openai_api_key.clone(),
        &settings.embedding_model,
        settings.embedding_dim,
        Some(pool.clone()),
    ));

    let scorer = Scorer::load(Path::new(&settings.model_artifact_path));

    let reranker: Option<Arc<dyn Reranker>> = if settings.rerank_provider == "openai" {
        match settings.openai_api_key.clone() {
            Some(key) => Some(Arc::new(OpenAiReranker::new(key)?)),
            None => {
                warn!("rerank provider is openai but OPENAI_API_KEY is missing; rerank disabled");
                None
            }
        }
    } else {
        None
    };

    let pipeline = Arc::new(MatchPipeline::new(
        store.clone(),
        embeddings.clone(),
        scorer,
        idf,
        reranker,
        MatchConfig::from(&settings),
    ));

    let supplier_count = store.payee_count().await?;
    info!(suppliers = supplier_count, "registry loaded");
    if supplier_count == 0 {
        warn!("no payees loaded; run seed_payees or ingest via /v1/payees/ingest");
    }
    if settings.bigquery_project_id.is_some() {
        info!(
            table = %settings.bigquery_table,
            "supplier warehouse sync configured externally"
        );
    }
    if settings.enable_review_ui {
        info!("review UI flag enabled; review data served from /v1/review/open");
    }

    let state = AppState {
        pipeline,
        store,
        embeddings,
        review: Arc::new(ReviewService::new(pool.clone())),
        pool,
        settings: Arc::new(settings.clone()),
    };

    let app = create_router(state)
        .layer(
            CorsLayer::new()
                .allow_origin(Any)
                .allow_methods(Any)
                .allow_headers(Any),
        )
        .layer(TraceLayer::new_for_http());

    let listener = tokio::net::TcpListener::bind(&settings.bind_addr)
        .await
        .with_context(|| format!("Failed to bind {}", settings.bind_addr))?;
    info!(addr = %settings.bind_addr, "server listening");

    axum::serve(listener, app)
        .await
        .context("Server exited with error")?;
    Ok(())
}
