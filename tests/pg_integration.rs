//! Live-PostgreSQL integration tests.
//!
//! These need a database with the `pg_trgm` and `vector` extensions
//! available, pointed at by `DATABASE_URL`. They are ignored by default:
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/payees_test cargo test -- --ignored
//! ```

use std::path::Path;
use std::sync::Arc;

use sqlx::postgres::PgPoolOptions;

use payee_match::canonicalize::canonicalize;
use payee_match::database::{self, MatchStore, PayeeInput, PgMatchStore, UpsertOutcome};
use payee_match::embedding::EmbeddingService;
use payee_match::matching::{Decision, MatchConfig, MatchPipeline, Scorer};
use payee_match::IdfCache;

const DIM: usize = 64;

async fn connect() -> Option<sqlx::PgPool> {
    let url = std::env::var("DATABASE_URL").ok()?;
    let pool = PgPoolOptions::new()
        .max_connections(4)
        .connect(&url)
        .await
        .expect("connect to DATABASE_URL");
    database::init_database(&pool).await.expect("init schema");
    database::check_extensions(&pool).await.expect("extensions");
    pool.into()
}

fn payee(name: &str, external_id: &str) -> PayeeInput {
    PayeeInput {
        external_id: Some(external_id.to_string()),
        name: name.to_string(),
        city: Some("Austin".to_string()),
        state: Some("TX".to_string()),
        ..Default::default()
    }
}

#[tokio::test]
#[ignore]
async fn ingest_then_match_round_trip() {
    let Some(pool) = connect().await else {
        return;
    };
    let store = Arc::new(PgMatchStore::new(pool.clone()));
    let embeddings = Arc::new(EmbeddingService::new(
        "local",
        None,
        "pg-test",
        DIM,
        Some(pool.clone()),
    ));

    let input = payee("Zephyr Logistics LLC", "it-round-trip");
    let canon = canonicalize(&input.name);
    let vector = embeddings.embed(&canon.canon).await;
    store
        .upsert_payee(&input, &canon, Some(&vector))
        .await
        .expect("ingest payee");

    let idf = IdfCache::build(store.token_corpus().await.expect("token corpus"));
    let config = MatchConfig::default();
    let t_high = config.t_high;
    let pipeline = MatchPipeline::new(
        store.clone(),
        embeddings,
        Scorer::load(Path::new("artifacts/model.json")),
        idf,
        None,
        config,
    );

    let outcome = pipeline.match_one("Zephyr Logistics LLC").await;
    assert_eq!(outcome.decision, Decision::AutoMatch);
    assert!(outcome.confidence >= t_high);
    assert_eq!(
        outcome.matched_payee.expect("matched payee").name,
        "Zephyr Logistics LLC"
    );
}

#[tokio::test]
#[ignore]
async fn reingesting_same_external_id_updates() {
    let Some(pool) = connect().await else {
        return;
    };
    let store = PgMatchStore::new(pool);

    let first = payee("Quartz Analytics Ltd", "it-upsert");
    let canon = canonicalize(&first.name);
    let outcome = store
        .upsert_payee(&first, &canon, None)
        .await
        .expect("first ingest");
    let first_id = match outcome {
        UpsertOutcome::Inserted(id) => id,
        UpsertOutcome::Updated(id) => id,
    };

    let renamed = payee("Quartz Analytics Limited", "it-upsert");
    let canon = canonicalize(&renamed.name);
    match store
        .upsert_payee(&renamed, &canon, None)
        .await
        .expect("second ingest")
    {
        UpsertOutcome::Updated(id) => assert_eq!(id, first_id),
        UpsertOutcome::Inserted(_) => panic!("expected update, got insert"),
    }
}

#[tokio::test]
#[ignore]
async fn embedding_cache_returns_bitwise_identical_vectors() {
    let Some(pool) = connect().await else {
        return;
    };
    let embeddings = EmbeddingService::new("local", None, "pg-cache-test", DIM, Some(pool));

    let first = embeddings.embed("zephyr logistics").await;
    let second = embeddings.embed("zephyr logistics").await;
    assert_eq!(first, second);
    assert_eq!(first.len(), DIM);
}
