//! Seed the registry with a small test roster of well-known suppliers.
//!
//! ```bash
//! DATABASE_URL=postgresql://localhost/payees cargo run --bin seed_payees
//! ```

use anyhow::{Context, Result};
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;
use tracing_subscriber::EnvFilter;

use payee_match::canonicalize::canonicalize;
use payee_match::database::{self, PayeeInput, PgMatchStore, UpsertOutcome};
use payee_match::embedding::EmbeddingService;
use payee_match::Settings;

#[derive(Parser, Debug)]
#[command(about = "Load test suppliers into the payee matcher")]
struct Args {
    /// Skip embedding generation even when a provider is configured.
    #[arg(long)]
    no_embeddings: bool,
}

const TEST_SUPPLIERS: [(&str, &str, &str); 15] = [
    ("Microsoft Corporation", "Redmond", "WA"),
    ("Home Depot Inc", "Atlanta", "GA"),
    ("HD Supply Holdings Inc", "Atlanta", "GA"),
    ("FedEx Corporation", "Memphis", "TN"),
    ("Apple Inc", "Cupertino", "CA"),
    ("Amazon.com Inc", "Seattle", "WA"),
    ("Google LLC", "Mountain View", "CA"),
    ("Walmart Inc", "Bentonville", "AR"),
    ("United Parcel Service", "Atlanta", "GA"),
    ("Tesla Inc", "Austin", "TX"),
    ("Facebook Inc", "Menlo Park", "CA"),
    ("Netflix Inc", "Los Gatos", "CA"),
    ("Oracle Corporation", "Austin", "TX"),
    ("IBM Corporation", "Armonk", "NY"),
    ("Intel Corporation", "Santa Clara", "CA"),
];

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let args = Args::parse();
    let settings = Settings::from_env()?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&settings.database_url)
        .await
        .context("Failed to connect to database")?;

    database::init_database(&pool).await?;
    database::check_extensions(&pool).await?;

    let store = PgMatchStore::new(pool.clone());
    let embeddings = if args.no_embeddings {
        None
    } else {
        Some(EmbeddingService::new(
            &settings.embeddings_provider,
            settings.openai_api_key.clone(),
            &settings.embedding_model,
            settings.embedding_dim,
            Some(pool.clone()),
        ))
    };

    let mut inserted = 0usize;
    let mut updated = 0usize;

    for (index, (name, city, state)) in TEST_SUPPLIERS.into_iter().enumerate() {
        let canon = canonicalize(name);
        let embedding = match &embeddings {
            Some(service) if service.enabled() => Some(service.embed(&canon.canon).await),
            _ => None,
        };

        // Stable external ids make re-runs update instead of duplicating.
        let input = PayeeInput {
            external_id: Some(format!("seed-{:03}", index + 1)),
            name: name.to_string(),
            address: None,
            city: Some(city.to_string()),
            state: Some(state.to_string()),
            zip_code: None,
            country: Some("US".to_string()),
        };

        match store.upsert_payee(&input, &canon, embedding.as_deref()).await? {
            UpsertOutcome::Inserted(payee_id) => {
                inserted += 1;
                info!(payee_id, name, canon = %canon.canon, "inserted");
            }
            UpsertOutcome::Updated(payee_id) => {
                updated += 1;
                info!(payee_id, name, "updated");
            }
        }
    }

    println!("Seed complete: {inserted} inserted, {updated} updated");
    Ok(())
}
