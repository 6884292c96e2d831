//! End-to-end pipeline tests against an in-memory registry store.
//!
//! The store implements the same capability contract as the PostgreSQL
//! backend: word-padded character trigrams, cosine similarity over the
//! deterministic local embeddings, and Double Metaphone code intersection.

use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use async_trait::async_trait;

use payee_match::canonicalize::canonicalize;
use payee_match::database::{MatchStore, PayeeRecord, ViewHit};
use payee_match::embedding::{local_embedding, EmbeddingService};
use payee_match::matching::{
    Decision, MatchConfig, MatchPipeline, Reranker, RerankVerdict, Scorer,
};
use payee_match::IdfCache;

const DIM: usize = 32;

struct SeededPayee {
    record: PayeeRecord,
    vector: Vec<f32>,
}

#[derive(Debug)]
struct ReviewRow {
    q_name_raw: String,
    q_name_canon: String,
    candidates: serde_json::Value,
}

struct MemoryStore {
    payees: Vec<SeededPayee>,
    reviews: Mutex<Vec<ReviewRow>>,
    fail_views: AtomicBool,
}

impl MemoryStore {
    fn seeded(names: &[&str]) -> Self {
        let payees = names
            .iter()
            .enumerate()
            .map(|(index, name)| {
                let canon = canonicalize(name);
                let vector = local_embedding(&canon.canon, DIM);
                SeededPayee {
                    record: PayeeRecord {
                        payee_id: index as i64 + 1,
                        external_id: None,
                        name_raw: name.to_string(),
                        name_canon: canon.canon,
                        name_tokens: canon.tokens,
                        dm_codes: canon.dm_codes,
                        address: None,
                        city: None,
                        state: None,
                    },
                    vector,
                }
            })
            .collect();
        Self {
            payees,
            reviews: Mutex::new(Vec::new()),
            fail_views: AtomicBool::new(false),
        }
    }

    fn review_rows(&self) -> Vec<String> {
        self.reviews
            .lock()
            .expect("reviews lock")
            .iter()
            .map(|r| r.q_name_canon.clone())
            .collect()
    }

    fn check_up(&self) -> Result<()> {
        if self.fail_views.load(Ordering::SeqCst) {
            bail!("storage down");
        }
        Ok(())
    }
}

/// pg_trgm-style trigrams: each word padded with two leading and one
/// trailing space.
fn word_trigrams(text: &str) -> HashSet<String> {
    let mut grams = HashSet::new();
    for word in text.split_whitespace() {
        let padded: Vec<char> = format!("  {word} ").chars().collect();
        for window in padded.windows(3) {
            grams.insert(window.iter().collect());
        }
    }
    grams
}

fn trigram_similarity(a: &str, b: &str) -> f64 {
    let ga = word_trigrams(a);
    let gb = word_trigrams(b);
    if ga.is_empty() || gb.is_empty() {
        return 0.0;
    }
    let intersection = ga.intersection(&gb).count() as f64;
    let union = ga.union(&gb).count() as f64;
    intersection / union
}

fn cosine(a: &[f32], b: &[f32]) -> f64 {
    let dot: f64 = a.iter().zip(b.iter()).map(|(x, y)| *x as f64 * *y as f64).sum();
    let na: f64 = a.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    let nb: f64 = b.iter().map(|x| (*x as f64).powi(2)).sum::<f64>().sqrt();
    if na == 0.0 || nb == 0.0 {
        return 0.0;
    }
    dot / (na * nb)
}

fn sorted_hits(mut hits: Vec<ViewHit>, limit: usize) -> Vec<ViewHit> {
    hits.sort_by(|a, b| {
        b.score
            .total_cmp(&a.score)
            .then(a.payee_id.cmp(&b.payee_id))
    });
    hits.truncate(limit);
    hits
}

#[async_trait]
impl MatchStore for MemoryStore {
    async fn exact_candidate(&self, name_canon: &str) -> Result<Option<i64>> {
        self.check_up()?;
        Ok(self
            .payees
            .iter()
            .find(|p| p.record.name_canon == name_canon)
            .map(|p| p.record.payee_id))
    }

    async fn trigram_candidates(&self, name_canon: &str, limit: usize) -> Result<Vec<ViewHit>> {
        self.check_up()?;
        let hits = self
            .payees
            .iter()
            .filter_map(|p| {
                let score = trigram_similarity(name_canon, &p.record.name_canon);
                (score > 0.0).then_some(ViewHit {
                    payee_id: p.record.payee_id,
                    score,
                })
            })
            .collect();
        Ok(sorted_hits(hits, limit))
    }

    async fn vector_candidates(&self, query_vec: &[f32], limit: usize) -> Result<Vec<ViewHit>> {
        self.check_up()?;
        let hits = self
            .payees
            .iter()
            .filter_map(|p| {
                let score = cosine(query_vec, &p.vector).clamp(0.0, 1.0);
                (score > 0.0).then_some(ViewHit {
                    payee_id: p.record.payee_id,
                    score,
                })
            })
            .collect();
        Ok(sorted_hits(hits, limit))
    }

    async fn phonetic_candidates(&self, dm_codes: &[String], limit: usize) -> Result<Vec<ViewHit>> {
        self.check_up()?;
        let query: HashSet<&String> = dm_codes.iter().collect();
        if query.is_empty() {
            return Ok(Vec::new());
        }
        let hits = self
            .payees
            .iter()
            .filter_map(|p| {
                let codes: HashSet<&String> = p.record.dm_codes.iter().collect();
                let intersection = query.intersection(&codes).count() as f64;
                if intersection == 0.0 {
                    return None;
                }
                let union = query.union(&codes).count() as f64;
                Some(ViewHit {
                    payee_id: p.record.payee_id,
                    score: intersection / union,
                })
            })
            .collect();
        Ok(sorted_hits(hits, limit))
    }

    async fn fetch_payee(&self, payee_id: i64) -> Result<Option<PayeeRecord>> {
        Ok(self
            .payees
            .iter()
            .find(|p| p.record.payee_id == payee_id)
            .map(|p| p.record.clone()))
    }

    async fn enqueue_review(
        &self,
        q_name_raw: &str,
        q_name_canon: &str,
        candidates: &serde_json::Value,
    ) -> Result<i64> {
        let mut reviews = self.reviews.lock().expect("reviews lock");
        reviews.push(ReviewRow {
            q_name_raw: q_name_raw.to_string(),
            q_name_canon: q_name_canon.to_string(),
            candidates: candidates.clone(),
        });
        Ok(reviews.len() as i64)
    }

    async fn payee_count(&self) -> Result<i64> {
        Ok(self.payees.len() as i64)
    }

    async fn token_corpus(&self) -> Result<Vec<Vec<String>>> {
        Ok(self
            .payees
            .iter()
            .map(|p| p.record.name_tokens.clone())
            .collect())
    }
}

/// A reranker that confirms identity only for the FedEx pair.
struct StubReranker;

#[async_trait]
impl Reranker for StubReranker {
    async fn compare(&self, _query_raw: &str, candidate_raw: &str) -> Result<RerankVerdict> {
        if candidate_raw.contains("FedEx") {
            Ok(RerankVerdict {
                same: true,
                confidence: 0.95,
                reason: Some("same carrier, spacing variant".to_string()),
            })
        } else {
            Ok(RerankVerdict {
                same: false,
                confidence: 0.2,
                reason: None,
            })
        }
    }
}

const REGISTRY: [&str; 5] = [
    "Microsoft Corporation",
    "Home Depot Inc",
    "HD Supply Holdings Inc",
    "FedEx Corporation",
    "Apple Inc",
];

async fn build_pipeline(
    store: Arc<MemoryStore>,
    reranker: Option<Arc<dyn Reranker>>,
    config: MatchConfig,
) -> MatchPipeline {
    let idf = IdfCache::build(store.token_corpus().await.expect("token corpus"));
    let embeddings = Arc::new(EmbeddingService::new("local", None, "local-test", DIM, None));
    MatchPipeline::new(store, embeddings, Scorer::Heuristic, idf, reranker, config)
}

#[tokio::test]
async fn exact_canonical_matches_take_the_fast_path() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store.clone(), None, MatchConfig::default()).await;

    for (query, expected) in [
        ("Microsoft Corp", "Microsoft Corporation"),
        ("MICROSOFT", "Microsoft Corporation"),
        ("The Home Depot", "Home Depot Inc"),
        ("HD Supply", "HD Supply Holdings Inc"),
    ] {
        let outcome = pipeline.match_one(query).await;
        assert_eq!(outcome.decision, Decision::AutoMatch, "query {query}");
        assert_eq!(outcome.confidence, 1.0, "query {query}");
        let matched = outcome.matched_payee.expect("matched payee");
        assert_eq!(matched.name, expected, "query {query}");
    }

    // Fast-path matches never touch the review queue.
    assert!(store.review_rows().is_empty());
}

#[tokio::test]
async fn typo_is_escalated_to_review_with_correct_top_candidate() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store.clone(), None, MatchConfig::default()).await;

    let outcome = pipeline.match_one("Microsft").await;
    assert_eq!(outcome.decision, Decision::NeedsReview);
    assert!(
        outcome.confidence >= 0.60 && outcome.confidence < 0.97,
        "confidence {} outside review band",
        outcome.confidence
    );
    assert_eq!(outcome.candidates[0].name, "Microsoft Corporation");
    assert!(outcome.matched_payee.is_none());

    // Exactly one open review row for this query.
    let rows = store.review_rows();
    assert_eq!(rows, vec!["microsft".to_string()]);
}

#[tokio::test]
async fn empty_name_is_rejected_without_writes() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store.clone(), None, MatchConfig::default()).await;

    for query in ["", "   ", "\t"] {
        let outcome = pipeline.match_one(query).await;
        assert_eq!(outcome.decision, Decision::NoMatch);
        assert_eq!(outcome.confidence, 0.0);
        assert_eq!(outcome.reason.as_deref(), Some("Empty or invalid name"));
        assert!(outcome.candidates.is_empty());
    }
    assert!(store.review_rows().is_empty());
}

#[tokio::test]
async fn unknown_name_is_no_match() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store, None, MatchConfig::default()).await;

    let outcome = pipeline.match_one("Unknown Widgets LLC").await;
    assert_eq!(outcome.decision, Decision::NoMatch);
    assert!(outcome.matched_payee.is_none());
    assert!(outcome.confidence < 0.60);
}

#[tokio::test]
async fn spaced_compound_ranks_fedex_first_without_reranker() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store, None, MatchConfig::default()).await;

    let outcome = pipeline.match_one("Fed Ex").await;
    assert!(!outcome.candidates.is_empty());
    assert_eq!(outcome.candidates[0].name, "FedEx Corporation");
    // The heuristic alone cannot clear the auto threshold for a spacing
    // variant with no shared tokens; the rerank path covers that.
    assert_ne!(outcome.decision, Decision::AutoMatch);
}

#[tokio::test]
async fn rerank_upgrades_borderline_fedex_to_auto_match() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    // Lower review threshold pulls the spacing variant into the borderline
    // band where the reranker is consulted.
    let config = MatchConfig {
        t_low: 0.30,
        ..MatchConfig::default()
    };
    let pipeline = build_pipeline(store.clone(), Some(Arc::new(StubReranker)), config).await;

    let outcome = pipeline.match_one("Fed Ex").await;
    assert_eq!(outcome.decision, Decision::AutoMatch);
    assert!(outcome.confidence >= 0.90);
    let matched = outcome.matched_payee.expect("matched payee");
    assert_eq!(matched.name, "FedEx Corporation");

    // Upgraded matches are not enqueued for review.
    assert!(store.review_rows().is_empty());
}

#[tokio::test]
async fn rerank_rejection_leaves_decision_unchanged() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(
        store.clone(),
        Some(Arc::new(StubReranker)),
        MatchConfig::default(),
    )
    .await;

    // The stub rejects non-FedEx pairs, so the typo stays in review.
    let outcome = pipeline.match_one("Microsft").await;
    assert_eq!(outcome.decision, Decision::NeedsReview);
    assert_eq!(store.review_rows().len(), 1);
}

#[tokio::test]
async fn probabilities_bounded_and_ordering_deterministic() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store, None, MatchConfig::default()).await;

    let first = pipeline.match_one("Microsft").await;
    let second = pipeline.match_one("Microsft").await;

    for candidate in first.candidates.iter().chain(second.candidates.iter()) {
        assert!(
            (0.0..=1.0).contains(&candidate.probability),
            "probability out of bounds: {}",
            candidate.probability
        );
    }

    let first_ids: Vec<i64> = first.candidates.iter().map(|c| c.payee_id).collect();
    let second_ids: Vec<i64> = second.candidates.iter().map(|c| c.payee_id).collect();
    assert_eq!(first_ids, second_ids);
    assert_eq!(first.decision, second.decision);
}

#[tokio::test]
async fn works_with_vector_view_disabled() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let idf = IdfCache::build(store.token_corpus().await.expect("token corpus"));
    let embeddings = Arc::new(EmbeddingService::new("none", None, "unused", DIM, None));
    let pipeline = MatchPipeline::new(
        store,
        embeddings,
        Scorer::Heuristic,
        idf,
        None,
        MatchConfig::default(),
    );

    let outcome = pipeline.match_one("Microsft").await;
    assert_eq!(outcome.candidates[0].name, "Microsoft Corporation");
    assert_ne!(outcome.decision, Decision::NoMatch);
}

#[tokio::test]
async fn total_storage_outage_degrades_to_no_match_with_reason() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    store.fail_views.store(true, Ordering::SeqCst);
    let pipeline = build_pipeline(store, None, MatchConfig::default()).await;

    let outcome = pipeline.match_one("Microsoft Corp").await;
    assert_eq!(outcome.decision, Decision::NoMatch);
    assert_eq!(outcome.reason.as_deref(), Some("storage unavailable"));
}

#[tokio::test]
async fn batch_results_preserve_input_order() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store, None, MatchConfig::default()).await;

    let names = vec![
        "Microsoft Corp".to_string(),
        "".to_string(),
        "HD Supply".to_string(),
        "Unknown Widgets LLC".to_string(),
    ];
    let rows = pipeline.match_batch(names.clone()).await;

    assert_eq!(rows.len(), names.len());
    for (row, name) in rows.iter().zip(names.iter()) {
        assert_eq!(&row.query, name);
    }
    assert_eq!(rows[0].outcome.decision, Decision::AutoMatch);
    assert_eq!(rows[1].outcome.decision, Decision::NoMatch);
    assert_eq!(rows[2].outcome.decision, Decision::AutoMatch);
    assert_eq!(rows[3].outcome.decision, Decision::NoMatch);
}

#[tokio::test]
async fn review_payload_carries_scored_candidates() {
    let store = Arc::new(MemoryStore::seeded(&REGISTRY));
    let pipeline = build_pipeline(store.clone(), None, MatchConfig::default()).await;

    pipeline.match_one("Microsft").await;

    let reviews = store.reviews.lock().expect("reviews lock");
    assert_eq!(reviews.len(), 1);
    let row = &reviews[0];
    assert_eq!(row.q_name_raw, "Microsft");
    let candidates = row.candidates.as_array().expect("candidates array");
    assert!(!candidates.is_empty());
    assert!(candidates[0].get("probability").is_some());
    assert!(candidates[0].get("top_features").is_some());
}
