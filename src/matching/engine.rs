//! The matching pipeline: canonicalization through decision.
//!
//! A `match` call either returns a well-formed decision or fails only on
//! programmer error; transient storage and provider outages degrade to
//! lower confidence, never to wrong matches.

use std::sync::Arc;

use futures::stream::{self, StreamExt};
use serde_json::json;
use tracing::{debug, error, info, instrument, warn};

use crate::canonicalize::{canonicalize, CanonicalName};
use crate::database::store::{MatchStore, PayeeRecord};
use crate::embedding::EmbeddingService;
use crate::idf::IdfCache;

use super::candidates::{self, GeneratedCandidates};
use super::features;
use super::rerank::Reranker;
use super::scorer::Scorer;
use super::types::{
    BatchMatchRow, Candidate, Decision, MatchConfig, MatchOutcome, MatchedPayee, ScoredCandidate,
    View, ViewScores,
};

/// How many scored candidates a review item persists, and how many the
/// response carries.
const REVIEW_CANDIDATES: usize = 10;
const RESPONSE_CANDIDATES: usize = 5;
const RERANK_UPGRADE_CONFIDENCE: f64 = 0.90;

/// The assembled matcher. Pure per call; safe to share across a worker pool.
pub struct MatchPipeline {
    store: Arc<dyn MatchStore>,
    embeddings: Arc<EmbeddingService>,
    scorer: Scorer,
    idf: IdfCache,
    reranker: Option<Arc<dyn Reranker>>,
    config: MatchConfig,
}

impl MatchPipeline {
    pub fn new(
        store: Arc<dyn MatchStore>,
        embeddings: Arc<EmbeddingService>,
        scorer: Scorer,
        idf: IdfCache,
        reranker: Option<Arc<dyn Reranker>>,
        config: MatchConfig,
    ) -> Self {
        Self {
            store,
            embeddings,
            scorer,
            idf,
            reranker,
            config,
        }
    }

    pub fn config(&self) -> &MatchConfig {
        &self.config
    }

    /// Match one raw payee name against the registry.
    #[instrument(skip(self), fields(name = %name_raw))]
    pub async fn match_one(&self, name_raw: &str) -> MatchOutcome {
        let query = canonicalize(name_raw);
        if query.is_empty() {
            return MatchOutcome::no_match("Empty or invalid name");
        }

        // Fast path: an exact canonical hit short-circuits every other view.
        let probe = tokio::time::timeout(
            self.config.view_timeout,
            self.store.exact_candidate(&query.canon),
        )
        .await;
        match probe {
            Ok(Ok(Some(payee_id))) => {
                if let Some(outcome) = self.exact_outcome(name_raw, &query, payee_id).await {
                    return outcome;
                }
            }
            Ok(Ok(None)) => {}
            Ok(Err(e)) => warn!(error = %e, "exact probe failed; continuing with other views"),
            Err(_) => warn!("exact probe timed out; continuing with other views"),
        }

        let query_vec = if self.embeddings.enabled() {
            Some(self.embeddings.embed(&query.canon).await)
        } else {
            None
        };

        let GeneratedCandidates {
            candidates,
            views_attempted,
            views_failed,
        } = candidates::generate(
            self.store.as_ref(),
            &query,
            query_vec.as_deref(),
            &self.config,
        )
        .await;

        if candidates.is_empty() {
            let reason = if views_attempted > 0 && views_failed == views_attempted {
                "storage unavailable"
            } else {
                "No candidates found"
            };
            return MatchOutcome::no_match(reason);
        }

        let mut scored = self.score_candidates(name_raw, &query, candidates).await;
        if scored.is_empty() {
            return MatchOutcome::no_match("No viable candidates");
        }

        // Deterministic ordering: probability, then corroboration, then id.
        scored.sort_by(|a, b| {
            b.probability
                .total_cmp(&a.probability)
                .then(b.num_sources.cmp(&a.num_sources))
                .then(a.payee_id.cmp(&b.payee_id))
        });

        let best = scored[0].clone();
        let mut confidence = best.probability;
        let mut decision = self.decide(confidence);

        // Optional LLM rerank, for borderline cases only.
        if decision == Decision::NeedsReview {
            if let Some(reranker) = &self.reranker {
                match reranker.compare(name_raw, &best.name).await {
                    Ok(verdict) if verdict.same && verdict.confidence >= RERANK_UPGRADE_CONFIDENCE => {
                        debug!(
                            llm_confidence = verdict.confidence,
                            "rerank upgraded borderline match"
                        );
                        decision = Decision::AutoMatch;
                        confidence = confidence.max(verdict.confidence);
                    }
                    Ok(_) => {}
                    Err(e) => warn!(error = %e, "rerank failed; decision unchanged"),
                }
            }
        }

        if decision == Decision::NeedsReview {
            self.enqueue_review(name_raw, &query, &scored).await;
        }

        let outcome = self.build_outcome(decision, confidence, best, scored);

        info!(
            query = %query.canon,
            decision = %outcome.decision,
            confidence = outcome.confidence,
            matched_id = ?outcome.matched_payee.as_ref().map(|p| p.payee_id),
            candidate_count = outcome.candidates.len(),
            "match decision"
        );
        outcome
    }

    /// Match a batch of names. Results are returned in input order; within a
    /// chunk, up to `batch_workers` queries run concurrently.
    pub async fn match_batch(&self, names: Vec<String>) -> Vec<BatchMatchRow> {
        info!(count = names.len(), "batch match started");

        let mut results = Vec::with_capacity(names.len());
        for chunk in names.chunks(self.config.batch_chunk_size) {
            let rows: Vec<BatchMatchRow> = stream::iter(chunk.iter().cloned())
                .map(|name| async move {
                    let outcome = self.match_one(&name).await;
                    BatchMatchRow {
                        query: name,
                        outcome,
                    }
                })
                .buffered(self.config.batch_workers)
                .collect()
                .await;
            results.extend(rows);
        }

        info!(count = results.len(), "batch match complete");
        results
    }

    fn decide(&self, confidence: f64) -> Decision {
        if confidence >= self.config.t_high {
            Decision::AutoMatch
        } else if confidence >= self.config.t_low {
            Decision::NeedsReview
        } else {
            Decision::NoMatch
        }
    }

    /// Build the fast-path outcome for an exact canonical hit. Returns None
    /// when the row vanished between probe and fetch.
    async fn exact_outcome(
        &self,
        name_raw: &str,
        query: &CanonicalName,
        payee_id: i64,
    ) -> Option<MatchOutcome> {
        let record = match self.store.fetch_payee(payee_id).await {
            Ok(Some(record)) => record,
            Ok(None) => return None,
            Err(e) => {
                warn!(error = %e, payee_id, "exact hit fetch failed");
                return None;
            }
        };

        let mut scores = ViewScores::default();
        scores.insert(View::Exact, 1.0);
        let feature_vector = features::extract(name_raw, query, &record, &scores, &self.idf);
        let top_features = self.scorer.explain(&feature_vector, 3);

        let candidate = ScoredCandidate {
            payee_id: record.payee_id,
            name: record.name_raw.clone(),
            external_id: record.external_id.clone(),
            probability: 1.0,
            features: feature_vector.to_map(),
            top_features,
            sources: vec!["exact:1.000".to_string()],
            num_sources: 1,
        };

        info!(query = %query.canon, payee_id, "exact canonical match");
        Some(MatchOutcome {
            decision: Decision::AutoMatch,
            confidence: 1.0,
            matched_payee: Some(MatchedPayee {
                payee_id: record.payee_id,
                name: record.name_raw,
                external_id: record.external_id,
            }),
            candidates: vec![candidate],
            reason: Some(format!("High confidence match ({:.2}%)", 100.0)),
        })
    }

    async fn score_candidates(
        &self,
        name_raw: &str,
        query: &CanonicalName,
        candidates: Vec<Candidate>,
    ) -> Vec<ScoredCandidate> {
        let mut scored = Vec::with_capacity(candidates.len());

        for candidate in candidates {
            let record: PayeeRecord = match self.store.fetch_payee(candidate.payee_id).await {
                Ok(Some(record)) => record,
                Ok(None) => continue,
                Err(e) => {
                    error!(error = %e, payee_id = candidate.payee_id, "candidate fetch failed");
                    continue;
                }
            };

            let feature_vector =
                features::extract(name_raw, query, &record, &candidate.scores, &self.idf);
            let probability = self.scorer.score(&feature_vector);
            let top_features = self.scorer.explain(&feature_vector, 3);

            scored.push(ScoredCandidate {
                payee_id: record.payee_id,
                name: record.name_raw,
                external_id: record.external_id,
                probability,
                features: feature_vector.to_map(),
                top_features,
                sources: candidate.sources,
                num_sources: candidate.num_sources,
            });
        }
        scored
    }

    async fn enqueue_review(
        &self,
        name_raw: &str,
        query: &CanonicalName,
        scored: &[ScoredCandidate],
    ) {
        let top = &scored[..scored.len().min(REVIEW_CANDIDATES)];
        let payload = serde_json::to_value(top).unwrap_or_else(|_| json!([]));

        match self
            .store
            .enqueue_review(name_raw, &query.canon, &payload)
            .await
        {
            Ok(rq_id) => info!(rq_id, query = %query.canon, "added to review queue"),
            Err(e) => error!(error = %e, "failed to enqueue review item"),
        }
    }

    fn build_outcome(
        &self,
        decision: Decision,
        confidence: f64,
        best: ScoredCandidate,
        mut scored: Vec<ScoredCandidate>,
    ) -> MatchOutcome {
        scored.truncate(RESPONSE_CANDIDATES);

        let percent = confidence * 100.0;
        let (matched_payee, reason) = match decision {
            Decision::AutoMatch => (
                Some(MatchedPayee {
                    payee_id: best.payee_id,
                    name: best.name,
                    external_id: best.external_id,
                }),
                format!("High confidence match ({percent:.2}%)"),
            ),
            Decision::NeedsReview => (None, format!("Borderline match ({percent:.2}%), review needed")),
            Decision::NoMatch => (None, format!("Low confidence ({percent:.2}%)")),
        };

        MatchOutcome {
            decision,
            confidence,
            matched_payee,
            candidates: scored,
            reason: Some(reason),
        }
    }
}
