//! Candidate generation: independent similarity views plus union/dedupe.
//!
//! The three non-exact views run concurrently under a bounded timeout; each
//! is failure-isolated, so a storage error or timeout degrades that view to
//! an empty list and the pipeline continues with the rest.

use std::collections::BTreeMap;
use std::time::Duration;

use futures::Future;
use tokio::time::timeout;
use tracing::{debug, error};

use crate::canonicalize::CanonicalName;
use crate::database::store::{MatchStore, ViewHit};

use super::types::{Candidate, MatchConfig, View, ViewScores};

/// Result of running the non-exact views for one query.
pub struct GeneratedCandidates {
    pub candidates: Vec<Candidate>,
    pub views_attempted: usize,
    pub views_failed: usize,
}

/// Run the trigram, vector and phonetic views concurrently and union the
/// results. The vector view is skipped when no query embedding is supplied.
pub async fn generate(
    store: &dyn MatchStore,
    query: &CanonicalName,
    query_vec: Option<&[f32]>,
    config: &MatchConfig,
) -> GeneratedCandidates {
    let deadline = config.view_timeout;

    let trigram = run_view(
        View::Trigram,
        deadline,
        store.trigram_candidates(&query.canon, config.topk_trigram),
    );
    let vector = async {
        match query_vec {
            Some(vec) => {
                run_view(
                    View::Vector,
                    deadline,
                    store.vector_candidates(vec, config.topk_vector),
                )
                .await
            }
            None => Skipped,
        }
    };
    let phonetic = run_view(
        View::Phonetic,
        deadline,
        store.phonetic_candidates(&query.dm_codes, config.topk_phonetic),
    );

    let (trigram, vector, phonetic) = tokio::join!(trigram, vector, phonetic);

    let mut views: Vec<(View, Vec<ViewHit>)> = Vec::new();
    let mut views_attempted = 0usize;
    let mut views_failed = 0usize;
    for (view, outcome) in [
        (View::Trigram, trigram),
        (View::Vector, vector),
        (View::Phonetic, phonetic),
    ] {
        match outcome {
            Succeeded(hits) => {
                views_attempted += 1;
                views.push((view, hits));
            }
            Failed => {
                views_attempted += 1;
                views_failed += 1;
            }
            Skipped => {}
        }
    }

    let candidates = union_candidates(&views, config.k_union);
    debug!(
        unique = candidates.len(),
        views_attempted, views_failed, "candidate union complete"
    );

    GeneratedCandidates {
        candidates,
        views_attempted,
        views_failed,
    }
}

use ViewOutcome::{Failed, Skipped, Succeeded};

enum ViewOutcome {
    Succeeded(Vec<ViewHit>),
    Failed,
    Skipped,
}

async fn run_view<F>(view: View, deadline: Duration, fut: F) -> ViewOutcome
where
    F: Future<Output = anyhow::Result<Vec<ViewHit>>>,
{
    match timeout(deadline, fut).await {
        Ok(Ok(hits)) => Succeeded(hits),
        Ok(Err(e)) => {
            error!(view = view.tag(), error = %e, "candidate view failed");
            Failed
        }
        Err(_) => {
            error!(view = view.tag(), timeout_ms = deadline.as_millis() as u64, "candidate view timed out");
            Failed
        }
    }
}

/// Union per-view hit lists into a deduplicated shortlist of at most
/// `k_union` candidates.
///
/// Ordering is `(max_score desc, num_sources desc, payee_id asc)` - max is
/// robust when one view is very confident, and corroboration by multiple
/// views is the most informative cheap tie-break. The `payee_id` tail makes
/// the ordering deterministic regardless of view arrival order.
pub fn union_candidates(views: &[(View, Vec<ViewHit>)], k_union: usize) -> Vec<Candidate> {
    let mut grouped: BTreeMap<i64, (ViewScores, Vec<String>)> = BTreeMap::new();

    for (view, hits) in views {
        for hit in hits {
            let entry = grouped
                .entry(hit.payee_id)
                .or_insert_with(|| (ViewScores::default(), Vec::new()));
            entry.0.insert(*view, hit.score);
            entry.1.push(format!("{}:{:.3}", view.tag(), hit.score));
        }
    }

    let mut candidates: Vec<Candidate> = grouped
        .into_iter()
        .map(|(payee_id, (scores, sources))| Candidate {
            payee_id,
            max_score: scores.max_score(),
            avg_score: scores.avg_score(),
            num_sources: scores.num_sources(),
            scores,
            sources,
        })
        .collect();

    candidates.sort_by(|a, b| {
        b.max_score
            .total_cmp(&a.max_score)
            .then(b.num_sources.cmp(&a.num_sources))
            .then(a.payee_id.cmp(&b.payee_id))
    });
    candidates.truncate(k_union);
    candidates
}
