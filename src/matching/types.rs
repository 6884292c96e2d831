//! Types for the matching pipeline.

use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::time::Duration;

use crate::config::Settings;

/// Triage decision for one match call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Decision {
    AutoMatch,
    NeedsReview,
    NoMatch,
}

impl Decision {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::AutoMatch => "auto_match",
            Self::NeedsReview => "needs_review",
            Self::NoMatch => "no_match",
        }
    }
}

impl std::fmt::Display for Decision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One of the independent candidate sources.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum View {
    Exact,
    Trigram,
    Vector,
    Phonetic,
}

impl View {
    /// Short tag used in candidate `sources` entries ("trgm:0.834").
    pub fn tag(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::Trigram => "trgm",
            Self::Vector => "vec",
            Self::Phonetic => "dm",
        }
    }
}

/// Per-view scores actually observed for a candidate. A missing view is
/// absent, not zero.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub struct ViewScores {
    pub exact: Option<f64>,
    pub trgm: Option<f64>,
    pub vec: Option<f64>,
    pub dm: Option<f64>,
}

impl ViewScores {
    pub fn insert(&mut self, view: View, score: f64) {
        match view {
            View::Exact => self.exact = Some(score),
            View::Trigram => self.trgm = Some(score),
            View::Vector => self.vec = Some(score),
            View::Phonetic => self.dm = Some(score),
        }
    }

    fn present(&self) -> impl Iterator<Item = f64> + '_ {
        [self.exact, self.trgm, self.vec, self.dm]
            .into_iter()
            .flatten()
    }

    pub fn max_score(&self) -> f64 {
        self.present().fold(0.0, f64::max)
    }

    pub fn avg_score(&self) -> f64 {
        let (sum, count) = self
            .present()
            .fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
        if count > 0 {
            sum / count as f64
        } else {
            0.0
        }
    }

    /// How many views corroborated this candidate (positive scores only).
    pub fn num_sources(&self) -> usize {
        self.present().filter(|s| *s > 0.0).count()
    }
}

/// A shortlisted candidate before feature extraction.
#[derive(Debug, Clone)]
pub struct Candidate {
    pub payee_id: i64,
    pub scores: ViewScores,
    pub sources: Vec<String>,
    pub max_score: f64,
    pub avg_score: f64,
    pub num_sources: usize,
}

/// A candidate with features, probability and explanation attached.
#[derive(Debug, Clone, Serialize)]
pub struct ScoredCandidate {
    pub payee_id: i64,
    pub name: String,
    pub external_id: Option<String>,
    pub probability: f64,
    pub features: BTreeMap<String, f64>,
    pub top_features: Vec<(String, f64)>,
    pub sources: Vec<String>,
    pub num_sources: usize,
}

/// The payee a query auto-matched to.
#[derive(Debug, Clone, Serialize)]
pub struct MatchedPayee {
    pub payee_id: i64,
    pub name: String,
    pub external_id: Option<String>,
}

/// Outcome of one `match` call.
#[derive(Debug, Clone, Serialize)]
pub struct MatchOutcome {
    pub decision: Decision,
    pub confidence: f64,
    pub matched_payee: Option<MatchedPayee>,
    pub candidates: Vec<ScoredCandidate>,
    pub reason: Option<String>,
}

impl MatchOutcome {
    pub fn no_match(reason: &str) -> Self {
        Self {
            decision: Decision::NoMatch,
            confidence: 0.0,
            matched_payee: None,
            candidates: Vec::new(),
            reason: Some(reason.to_string()),
        }
    }
}

/// One row of a batch response; the outcome fields are flattened beside the
/// original query string.
#[derive(Debug, Clone, Serialize)]
pub struct BatchMatchRow {
    pub query: String,
    #[serde(flatten)]
    pub outcome: MatchOutcome,
}

/// Pipeline tuning, derived from [`Settings`].
#[derive(Debug, Clone)]
pub struct MatchConfig {
    pub topk_trigram: usize,
    pub topk_vector: usize,
    pub topk_phonetic: usize,
    pub k_union: usize,
    pub t_high: f64,
    pub t_low: f64,
    pub batch_workers: usize,
    pub batch_chunk_size: usize,
    /// Bound on each storage view round-trip; a timed-out view degrades to
    /// an empty list.
    pub view_timeout: Duration,
}

impl Default for MatchConfig {
    fn default() -> Self {
        Self {
            topk_trigram: 50,
            topk_vector: 50,
            topk_phonetic: 50,
            k_union: 120,
            t_high: 0.97,
            t_low: 0.60,
            batch_workers: 8,
            batch_chunk_size: 1000,
            view_timeout: Duration::from_secs(5),
        }
    }
}

impl From<&Settings> for MatchConfig {
    fn from(settings: &Settings) -> Self {
        Self {
            topk_trigram: settings.topk_trigram,
            topk_vector: settings.topk_vector,
            topk_phonetic: settings.topk_phonetic,
            k_union: settings.k_union,
            t_high: settings.t_high,
            t_low: settings.t_low,
            batch_workers: settings.batch_workers.max(1),
            batch_chunk_size: settings.batch_chunk_size.max(1),
            view_timeout: Duration::from_secs(5),
        }
    }
}
