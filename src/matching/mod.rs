//! The matching pipeline: canonicalization → multi-view candidate
//! generation → feature construction → calibrated scoring → thresholded
//! decision → review escalation.

pub mod candidates;
pub mod engine;
pub mod features;
pub mod rerank;
pub mod scorer;
pub mod types;

pub use engine::MatchPipeline;
pub use features::{Feature, FeatureVector, FEATURE_COUNT, FEATURE_NAMES};
pub use rerank::{OpenAiReranker, Reranker, RerankVerdict};
pub use scorer::{CalibrationPoint, LinearModel, Scorer};
pub use types::{
    BatchMatchRow, Candidate, Decision, MatchConfig, MatchOutcome, MatchedPayee, ScoredCandidate,
    View, ViewScores,
};
