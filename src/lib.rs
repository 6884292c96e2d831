//! Payee Entity-Resolution Matcher
//!
//! Decides whether a raw business name refers to an entity already known in
//! the canonical payee registry, and if so which one, with a calibrated
//! confidence and a triage decision.
//!
//! # Architecture
//!
//! ```text
//! Raw payee name
//!       │
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Canonicalizer                          │
//! │  "The Home Depot, Inc." → "depot home"  │
//! └─────────────────────────────────────────┘
//!       │
//!       ├─── Exact canonical hit ──► auto_match @ 1.0
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Candidate views (run concurrently)     │
//! │  trigram │ vector (ANN) │ phonetic (DM) │
//! └─────────────────────────────────────────┘
//!       │ union / dedupe
//!       ▼
//! ┌─────────────────────────────────────────┐
//! │  Feature extraction + scoring           │
//! │  28 features → calibrated probability   │
//! └─────────────────────────────────────────┘
//!       │ thresholds (t_high / t_low)
//!       ▼
//!  auto_match │ needs_review (+ queue) │ no_match
//! ```

pub mod api;
pub mod canonicalize;
pub mod config;
pub mod database;
pub mod embedding;
pub mod idf;
pub mod matching;

pub use canonicalize::{canonicalize, CanonicalName};
pub use config::Settings;
pub use idf::IdfCache;
pub use matching::{Decision, MatchOutcome, MatchPipeline};
