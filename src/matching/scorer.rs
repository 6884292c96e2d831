//! Match scoring: a calibrated probability from a feature vector.
//!
//! Two interchangeable implementations behind one `score`/`explain`
//! contract, chosen once at startup: a learned linear model loaded from an
//! artifact on disk, and a hand-tuned heuristic fallback.

use serde::{Deserialize, Serialize};
use std::path::Path;
use tracing::{info, warn};

use super::features::{Feature, FeatureVector, FEATURE_NAMES};

/// Heuristic weights; also used to rank explanation contributions.
const HEURISTIC_WEIGHTS: [(Feature, f64); 12] = [
    (Feature::TokenSetRatio, 0.25),
    (Feature::TokenSortRatio, 0.20),
    (Feature::JaroWinkler, 0.15),
    (Feature::Levenshtein, 0.10),
    (Feature::TrgmScore, 0.10),
    (Feature::VecScore, 0.05),
    (Feature::DmJaccard, 0.05),
    (Feature::TokenJaccard, 0.05),
    (Feature::InitialsMatch, 0.05),
    (Feature::IsAbbreviation, 0.10),
    (Feature::HasCommonVariation, 0.10),
    (Feature::ExactMatch, 1.0),
];

/// Isotonic calibration breakpoint: raw model output `x` maps to calibrated
/// probability `y`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalibrationPoint {
    pub x: f64,
    pub y: f64,
}

/// Learned scorer artifact: a calibrated linear classifier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LinearModel {
    pub feature_names: Vec<String>,
    pub weights: Vec<f64>,
    pub intercept: f64,
    #[serde(default)]
    pub calibration: Vec<CalibrationPoint>,
}

impl LinearModel {
    fn predict(&self, features: &FeatureVector) -> f64 {
        let z: f64 = self
            .weights
            .iter()
            .zip(features.values().iter())
            .map(|(w, v)| w * v)
            .sum::<f64>()
            + self.intercept;
        let raw = 1.0 / (1.0 + (-z).exp());
        self.calibrate(raw).clamp(0.0, 1.0)
    }

    /// Piecewise-linear interpolation over the calibration breakpoints;
    /// identity when none were trained.
    fn calibrate(&self, raw: f64) -> f64 {
        if self.calibration.is_empty() {
            return raw;
        }
        let first = &self.calibration[0];
        if raw <= first.x {
            return first.y;
        }
        for pair in self.calibration.windows(2) {
            let (lo, hi) = (&pair[0], &pair[1]);
            if raw <= hi.x {
                let span = hi.x - lo.x;
                if span <= 0.0 {
                    return hi.y;
                }
                let t = (raw - lo.x) / span;
                return lo.y + t * (hi.y - lo.y);
            }
        }
        self.calibration[self.calibration.len() - 1].y
    }
}

/// Scorer implementation selected at startup.
pub enum Scorer {
    Heuristic,
    Learned(LinearModel),
}

impl Scorer {
    /// Load the learned artifact when present and schema-compatible;
    /// otherwise fall back to the heuristic.
    pub fn load(path: &Path) -> Self {
        let raw = match std::fs::read_to_string(path) {
            Ok(raw) => raw,
            Err(_) => {
                info!(path = %path.display(), "no scorer artifact; using heuristic scorer");
                return Self::Heuristic;
            }
        };

        let model: LinearModel = match serde_json::from_str(&raw) {
            Ok(model) => model,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "unreadable scorer artifact; using heuristic");
                return Self::Heuristic;
            }
        };

        let schema_matches = model.feature_names.len() == FEATURE_NAMES.len()
            && model
                .feature_names
                .iter()
                .zip(FEATURE_NAMES.iter())
                .all(|(a, b)| a.as_str() == *b);
        if !schema_matches || model.weights.len() != FEATURE_NAMES.len() {
            warn!(
                path = %path.display(),
                "scorer artifact feature schema mismatch; using heuristic"
            );
            return Self::Heuristic;
        }

        info!(path = %path.display(), "loaded learned scorer artifact");
        Self::Learned(model)
    }

    pub fn is_learned(&self) -> bool {
        matches!(self, Self::Learned(_))
    }

    /// Calibrated match probability in `[0, 1]`.
    pub fn score(&self, features: &FeatureVector) -> f64 {
        match self {
            Self::Learned(model) => model.predict(features),
            Self::Heuristic => heuristic_score(features),
        }
    }

    /// The `top_n` largest weighted contributions, for logging and review
    /// payloads. Contribution is `weight · value` of the underlying term.
    pub fn explain(&self, features: &FeatureVector, top_n: usize) -> Vec<(String, f64)> {
        let mut contributions: Vec<(String, f64)> = match self {
            Self::Learned(model) => model
                .weights
                .iter()
                .zip(FEATURE_NAMES.iter())
                .zip(features.values().iter())
                .map(|((weight, name), value)| ((*name).to_string(), weight * value))
                .filter(|(_, contribution)| *contribution > 0.0)
                .collect(),
            Self::Heuristic => HEURISTIC_WEIGHTS
                .iter()
                .map(|(feature, weight)| {
                    (feature.name().to_string(), weight * features.get(*feature))
                })
                .filter(|(_, contribution)| *contribution > 0.0)
                .collect(),
        };
        contributions.sort_by(|a, b| b.1.total_cmp(&a.1));
        contributions.truncate(top_n);
        contributions
    }
}

fn heuristic_score(features: &FeatureVector) -> f64 {
    // Exact canonical match is as certain as the heuristic gets.
    if features.get(Feature::ExactMatch) == 1.0 {
        return 0.99;
    }

    let mut score = 0.25 * features.get(Feature::TokenSetRatio)
        + 0.20 * features.get(Feature::TokenSortRatio)
        + 0.15 * features.get(Feature::JaroWinkler)
        + 0.10 * features.get(Feature::Levenshtein)
        + 0.10 * features.get(Feature::TrgmScore)
        + 0.05 * features.get(Feature::VecScore)
        + 0.05 * features.get(Feature::DmJaccard)
        + 0.05 * features.get(Feature::TokenJaccard);

    if features.get(Feature::InitialsMatch) == 1.0 {
        score += 0.05;
    }
    if features.get(Feature::IsAbbreviation) == 1.0 {
        score += 0.10;
    }
    if features.get(Feature::HasCommonVariation) == 1.0 {
        score += 0.10;
    }

    // Damp long-vs-short comparisons.
    if features.get(Feature::LenRatio) < 0.5 {
        score *= 0.8;
    }

    score.clamp(0.0, 1.0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::canonicalize::canonicalize;
    use crate::database::store::PayeeRecord;
    use crate::idf::IdfCache;
    use crate::matching::features::extract;
    use crate::matching::types::ViewScores;
    use std::io::Write;

    fn features_for(query: &str, candidate_name: &str, scores: ViewScores) -> FeatureVector {
        let q = canonicalize(query);
        let canon = canonicalize(candidate_name);
        let record = PayeeRecord {
            payee_id: 1,
            external_id: None,
            name_raw: candidate_name.to_string(),
            name_canon: canon.canon,
            name_tokens: canon.tokens,
            dm_codes: canon.dm_codes,
            address: None,
            city: None,
            state: None,
        };
        extract(query, &q, &record, &scores, &IdfCache::empty())
    }

    #[test]
    fn exact_match_short_circuits() {
        let features = features_for("Microsoft Corp", "Microsoft Corporation", ViewScores::default());
        let scorer = Scorer::Heuristic;
        assert_eq!(scorer.score(&features), 0.99);
    }

    #[test]
    fn probability_always_in_unit_interval() {
        let scorer = Scorer::Heuristic;
        for (q, c) in [
            ("Microsft", "Microsoft Corporation"),
            ("Unknown Widgets LLC", "Apple Inc"),
            ("HD Supply", "HD Supply Holdings Inc"),
            ("a", "completely different business name entirely"),
        ] {
            let p = scorer.score(&features_for(q, c, ViewScores::default()));
            assert!((0.0..=1.0).contains(&p), "{q} vs {c}: {p}");
        }
    }

    #[test]
    fn near_miss_lands_between_thresholds() {
        let scores = ViewScores {
            trgm: Some(0.6),
            dm: Some(1.0),
            ..Default::default()
        };
        let features = features_for("Microsft", "Microsoft Corporation", scores);
        let p = Scorer::Heuristic.score(&features);
        assert!(p >= 0.60 && p < 0.97, "expected review band, got {p}");
    }

    #[test]
    fn unrelated_names_score_low() {
        let features = features_for("Unknown Widgets", "FedEx Corporation", ViewScores::default());
        let p = Scorer::Heuristic.score(&features);
        assert!(p < 0.60, "expected below review threshold, got {p}");
    }

    #[test]
    fn length_damping_branch() {
        // One short token against a long multi-token name exercises the
        // len_ratio < 0.5 damping.
        let features = features_for("acme", "acme industrial holdings of northern california", ViewScores::default());
        assert!(features.get(Feature::LenRatio) < 0.5);
        let p = Scorer::Heuristic.score(&features);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn explain_orders_by_contribution() {
        let features = features_for("Microsft", "Microsoft Corporation", ViewScores::default());
        let top = Scorer::Heuristic.explain(&features, 3);
        assert!(top.len() <= 3 && !top.is_empty());
        for pair in top.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn artifact_with_matching_schema_loads() {
        let model = LinearModel {
            feature_names: FEATURE_NAMES.iter().map(|s| s.to_string()).collect(),
            weights: vec![0.1; FEATURE_NAMES.len()],
            intercept: -1.0,
            calibration: vec![
                CalibrationPoint { x: 0.0, y: 0.0 },
                CalibrationPoint { x: 1.0, y: 1.0 },
            ],
        };
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(serde_json::to_string(&model).expect("serialize").as_bytes())
            .expect("write artifact");

        let scorer = Scorer::load(file.path());
        assert!(scorer.is_learned());

        let features = features_for("Microsoft", "Microsoft Corporation", ViewScores::default());
        let p = scorer.score(&features);
        assert!((0.0..=1.0).contains(&p));
    }

    #[test]
    fn artifact_schema_mismatch_falls_back_to_heuristic() {
        let model = LinearModel {
            feature_names: vec!["bogus_feature".to_string()],
            weights: vec![1.0],
            intercept: 0.0,
            calibration: vec![],
        };
        let mut file = tempfile::NamedTempFile::new().expect("temp file");
        file.write_all(serde_json::to_string(&model).expect("serialize").as_bytes())
            .expect("write artifact");

        let scorer = Scorer::load(file.path());
        assert!(!scorer.is_learned());
    }

    #[test]
    fn missing_artifact_uses_heuristic() {
        let scorer = Scorer::load(Path::new("/nonexistent/model.json"));
        assert!(!scorer.is_learned());
    }
}
