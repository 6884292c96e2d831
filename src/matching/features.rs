//! Feature construction for (query, candidate) pairs.
//!
//! Features live in fixed, lexicographically-ordered slots; the names exist
//! only as metadata for logging and explanations, so the hot path never
//! touches a map. The slot order is part of the contract with the scorer
//! (a learned artifact is only accepted when its name list matches).

use std::collections::{BTreeMap, HashSet};

use crate::canonicalize::{extract_initials, CanonicalName};
use crate::database::store::PayeeRecord;
use crate::idf::IdfCache;

use super::types::ViewScores;

/// Feature slots, in lexicographic name order.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(usize)]
pub enum Feature {
    DmJaccard = 0,
    DmOverlapCount,
    DmOverlapRatio,
    DmScore,
    ExactMatch,
    ExactMatchRaw,
    Hamming,
    HasCommonVariation,
    IdfOverlap,
    InitialsMatch,
    IsAbbreviation,
    JaroWinkler,
    LenDiffAbs,
    LenRatio,
    Levenshtein,
    NumSources,
    PartialRatio,
    PartialTokenRatio,
    Ratio,
    TokenCountDiff,
    TokenCountRatio,
    TokenJaccard,
    TokenOverlapCount,
    TokenOverlapRatio,
    TokenSetRatio,
    TokenSortRatio,
    TrgmScore,
    VecScore,
}

pub const FEATURE_COUNT: usize = 28;

/// Slot names, aligned with [`Feature`] discriminants.
pub const FEATURE_NAMES: [&str; FEATURE_COUNT] = [
    "dm_jaccard",
    "dm_overlap_count",
    "dm_overlap_ratio",
    "dm_score",
    "exact_match",
    "exact_match_raw",
    "hamming",
    "has_common_variation",
    "idf_overlap",
    "initials_match",
    "is_abbreviation",
    "jaro_winkler",
    "len_diff_abs",
    "len_ratio",
    "levenshtein",
    "num_sources",
    "partial_ratio",
    "partial_token_ratio",
    "ratio",
    "token_count_diff",
    "token_count_ratio",
    "token_jaccard",
    "token_overlap_count",
    "token_overlap_ratio",
    "token_set_ratio",
    "token_sort_ratio",
    "trgm_score",
    "vec_score",
];

impl Feature {
    pub fn name(self) -> &'static str {
        FEATURE_NAMES[self as usize]
    }
}

/// Fixed-order feature vector for one (query, candidate) pair.
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureVector {
    values: [f64; FEATURE_COUNT],
}

impl FeatureVector {
    fn zeroed() -> Self {
        Self {
            values: [0.0; FEATURE_COUNT],
        }
    }

    pub fn get(&self, feature: Feature) -> f64 {
        self.values[feature as usize]
    }

    fn set(&mut self, feature: Feature, value: f64) {
        self.values[feature as usize] = value;
    }

    pub fn values(&self) -> &[f64; FEATURE_COUNT] {
        &self.values
    }

    /// Name → value map for responses and review payloads.
    pub fn to_map(&self) -> BTreeMap<String, f64> {
        FEATURE_NAMES
            .iter()
            .zip(self.values.iter())
            .map(|(name, value)| ((*name).to_string(), *value))
            .collect()
    }
}

/// Long↔short substitutions checked by `has_common_variation`.
const COMMON_VARIATIONS: [(&str, &str); 10] = [
    ("and", "&"),
    ("corporation", "corp"),
    ("incorporated", "inc"),
    ("limited", "ltd"),
    ("company", "co"),
    ("international", "intl"),
    ("national", "natl"),
    ("associates", "assoc"),
    ("management", "mgmt"),
    ("services", "svcs"),
];

/// Compute the full feature vector for one candidate.
pub fn extract(
    query_raw: &str,
    query: &CanonicalName,
    candidate: &PayeeRecord,
    scores: &ViewScores,
    idf: &IdfCache,
) -> FeatureVector {
    let mut features = FeatureVector::zeroed();

    let q_canon = query.canon.as_str();
    let c_canon = candidate.name_canon.as_str();

    // String similarities on canonical strings.
    features.set(Feature::Ratio, indel_ratio(q_canon, c_canon));
    features.set(Feature::PartialRatio, partial_ratio(q_canon, c_canon));
    features.set(Feature::TokenSortRatio, token_sort_ratio(q_canon, c_canon));
    features.set(Feature::TokenSetRatio, token_set_ratio(q_canon, c_canon));
    features.set(
        Feature::PartialTokenRatio,
        partial_token_ratio(q_canon, c_canon),
    );
    features.set(
        Feature::Levenshtein,
        strsim::normalized_levenshtein(q_canon, c_canon),
    );
    features.set(Feature::JaroWinkler, strsim::jaro_winkler(q_canon, c_canon));
    features.set(Feature::Hamming, hamming_similarity(q_canon, c_canon));

    // Candidate-view pass-throughs.
    features.set(Feature::TrgmScore, scores.trgm.unwrap_or(0.0));
    features.set(Feature::VecScore, scores.vec.unwrap_or(0.0));
    features.set(Feature::DmScore, scores.dm.unwrap_or(0.0));
    features.set(Feature::NumSources, scores.num_sources() as f64);

    // Phonetic set features over Double Metaphone codes.
    let q_dm: HashSet<&String> = query.dm_codes.iter().collect();
    let c_dm: HashSet<&String> = candidate.dm_codes.iter().collect();
    if !q_dm.is_empty() && !c_dm.is_empty() {
        let intersection = q_dm.intersection(&c_dm).count() as f64;
        let union = q_dm.union(&c_dm).count() as f64;
        features.set(
            Feature::DmJaccard,
            if union > 0.0 { intersection / union } else { 0.0 },
        );
        features.set(Feature::DmOverlapCount, intersection);
        features.set(Feature::DmOverlapRatio, intersection / q_dm.len() as f64);
    }

    // Token-set features.
    let q_tokens: HashSet<&String> = query.tokens.iter().collect();
    let c_tokens: HashSet<&String> = candidate.name_tokens.iter().collect();
    if !q_tokens.is_empty() && !c_tokens.is_empty() {
        let intersection = q_tokens.intersection(&c_tokens).count() as f64;
        let union = q_tokens.union(&c_tokens).count() as f64;
        features.set(
            Feature::TokenJaccard,
            if union > 0.0 { intersection / union } else { 0.0 },
        );
        features.set(Feature::TokenOverlapCount, intersection);
        features.set(
            Feature::TokenOverlapRatio,
            intersection / q_tokens.len() as f64,
        );
    }

    // Length features.
    let q_len = q_canon.chars().count() as f64;
    let c_len = c_canon.chars().count() as f64;
    features.set(Feature::LenDiffAbs, (q_len - c_len).abs());
    features.set(Feature::LenRatio, q_len.min(c_len) / q_len.max(c_len).max(1.0));
    let q_count = query.tokens.len() as f64;
    let c_count = candidate.name_tokens.len() as f64;
    features.set(Feature::TokenCountDiff, (q_count - c_count).abs());
    features.set(
        Feature::TokenCountRatio,
        q_count.min(c_count) / q_count.max(c_count).max(1.0),
    );

    // IDF-weighted overlap.
    features.set(
        Feature::IdfOverlap,
        idf.overlap_ratio(&query.tokens, &candidate.name_tokens),
    );

    // Special cases.
    let q_initials = extract_initials(&query.tokens);
    let c_initials = extract_initials(&candidate.name_tokens);
    features.set(
        Feature::InitialsMatch,
        if q_initials == c_initials { 1.0 } else { 0.0 },
    );
    features.set(Feature::IsAbbreviation, is_abbreviation(q_canon, c_canon));
    features.set(
        Feature::HasCommonVariation,
        has_common_variation(q_canon, c_canon),
    );

    // Exact-match features.
    features.set(
        Feature::ExactMatch,
        if q_canon == c_canon { 1.0 } else { 0.0 },
    );
    let raw_equal = query_raw.trim().to_lowercase() == candidate.name_raw.trim().to_lowercase();
    features.set(Feature::ExactMatchRaw, if raw_equal { 1.0 } else { 0.0 });

    features
}

// ---------------------------------------------------------------------------
// Fuzzy-ratio family, composed from alignment primitives.
// ---------------------------------------------------------------------------

fn lcs_length(a: &[char], b: &[char]) -> usize {
    if a.is_empty() || b.is_empty() {
        return 0;
    }
    let mut previous = vec![0usize; b.len() + 1];
    let mut current = vec![0usize; b.len() + 1];
    for ca in a {
        for (j, cb) in b.iter().enumerate() {
            current[j + 1] = if ca == cb {
                previous[j] + 1
            } else {
                previous[j + 1].max(current[j])
            };
        }
        std::mem::swap(&mut previous, &mut current);
    }
    previous[b.len()]
}

/// Indel similarity: `1 - (insertions + deletions) / (|a| + |b|)`.
pub(crate) fn indel_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let lcs = lcs_length(&a_chars, &b_chars) as f64;
    let total = (a_chars.len() + b_chars.len()) as f64;
    (2.0 * lcs) / total
}

/// Best indel similarity of the shorter string against every equal-length
/// window of the longer string.
pub(crate) fn partial_ratio(a: &str, b: &str) -> f64 {
    if a.is_empty() && b.is_empty() {
        return 1.0;
    }
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let (shorter, longer) = if a_chars.len() <= b_chars.len() {
        (&a_chars, &b_chars)
    } else {
        (&b_chars, &a_chars)
    };

    let short: String = shorter.iter().collect();
    longer
        .windows(shorter.len())
        .map(|window| {
            let slice: String = window.iter().collect();
            indel_ratio(&short, &slice)
        })
        .fold(0.0, f64::max)
}

fn sorted_token_join(text: &str) -> String {
    let mut tokens: Vec<&str> = text.split_whitespace().collect();
    tokens.sort_unstable();
    tokens.join(" ")
}

pub(crate) fn token_sort_ratio(a: &str, b: &str) -> f64 {
    indel_ratio(&sorted_token_join(a), &sorted_token_join(b))
}

pub(crate) fn partial_token_ratio(a: &str, b: &str) -> f64 {
    partial_ratio(&sorted_token_join(a), &sorted_token_join(b))
}

/// Token-set ratio: compare the shared-token core against each side's
/// remainder and take the best alignment.
pub(crate) fn token_set_ratio(a: &str, b: &str) -> f64 {
    let a_tokens: HashSet<&str> = a.split_whitespace().collect();
    let b_tokens: HashSet<&str> = b.split_whitespace().collect();
    if a_tokens.is_empty() || b_tokens.is_empty() {
        return if a_tokens.is_empty() && b_tokens.is_empty() {
            1.0
        } else {
            0.0
        };
    }

    let mut shared: Vec<&str> = a_tokens.intersection(&b_tokens).copied().collect();
    let mut only_a: Vec<&str> = a_tokens.difference(&b_tokens).copied().collect();
    let mut only_b: Vec<&str> = b_tokens.difference(&a_tokens).copied().collect();
    shared.sort_unstable();
    only_a.sort_unstable();
    only_b.sort_unstable();

    let base = shared.join(" ");
    let with_a = join_nonempty(&base, &only_a.join(" "));
    let with_b = join_nonempty(&base, &only_b.join(" "));

    indel_ratio(&base, &with_a)
        .max(indel_ratio(&base, &with_b))
        .max(indel_ratio(&with_a, &with_b))
}

fn join_nonempty(base: &str, rest: &str) -> String {
    match (base.is_empty(), rest.is_empty()) {
        (true, _) => rest.to_string(),
        (_, true) => base.to_string(),
        _ => format!("{base} {rest}"),
    }
}

/// Hamming similarity with length-difference padding counted as mismatches.
pub(crate) fn hamming_similarity(a: &str, b: &str) -> f64 {
    let a_chars: Vec<char> = a.chars().collect();
    let b_chars: Vec<char> = b.chars().collect();
    let max_len = a_chars.len().max(b_chars.len());
    if max_len == 0 {
        return 1.0;
    }
    let mismatches = a_chars
        .iter()
        .zip(b_chars.iter())
        .filter(|(x, y)| x != y)
        .count()
        + a_chars.len().abs_diff(b_chars.len());
    1.0 - mismatches as f64 / max_len as f64
}

/// 1.0 when the shorter canonical string is strictly less than half the
/// longer's length and is a subsequence of it (ignoring its own spaces).
pub(crate) fn is_abbreviation(a: &str, b: &str) -> f64 {
    let a_len = a.chars().count();
    let b_len = b.chars().count();
    if a_len == b_len {
        return 0.0;
    }
    let (shorter, longer, short_len, long_len) = if a_len < b_len {
        (a, b, a_len, b_len)
    } else {
        (b, a, b_len, a_len)
    };

    if 2 * short_len >= long_len {
        return 0.0;
    }

    let mut longer_chars = longer.chars();
    for c in shorter.chars().filter(|c| *c != ' ') {
        if !longer_chars.any(|lc| lc == c) {
            return 0.0;
        }
    }
    1.0
}

/// 1.0 when substituting any single long↔short business form makes the two
/// strings equal.
pub(crate) fn has_common_variation(a: &str, b: &str) -> f64 {
    let padded_a = format!(" {} ", a.to_lowercase());
    let padded_b = format!(" {} ", b.to_lowercase());

    for (long_form, short_form) in COMMON_VARIATIONS {
        let from = format!(" {long_form} ");
        let to = format!(" {short_form} ");
        let normalized_a = padded_a.replace(&from, &to);
        let normalized_b = padded_b.replace(&from, &to);
        if normalized_a.trim() == normalized_b.trim() {
            return 1.0;
        }
    }
    0.0
}
