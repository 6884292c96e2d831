//! Corpus-wide token rarity, loaded once at startup.
//!
//! `idf(t) = ln(N / df(t))` over the registry token population. Tokens not
//! seen at build time contribute 0 rather than `ln N`, which keeps
//! IDF-weighted overlap well-bounded for novel query tokens.

use std::collections::{HashMap, HashSet};

/// Immutable IDF table owned by the pipeline. Rebuilding requires a full
/// reload from the registry.
#[derive(Debug, Clone, Default)]
pub struct IdfCache {
    idf: HashMap<String, f64>,
    documents: usize,
}

impl IdfCache {
    /// An empty cache; every token weighs 0.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Build from per-payee token lists.
    pub fn build<I>(corpus: I) -> Self
    where
        I: IntoIterator<Item = Vec<String>>,
    {
        let mut df: HashMap<String, usize> = HashMap::new();
        let mut documents = 0usize;

        for tokens in corpus {
            documents += 1;
            let unique: HashSet<&String> = tokens.iter().collect();
            for token in unique {
                *df.entry(token.clone()).or_insert(0) += 1;
            }
        }

        let idf = df
            .into_iter()
            .map(|(token, freq)| (token, (documents as f64 / freq as f64).ln()))
            .collect();

        Self { idf, documents }
    }

    /// IDF weight for a token; 0 when unseen.
    pub fn idf(&self, token: &str) -> f64 {
        self.idf.get(token).copied().unwrap_or(0.0)
    }

    /// `Σ idf(t) for t ∈ q∩c  /  Σ idf(t) for t ∈ q`, or 0 when the
    /// denominator is 0.
    pub fn overlap_ratio(&self, query_tokens: &[String], candidate_tokens: &[String]) -> f64 {
        let candidate: HashSet<&String> = candidate_tokens.iter().collect();

        let mut numerator = 0.0;
        let mut denominator = 0.0;
        for token in query_tokens {
            let weight = self.idf(token);
            denominator += weight;
            if candidate.contains(token) {
                numerator += weight;
            }
        }

        if denominator > 0.0 {
            numerator / denominator
        } else {
            0.0
        }
    }

    pub fn token_count(&self) -> usize {
        self.idf.len()
    }

    pub fn document_count(&self) -> usize {
        self.documents
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn corpus() -> Vec<Vec<String>> {
        vec![
            vec!["acme".into(), "widgets".into()],
            vec!["acme".into(), "plumbing".into()],
            vec!["apex".into(), "plumbing".into()],
            vec!["zenith".into(), "optics".into()],
        ]
    }

    #[test]
    fn rare_tokens_weigh_more() {
        let cache = IdfCache::build(corpus());
        assert!(cache.idf("zenith") > cache.idf("acme"));
        assert!(cache.idf("acme") > 0.0);
    }

    #[test]
    fn unseen_tokens_contribute_zero() {
        let cache = IdfCache::build(corpus());
        assert_eq!(cache.idf("unknown"), 0.0);

        // A query of entirely novel tokens has a zero denominator.
        let q = vec!["brand".to_string(), "new".to_string()];
        let c = vec!["brand".to_string()];
        assert_eq!(cache.overlap_ratio(&q, &c), 0.0);
    }

    #[test]
    fn overlap_ratio_bounds() {
        let cache = IdfCache::build(corpus());
        let q = vec!["acme".to_string(), "widgets".to_string()];
        assert_eq!(cache.overlap_ratio(&q, &q), 1.0);

        let partial = cache.overlap_ratio(&q, &["acme".to_string()]);
        assert!(partial > 0.0 && partial < 1.0);

        let none = cache.overlap_ratio(&q, &["zenith".to_string()]);
        assert_eq!(none, 0.0);
    }

    #[test]
    fn duplicate_tokens_count_once_per_document() {
        let cache = IdfCache::build(vec![
            vec!["acme".to_string(), "acme".to_string()],
            vec!["apex".to_string()],
        ]);
        // df("acme") is 1, not 2.
        assert_eq!(cache.idf("acme"), (2.0f64).ln());
    }
}
