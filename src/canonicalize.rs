//! Canonicalization rules for payee name normalization.
//!
//! The canonical form is the sorted-token string used as the primary matching
//! key. Word order is an unreliable signal for business names ("Acme
//! Plumbing" vs "Plumbing, Acme"), so tokens are sorted and all downstream
//! similarity is computed on the sorted form.

use once_cell::sync::Lazy;
use regex::Regex;
use rphonetic::DoubleMetaphone;
use std::collections::{BTreeSet, HashSet};
use unicode_normalization::char::is_combining_mark;
use unicode_normalization::UnicodeNormalization;

/// Generic filler words removed from canonical names.
static GENERIC_WORDS: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        "the",
        "of",
        "and",
        "group",
        "company",
        "services",
        "holdings",
        "solutions",
        "global",
        "international",
        "enterprises",
        "partners",
        "associates",
        "consulting",
    ]
    .into_iter()
    .collect()
});

/// Corporate-form suffix tokens, matched exact-token after punctuation has
/// been stripped. Covers US/UK, European, LatAm and APAC forms.
static CORPORATE_SUFFIXES: Lazy<HashSet<&'static str>> = Lazy::new(|| {
    [
        // US/UK
        "co",
        "inc",
        "incorporated",
        "llc",
        "llp",
        "ltd",
        "limited",
        "corp",
        "corporation",
        "plc",
        "lp",
        // European
        "gmbh",
        "bv",
        "nv",
        "sa",
        "ag",
        "oy",
        "kk",
        "srl",
        "spa",
        "pty",
        "kft",
        "aps",
        "ab",
        "as",
        "oyj",
        "bvba",
        "sarl",
        "eurl",
        "sas",
        "snc",
        // Other
        "limitada",
        "ltda",
        "sl",
        "cv",
    ]
    .into_iter()
    .collect()
});

/// Abbreviation expansions applied in order with word-boundary matching.
static ABBREVIATIONS: Lazy<Vec<(Regex, &'static str)>> = Lazy::new(|| {
    [
        ("intl", "international"),
        ("natl", "national"),
        ("assoc", "associates"),
        ("mgmt", "management"),
        ("svcs", "services"),
        ("grp", "group"),
        ("co", "company"),
        ("corp", "corporation"),
        ("inc", "incorporated"),
        ("ltd", "limited"),
    ]
    .into_iter()
    .map(|(abbr, full)| {
        let re = Regex::new(&format!(r"\b{abbr}\b")).expect("static abbreviation pattern");
        (re, full)
    })
    .collect()
});

/// Anything outside the canonical alphabet becomes a space. `&` survives so
/// that names like "AT&T" and "P&G" keep their shape.
static NON_CANON_CHARS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[^a-z0-9&\s]+").expect("static charset pattern"));

/// Dotted initials, e.g. "j.p." in "j.p. morgan". Collapsed to "jp" before
/// the charset strip turns the dots into token boundaries.
static DOTTED_INITIALS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b(?:[a-z]\.){2,}").expect("static initials pattern"));

/// Alphabetic stem with trailing digits ("company2"). Purely numeric tokens
/// and mixed shapes like "3m" or "b2b" do not match.
static ALPHA_TRAILING_DIGITS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[a-z]+[0-9]+$").expect("static stem pattern"));

/// Output of [`canonicalize`]: the canonical string, its sorted unique
/// tokens, and the Double Metaphone codes derived from those tokens.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CanonicalName {
    pub canon: String,
    pub tokens: Vec<String>,
    pub dm_codes: Vec<String>,
}

impl CanonicalName {
    fn empty() -> Self {
        Self {
            canon: String::new(),
            tokens: Vec::new(),
            dm_codes: Vec::new(),
        }
    }

    /// True when the input reduced to nothing (empty/whitespace input, or a
    /// name consisting entirely of filler and suffix tokens).
    pub fn is_empty(&self) -> bool {
        self.canon.is_empty()
    }
}

/// Canonicalize a payee name with deterministic rules. Pure; no I/O.
///
/// Steps, in order: trim + lowercase, NFKD diacritic fold, dotted-initials
/// collapse, charset strip (keeping `&`), abbreviation expansion,
/// tokenization, filler/suffix removal, trailing-digit strip, dedupe + sort,
/// Double Metaphone encoding.
pub fn canonicalize(name_raw: &str) -> CanonicalName {
    let trimmed = name_raw.trim();
    if trimmed.is_empty() {
        return CanonicalName::empty();
    }

    let lowered = trimmed.to_lowercase();
    let folded: String = lowered.nfkd().filter(|c| !is_combining_mark(*c)).collect();

    let collapsed = DOTTED_INITIALS
        .replace_all(&folded, |caps: &regex::Captures<'_>| {
            caps[0].replace('.', "")
        })
        .into_owned();

    let mut text = NON_CANON_CHARS.replace_all(&collapsed, " ").into_owned();
    for (re, full) in ABBREVIATIONS.iter() {
        text = re.replace_all(&text, *full).into_owned();
    }

    let mut tokens: BTreeSet<String> = BTreeSet::new();
    for raw_token in text.split_whitespace() {
        if GENERIC_WORDS.contains(raw_token) || CORPORATE_SUFFIXES.contains(raw_token) {
            continue;
        }
        let token = strip_trailing_digits(raw_token);
        if !token.is_empty() {
            tokens.insert(token);
        }
    }

    let tokens: Vec<String> = tokens.into_iter().collect();
    let canon = tokens.join(" ");
    let dm_codes = double_metaphone_codes(&tokens);

    CanonicalName {
        canon,
        tokens,
        dm_codes,
    }
}

/// Drop trailing digits from an alphabetic stem ("company2" → "company").
/// Purely numeric tokens are preserved.
fn strip_trailing_digits(token: &str) -> String {
    if ALPHA_TRAILING_DIGITS.is_match(token) {
        token
            .trim_end_matches(|c: char| c.is_ascii_digit())
            .to_string()
    } else {
        token.to_string()
    }
}

/// Unique, sorted Double Metaphone codes over a token list. Each token yields
/// up to two codes (primary + alternate); empty codes are dropped.
pub fn double_metaphone_codes(tokens: &[String]) -> Vec<String> {
    let encoder = DoubleMetaphone::default();
    let mut codes: BTreeSet<String> = BTreeSet::new();
    for token in tokens {
        let result = encoder.double_metaphone(token);
        let primary = result.primary();
        if !primary.is_empty() {
            codes.insert(primary.to_string());
        }
        let alternate = result.alternate();
        if !alternate.is_empty() {
            codes.insert(alternate.to_string());
        }
    }
    codes.into_iter().collect()
}

/// First letter of each token, uppercased. Tokens are expected sorted, so
/// initials compare commutatively across word-order variants.
pub fn extract_initials(tokens: &[String]) -> String {
    tokens
        .iter()
        .filter_map(|t| t.chars().next())
        .filter(|c| c.is_alphabetic())
        .flat_map(|c| c.to_uppercase())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_whitespace_fail_soft() {
        assert!(canonicalize("").is_empty());
        assert!(canonicalize("   \t ").is_empty());
        let out = canonicalize("");
        assert!(out.tokens.is_empty());
        assert!(out.dm_codes.is_empty());
    }

    #[test]
    fn idempotent() {
        for name in [
            "Microsoft Corporation",
            "The Home Depot, Inc.",
            "J.P. Morgan Chase & Co",
            "Café Crème GmbH",
        ] {
            let once = canonicalize(name);
            let twice = canonicalize(&once.canon);
            assert_eq!(once.canon, twice.canon, "canon not idempotent for {name}");
        }
    }

    #[test]
    fn permutation_invariant() {
        let a = canonicalize("Acme Plumbing");
        let b = canonicalize("Plumbing, Acme");
        assert_eq!(a.canon, b.canon);
        assert_eq!(a.tokens, b.tokens);
    }

    #[test]
    fn diacritics_fold() {
        assert_eq!(canonicalize("Café").canon, canonicalize("Cafe").canon);
        assert_eq!(canonicalize("Müller AG").canon, "muller");
    }

    #[test]
    fn ampersand_survives() {
        assert_eq!(canonicalize("AT&T").canon, "at&t");
        assert_eq!(canonicalize("P&G").canon, "p&g");
    }

    #[test]
    fn corporate_suffixes_removed() {
        assert_eq!(canonicalize("Microsoft Corporation").canon, "microsoft");
        assert_eq!(canonicalize("Microsoft Corp").canon, "microsoft");
        assert_eq!(canonicalize("Microsoft Inc").canon, "microsoft");
        assert_eq!(canonicalize("Home Depot Inc").canon, "depot home");
    }

    #[test]
    fn generic_words_removed() {
        assert_eq!(canonicalize("The Home Depot").canon, "depot home");
        assert_eq!(
            canonicalize("HD Supply Holdings Inc").canon,
            canonicalize("HD Supply").canon
        );
    }

    #[test]
    fn abbreviations_expand() {
        // "intl" expands, then "international" is removed as a filler word,
        // so both spellings land on the same canon.
        assert_eq!(
            canonicalize("Acme Intl").canon,
            canonicalize("Acme International").canon
        );
        assert_eq!(
            canonicalize("Apex Mgmt").canon,
            canonicalize("Apex Management").canon
        );
    }

    #[test]
    fn dotted_initials_collapse() {
        let out = canonicalize("J.P. Morgan");
        assert_eq!(out.canon, "jp morgan");
    }

    #[test]
    fn trailing_digits_on_alpha_stems() {
        assert_eq!(canonicalize("Company2 Widgets").canon, "company widgets");
        // Pure numbers are preserved.
        assert_eq!(canonicalize("Area 51").canon, "51 area");
        // Mixed shapes are not alpha-then-digit and keep their form.
        assert_eq!(canonicalize("3M").canon, "3m");
        assert_eq!(canonicalize("B2B Partners").canon, "b2b");
    }

    #[test]
    fn dm_codes_derived_from_tokens() {
        let out = canonicalize("Microsoft");
        assert!(!out.dm_codes.is_empty());
        // Sound-alike variants share codes.
        let typo = canonicalize("Microsft");
        assert!(out.dm_codes.iter().any(|c| typo.dm_codes.contains(c)));
    }

    #[test]
    fn initials_extraction() {
        let out = canonicalize("Home Depot");
        assert_eq!(extract_initials(&out.tokens), "DH");
    }
}
