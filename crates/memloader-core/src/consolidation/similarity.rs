//! Text similarity predicates used to detect near-duplicate memories.
//!
//! Predicates score comparison-normalized text (see [`normalize_text`]).
//! Scores are symmetric and lie in [0.0, 1.0]; identical text always
//! scores 1.0.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

/// Normalize text for comparison.
///
/// Case-folds, collapses whitespace and strips surrounding punctuation.
pub fn normalize_text(content: &str) -> String {
    let collapsed = content.split_whitespace().collect::<Vec<_>>().join(" ");
    collapsed
        .trim_matches(|c: char| "\"'.,;:!?".contains(c))
        .trim()
        .to_lowercase()
}

/// A symmetric similarity measure over normalized text.
///
/// `prepare` is called once per candidate so pairwise comparison stays
/// cheap over thousands of candidates.
pub trait SimilarityPredicate {
    /// Precomputed per-text representation.
    type Prepared;

    /// Build the representation for a normalized text.
    fn prepare(&self, normalized: &str) -> Self::Prepared;

    /// Similarity in [0.0, 1.0]. Must be symmetric.
    fn similarity(&self, a: &Self::Prepared, b: &Self::Prepared) -> f64;
}

/// Which built-in predicate to use.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SimilarityKind {
    /// Word-set Jaccard similarity.
    #[default]
    Jaccard,
    /// Sørensen-Dice over character bigrams.
    Bigram,
    /// Only identical normalized text matches.
    Exact,
}

impl std::fmt::Display for SimilarityKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SimilarityKind::Jaccard => write!(f, "jaccard"),
            SimilarityKind::Bigram => write!(f, "bigram"),
            SimilarityKind::Exact => write!(f, "exact"),
        }
    }
}

impl std::str::FromStr for SimilarityKind {
    type Err = String;
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "jaccard" => Ok(SimilarityKind::Jaccard),
            "bigram" => Ok(SimilarityKind::Bigram),
            "exact" => Ok(SimilarityKind::Exact),
            _ => Err(format!("Invalid similarity kind: {}", s)),
        }
    }
}

/// Word overlap: |A ∩ B| / |A ∪ B| over whitespace-separated words.
#[derive(Debug, Clone, Copy, Default)]
pub struct TokenJaccard;

impl SimilarityPredicate for TokenJaccard {
    type Prepared = (String, HashSet<String>);

    fn prepare(&self, normalized: &str) -> Self::Prepared {
        let words = normalized.split_whitespace().map(str::to_string).collect();
        (normalized.to_string(), words)
    }

    fn similarity(&self, a: &Self::Prepared, b: &Self::Prepared) -> f64 {
        if a.0 == b.0 {
            return 1.0;
        }
        jaccard(&a.1, &b.1)
    }
}

/// Character bigram overlap, tolerant of small inflection changes.
#[derive(Debug, Clone, Copy, Default)]
pub struct CharacterBigrams;

impl SimilarityPredicate for CharacterBigrams {
    type Prepared = (String, Vec<(char, char)>);

    fn prepare(&self, normalized: &str) -> Self::Prepared {
        let chars: Vec<char> = normalized.chars().collect();
        let mut bigrams: Vec<(char, char)> = chars.windows(2).map(|w| (w[0], w[1])).collect();
        bigrams.sort_unstable();
        (normalized.to_string(), bigrams)
    }

    fn similarity(&self, a: &Self::Prepared, b: &Self::Prepared) -> f64 {
        if a.0 == b.0 {
            return 1.0;
        }
        let (x, y) = (&a.1, &b.1);
        if x.is_empty() || y.is_empty() {
            return 0.0;
        }

        // Multiset intersection over the sorted bigram lists
        let (mut i, mut j, mut shared) = (0, 0, 0usize);
        while i < x.len() && j < y.len() {
            match x[i].cmp(&y[j]) {
                std::cmp::Ordering::Less => i += 1,
                std::cmp::Ordering::Greater => j += 1,
                std::cmp::Ordering::Equal => {
                    shared += 1;
                    i += 1;
                    j += 1;
                }
            }
        }
        (2 * shared) as f64 / (x.len() + y.len()) as f64
    }
}

/// Exact match on normalized text.
#[derive(Debug, Clone, Copy, Default)]
pub struct ExactMatch;

impl SimilarityPredicate for ExactMatch {
    type Prepared = String;

    fn prepare(&self, normalized: &str) -> Self::Prepared {
        normalized.to_string()
    }

    fn similarity(&self, a: &Self::Prepared, b: &Self::Prepared) -> f64 {
        if a == b { 1.0 } else { 0.0 }
    }
}

fn jaccard(a: &HashSet<String>, b: &HashSet<String>) -> f64 {
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    let intersection = a.intersection(b).count();
    let union = a.len() + b.len() - intersection;
    intersection as f64 / union as f64
}
