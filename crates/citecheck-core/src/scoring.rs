//! Similarity scoring between a parsed citation and a candidate record.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::normalize::{normalize_title, surname_of};
use crate::{CandidateRecord, ConfigError, ParsedCitation};

/// Relative weights of the title, author and year sub-scores.
///
/// The combined score is a straight weighted sum and is never renormalized,
/// so weights summing to less than 1 cap the reachable score.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScoringWeights {
    pub title: f64,
    pub authors: f64,
    pub year: f64,
}

impl Default for ScoringWeights {
    fn default() -> Self {
        Self {
            title: 0.6,
            authors: 0.3,
            year: 0.1,
        }
    }
}

impl ScoringWeights {
    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("title", self.title),
            ("authors", self.authors),
            ("year", self.year),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::InvalidWeight { field, value });
            }
        }
        let sum = self.sum();
        // Small tolerance so that 0.6 + 0.3 + 0.1 is accepted.
        if sum <= 0.0 || sum > 1.0 + 1e-9 {
            return Err(ConfigError::WeightSum(sum));
        }
        Ok(())
    }

    pub fn sum(&self) -> f64 {
        self.title + self.authors + self.year
    }
}

/// The three sub-scores behind a combined score, each in [0, 1].
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScoreBreakdown {
    pub title: f64,
    pub authors: f64,
    pub year: f64,
}

impl ScoreBreakdown {
    pub fn combine(&self, weights: &ScoringWeights) -> f64 {
        let total =
            weights.title * self.title + weights.authors * self.authors + weights.year * self.year;
        // Trim float noise so that a perfect match with default weights is exactly 1.0
        ((total * 1e9).round() / 1e9).clamp(0.0, 1.0)
    }

    /// True when the year sub-score contributed (used for tie-breaking).
    pub fn year_matched(&self) -> bool {
        self.year > 0.0
    }
}

/// Normalized indel similarity of two titles. 0 when either side is empty.
pub fn title_similarity(parsed: &str, candidate: &str) -> f64 {
    let a = normalize_title(parsed);
    let b = normalize_title(candidate);
    if a.is_empty() || b.is_empty() {
        return 0.0;
    }
    rapidfuzz::fuzz::ratio(a.chars(), b.chars()).clamp(0.0, 1.0)
}

/// Fraction of parsed surnames that also appear among the candidate's authors.
pub fn author_overlap(parsed: &[String], candidate: &[String]) -> f64 {
    let parsed: HashSet<String> = parsed
        .iter()
        .map(|a| surname_of(a))
        .filter(|s| !s.is_empty())
        .collect();
    if parsed.is_empty() {
        return 0.0;
    }
    let found: HashSet<String> = candidate
        .iter()
        .map(|a| surname_of(a))
        .filter(|s| !s.is_empty())
        .collect();
    parsed.intersection(&found).count() as f64 / parsed.len() as f64
}

/// 1 when both years are known and at most one apart (preprint vs. published).
pub fn year_agreement(parsed: Option<i32>, candidate: Option<i32>) -> f64 {
    match (parsed, candidate) {
        (Some(a), Some(b)) if (a - b).abs() <= 1 => 1.0,
        _ => 0.0,
    }
}

pub fn score_breakdown(citation: &ParsedCitation, candidate: &CandidateRecord) -> ScoreBreakdown {
    ScoreBreakdown {
        title: citation
            .title
            .as_deref()
            .map(|t| title_similarity(t, &candidate.title))
            .unwrap_or(0.0),
        authors: author_overlap(&citation.authors, &candidate.authors),
        year: year_agreement(citation.year, candidate.year),
    }
}

/// Weighted similarity in [0, 1]. Deterministic for identical inputs.
pub fn score(
    citation: &ParsedCitation,
    candidate: &CandidateRecord,
    weights: &ScoringWeights,
) -> f64 {
    score_breakdown(citation, candidate).combine(weights)
}
