//! Importance scoring for extracted candidates.
//!
//! The score is a ranking signal. It never filters: every candidate the
//! extractor produces is scored and passed on.

use serde::{Deserialize, Serialize};

use crate::extractor::Candidate;

const STRONG_KEYWORDS: [&str; 8] = [
    "critical",
    "key",
    "strategic",
    "important",
    "breakthrough",
    "discovery",
    "decided",
    "must",
];

const MEDIUM_KEYWORDS: [&str; 7] = [
    "finding",
    "insight",
    "recommendation",
    "note",
    "learning",
    "because",
    "should",
];

const STRONG_KEYWORD_VALUE: f64 = 0.3;
const MEDIUM_KEYWORD_VALUE: f64 = 0.1;

/// Weights of the scoring formula.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImportanceWeights {
    pub keyword_weight: f64,
    pub length_weight: f64,
    pub category_weight: f64,
    pub completion_boost: f64,
    pub file_reference_boost: f64,
    /// Content length (chars) at which the length factor saturates.
    pub length_saturation: usize,
}

impl Default for ImportanceWeights {
    fn default() -> Self {
        Self {
            keyword_weight: 0.4,
            length_weight: 0.2,
            category_weight: 0.3,
            completion_boost: 0.1,
            file_reference_boost: 0.05,
            length_saturation: 200,
        }
    }
}

/// Context signals that are not part of the candidate text.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScoringSignals {
    pub has_file_references: bool,
    pub from_completion_event: bool,
}

impl ScoringSignals {
    pub fn new(has_file_references: bool, from_completion_event: bool) -> Self {
        Self {
            has_file_references,
            from_completion_event,
        }
    }
}

/// Weighted keyword/length/category scorer.
#[derive(Debug, Clone, Default)]
pub struct ImportanceScorer {
    weights: ImportanceWeights,
}

impl ImportanceScorer {
    pub fn new(weights: ImportanceWeights) -> Self {
        Self { weights }
    }

    pub fn weights(&self) -> &ImportanceWeights {
        &self.weights
    }

    /// Score a candidate in [0, 1].
    pub fn score(&self, candidate: &Candidate, signals: &ScoringSignals) -> f64 {
        let w = &self.weights;

        let mut score = w.keyword_weight * keyword_strength(&candidate.content)
            + w.length_weight * self.length_factor(&candidate.content)
            + w.category_weight * candidate.confidence;

        if signals.from_completion_event {
            score += w.completion_boost;
        }
        if signals.has_file_references {
            score += w.file_reference_boost;
        }

        if score.is_nan() {
            return 0.0;
        }
        score.clamp(0.0, 1.0)
    }

    fn length_factor(&self, content: &str) -> f64 {
        if self.weights.length_saturation == 0 {
            return 1.0;
        }
        let chars = content.chars().count() as f64;
        (chars / self.weights.length_saturation as f64).min(1.0)
    }
}

/// Sum of distinct keyword values present as whole words, capped at 1.
pub fn keyword_strength(content: &str) -> f64 {
    let lowered = content.to_lowercase();
    let words: Vec<&str> = lowered
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
        .collect();

    let present = |kw: &&&str| words.contains(*kw);
    let strong = STRONG_KEYWORDS.iter().filter(present).count() as f64;
    let medium = MEDIUM_KEYWORDS.iter().filter(present).count() as f64;

    (strong * STRONG_KEYWORD_VALUE + medium * MEDIUM_KEYWORD_VALUE).min(1.0)
}
