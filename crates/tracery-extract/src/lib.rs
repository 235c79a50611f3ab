//! Lexical extraction of knowledge candidates from conversational text.
//!
//! Everything in this crate is a pure function of its inputs: no storage,
//! no clocks, no randomness. Extraction and scoring of independent
//! conversations can therefore run on as many threads as the caller likes.
//!
//! ```text
//! raw text ──► Extractor (PatternTable) ──► Candidate ──► ImportanceScorer ──► score
//! ```
//!
//! # Usage
//!
//! ```
//! use tracery_extract::{Extractor, ImportanceScorer, ScoringSignals};
//!
//! let extractor = Extractor::default();
//! let candidates = extractor.extract("DECISION: use a 60-day lookback");
//! assert_eq!(candidates.len(), 1);
//!
//! let scorer = ImportanceScorer::default();
//! let score = scorer.score(&candidates[0], &ScoringSignals::default());
//! assert!((0.0..=1.0).contains(&score));
//! ```

pub mod error;
pub mod extractor;
pub mod importance;
pub mod pattern;

pub use error::{ExtractError, Result};
pub use extractor::{Candidate, Extractor, ExtractorConfig, extract_file_references};
pub use importance::{ImportanceScorer, ImportanceWeights, ScoringSignals};
pub use pattern::{PatternRule, PatternTable, default_rules};
