//! Text-to-candidate extraction.
//!
//! A trigger match opens a span that runs to the end of the line, to the next
//! trigger that outweighs it, or to `max_span_chars`, whichever comes first.
//! A trigger of another category with equal weight also ends the span. Any
//! other trigger inside the span is part of its content. Spans that still overlap are resolved by weight: the heavier
//! match survives, ties go to the earlier table row and then the earlier position.

use std::ops::Range;

use regex::Regex;
use serde::{Deserialize, Serialize};
use tracery_types::NodeType;
use tracing::trace;

use crate::pattern::PatternTable;

/// File extensions recognized as artifact references.
const FILE_EXTENSIONS: &str = "py|rs|md|sh|json|toml|ya?ml|ts|js|sql|txt";

/// Extraction limits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractorConfig {
    /// Maximum characters of content captured after a trigger.
    pub max_span_chars: usize,
    /// Candidates with fewer characters than this are dropped.
    pub min_content_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self {
            max_span_chars: 280,
            min_content_chars: 3,
        }
    }
}

/// A typed entity proposed by the extractor.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Candidate {
    /// Node type the candidate would become.
    pub category: NodeType,
    /// Cleaned span text.
    pub content: String,
    /// Base weight of the rule that matched.
    pub confidence: f64,
    /// Label of the rule that matched.
    pub trigger: String,
    /// Byte range in the source text, trigger included.
    pub span: Range<usize>,
}

#[derive(Debug, Clone, Copy)]
struct RawMatch {
    row: usize,
    category: NodeType,
    trigger_start: usize,
    content_start: usize,
    weight: f64,
}

impl RawMatch {
    /// Whether a match starting at `other` ends this one's span.
    fn ended_by(&self, other: &RawMatch) -> bool {
        other.weight > self.weight
            || (other.weight == self.weight && other.category != self.category)
    }
}

/// Pattern-table driven extractor.
#[derive(Debug, Clone, Default)]
pub struct Extractor {
    table: PatternTable,
    config: ExtractorConfig,
}

impl Extractor {
    pub fn new(table: PatternTable, config: ExtractorConfig) -> Self {
        Self { table, config }
    }

    pub fn table(&self) -> &PatternTable {
        &self.table
    }

    pub fn config(&self) -> &ExtractorConfig {
        &self.config
    }

    /// Extract candidates from `text`, in text order.
    ///
    /// Never fails: empty or unmatched input yields an empty list.
    pub fn extract(&self, text: &str) -> Vec<Candidate> {
        if text.trim().is_empty() || self.table.is_empty() {
            return Vec::new();
        }

        let mut matches: Vec<RawMatch> = self
            .table
            .compiled()
            .iter()
            .enumerate()
            .flat_map(|(row, compiled)| {
                compiled.regex.find_iter(text).map(move |m| RawMatch {
                    row,
                    category: compiled.rule.category,
                    trigger_start: m.start(),
                    content_start: m.end(),
                    weight: compiled.rule.weight,
                })
            })
            .collect();
        matches.sort_by_key(|m| (m.trigger_start, m.row));

        let mut spans: Vec<(RawMatch, Candidate)> = Vec::new();
        for m in matches.iter() {
            let absorbed = spans.iter().any(|(outer, c)| {
                (outer.content_start..c.span.end).contains(&m.trigger_start)
                    && !outer.ended_by(m)
            });
            if absorbed {
                continue;
            }

            let end = self.span_end(text, m, &matches);
            let content = clean_content(&text[m.content_start..end]);
            if content.chars().count() < self.config.min_content_chars.max(1) {
                continue;
            }
            let rule = &self.table.compiled()[m.row].rule;
            let candidate = Candidate {
                category: rule.category,
                content,
                confidence: rule.weight,
                trigger: rule.label.clone(),
                span: m.trigger_start..end,
            };
            spans.push((*m, candidate));
        }

        let mut candidates = resolve_overlaps(spans);
        candidates.sort_by_key(|c| c.span.start);

        trace!(count = candidates.len(), "Extracted candidates");
        candidates
    }

    fn span_end(&self, text: &str, current: &RawMatch, all: &[RawMatch]) -> usize {
        let start = current.content_start;
        let rest = &text[start..];

        let line_end = rest.find(['\n', '\r']).map_or(text.len(), |i| start + i);

        let limit_end = rest
            .char_indices()
            .nth(self.config.max_span_chars)
            .map_or(text.len(), |(i, _)| start + i);

        let next_trigger = all
            .iter()
            .filter(|m| m.trigger_start >= start && current.ended_by(m))
            .map(|m| m.trigger_start)
            .min()
            .unwrap_or(text.len());

        line_end.min(limit_end).min(next_trigger)
    }
}

/// Keep the heaviest of each group of overlapping spans.
fn resolve_overlaps(mut spans: Vec<(RawMatch, Candidate)>) -> Vec<Candidate> {
    spans.sort_by(|(a, _), (b, _)| {
        b.weight
            .total_cmp(&a.weight)
            .then(a.row.cmp(&b.row))
            .then(a.trigger_start.cmp(&b.trigger_start))
    });

    let mut kept: Vec<Candidate> = Vec::new();
    for (_, candidate) in spans {
        let overlaps = kept
            .iter()
            .any(|k| candidate.span.start < k.span.end && k.span.start < candidate.span.end);
        if !overlaps {
            kept.push(candidate);
        }
    }
    kept
}

fn clean_content(raw: &str) -> String {
    raw.trim_start_matches(|c: char| c.is_whitespace() || matches!(c, ':' | '-' | '–' | '—'))
        .trim_end_matches(|c: char| {
            c.is_whitespace() || matches!(c, '.' | ',' | ';' | ':' | '-' | '–' | '—')
        })
        .split_whitespace()
        .collect::<Vec<_>>()
        .join(" ")
}

/// Path-like tokens with a known source/document extension, first-seen order.
pub fn extract_file_references(text: &str) -> Vec<String> {
    let pattern = format!(
        r"(?:[A-Za-z0-9_.\-]+/)*[A-Za-z0-9_\-]+\.(?:{})\b",
        FILE_EXTENSIONS
    );
    let Ok(re) = Regex::new(&pattern) else {
        return Vec::new();
    };

    let mut found: Vec<String> = Vec::new();
    for m in re.find_iter(text) {
        let path = m.as_str().to_string();
        if !found.contains(&path) {
            found.push(path);
        }
    }
    found
}
