//! Configuration types mapping to the TOML schema.
//!
//! ```toml
//! [graph]        # backend, file, timeout
//! [builder]      # relationship building
//! [query]        # trace depth, search size
//! [extract]      # span limits and extra trigger patterns
//! [importance]   # scoring weights
//! [logging]      # log level and log file
//! ```

use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracery_extract::{
    Extractor, ExtractorConfig, ImportanceScorer, ImportanceWeights, PatternRule, PatternTable,
    default_rules,
};
use tracery_graph::{BackendKind, BuilderConfig, DEFAULT_TIMEOUT, QueryConfig};
use tracery_types::NodeType;

use crate::error::{ConfigError, Result};

/// Upper bound on `builder.lookback_days` (about a century).
pub const MAX_LOOKBACK_DAYS: i64 = 36_500;

// ─────────────────────────────────────────────────────────────────────────────
// Top-level Config
// ─────────────────────────────────────────────────────────────────────────────

/// Root configuration structure.
///
/// All sections are optional so that partial configs (e.g., project-local
/// overrides) can be loaded and merged.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TraceryConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub graph: Option<GraphSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub builder: Option<BuilderConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub query: Option<QueryConfig>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub extract: Option<ExtractSection>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub importance: Option<ImportanceWeights>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub logging: Option<LoggingConfig>,
}

impl TraceryConfig {
    /// Create an empty config.
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse from a TOML string.
    pub fn from_toml(toml_str: &str) -> Result<Self> {
        Ok(toml::from_str(toml_str)?)
    }

    /// Serialize to a TOML string.
    pub fn to_toml(&self) -> Result<String> {
        Ok(toml::to_string_pretty(self)?)
    }

    /// Merge another config on top of this one (other takes priority).
    ///
    /// Sections are replaced whole, except that extra trigger patterns from
    /// both layers are kept.
    pub fn merge(&mut self, other: TraceryConfig) {
        if other.graph.is_some() {
            self.graph = other.graph;
        }
        if other.builder.is_some() {
            self.builder = other.builder;
        }
        if other.query.is_some() {
            self.query = other.query;
        }
        if let Some(mut extract) = other.extract {
            if let Some(previous) = self.extract.take() {
                let mut patterns = previous.patterns;
                patterns.append(&mut extract.patterns);
                extract.patterns = patterns;
            }
            self.extract = Some(extract);
        }
        if other.importance.is_some() {
            self.importance = other.importance;
        }
        if other.logging.is_some() {
            self.logging = other.logging;
        }
    }

    /// Check every value for range and syntax errors.
    pub fn validate(&self) -> Result<()> {
        let graph = self.graph_section();
        graph.backend_kind()?;
        if graph.timeout_ms == 0 {
            return Err(ConfigError::invalid("graph.timeout_ms", "must be greater than 0"));
        }

        let builder = self.builder_config();
        if !(0.0..=1.0).contains(&builder.similarity_threshold) {
            return Err(ConfigError::invalid(
                "builder.similarity_threshold",
                format!("{} is outside [0.0, 1.0]", builder.similarity_threshold),
            ));
        }
        if !(0..=MAX_LOOKBACK_DAYS).contains(&builder.lookback_days) {
            return Err(ConfigError::invalid(
                "builder.lookback_days",
                format!("{} is outside [0, {}]", builder.lookback_days, MAX_LOOKBACK_DAYS),
            ));
        }

        let query = self.query_config();
        if query.max_trace_depth == 0 {
            return Err(ConfigError::invalid("query.max_trace_depth", "must be at least 1"));
        }
        if query.search_limit == 0 {
            return Err(ConfigError::invalid("query.search_limit", "must be at least 1"));
        }

        if self.extract.as_ref().is_some_and(|e| e.limits.max_span_chars == 0) {
            return Err(ConfigError::invalid("extract.max_span_chars", "must be at least 1"));
        }
        if let Some(extract) = &self.extract
            && extract.replace_defaults
            && extract.patterns.is_empty()
        {
            return Err(ConfigError::invalid(
                "extract.patterns",
                "must not be empty when replace_defaults is set",
            ));
        }
        self.pattern_table()?;

        let weights = self.importance_weights();
        for (field, value) in [
            ("importance.keyword_weight", weights.keyword_weight),
            ("importance.length_weight", weights.length_weight),
            ("importance.category_weight", weights.category_weight),
            ("importance.completion_boost", weights.completion_boost),
            ("importance.file_reference_boost", weights.file_reference_boost),
        ] {
            if !value.is_finite() || value < 0.0 {
                return Err(ConfigError::invalid(field, format!("{} must be >= 0", value)));
            }
        }
        Ok(())
    }

    // ── Resolved sections ───────────────────────────────────────────────────

    pub fn graph_section(&self) -> GraphSection {
        self.graph.clone().unwrap_or_default()
    }

    pub fn builder_config(&self) -> BuilderConfig {
        self.builder.clone().unwrap_or_default()
    }

    pub fn query_config(&self) -> QueryConfig {
        self.query.clone().unwrap_or_default()
    }

    pub fn importance_weights(&self) -> ImportanceWeights {
        self.importance.clone().unwrap_or_default()
    }

    pub fn logging_config(&self) -> LoggingConfig {
        self.logging.clone().unwrap_or_default()
    }

    /// The built-in trigger table followed by any configured patterns, or
    /// only the configured patterns when `replace_defaults` is set.
    pub fn pattern_table(&self) -> Result<PatternTable> {
        let replace = self.extract.as_ref().is_some_and(|e| e.replace_defaults);
        let mut rules = if replace { Vec::new() } else { default_rules() };
        if let Some(extract) = &self.extract {
            for (i, pattern) in extract.patterns.iter().enumerate() {
                rules.push(pattern.to_rule(i)?);
            }
        }
        PatternTable::new(rules).map_err(|e| ConfigError::invalid("extract.patterns", e.to_string()))
    }

    /// An extractor built from the `[extract]` section.
    pub fn extractor(&self) -> Result<Extractor> {
        let limits = self
            .extract
            .as_ref()
            .map(|e| e.limits.clone())
            .unwrap_or_default();
        Ok(Extractor::new(self.pattern_table()?, limits))
    }

    pub fn scorer(&self) -> ImportanceScorer {
        ImportanceScorer::new(self.importance_weights())
    }

    /// A copy with every section present, defaults filled in.
    pub fn resolved(&self) -> TraceryConfig {
        TraceryConfig {
            graph: Some(self.graph_section()),
            builder: Some(self.builder_config()),
            query: Some(self.query_config()),
            extract: Some(self.extract.clone().unwrap_or_default()),
            importance: Some(self.importance_weights()),
            logging: Some(self.logging_config()),
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Graph
// ─────────────────────────────────────────────────────────────────────────────

/// Graph store configuration (`[graph]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct GraphSection {
    /// `"native"` or `"sqlite"`.
    pub backend: String,
    /// File for either backend; omitted keeps the graph in memory.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,
    /// Lock and transaction timeout.
    pub timeout_ms: u64,
}

impl Default for GraphSection {
    fn default() -> Self {
        Self {
            backend: "native".to_string(),
            path: None,
            timeout_ms: DEFAULT_TIMEOUT.as_millis() as u64,
        }
    }
}

impl GraphSection {
    pub fn backend_kind(&self) -> Result<BackendKind> {
        self.backend
            .parse()
            .map_err(|_| ConfigError::invalid("graph.backend", format!("unknown backend '{}'", self.backend)))
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Extraction
// ─────────────────────────────────────────────────────────────────────────────

/// Extraction configuration (`[extract]`).
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractSection {
    #[serde(flatten)]
    pub limits: ExtractorConfig,
    /// Use `patterns` as the whole trigger table, in the order given.
    pub replace_defaults: bool,
    /// Extra trigger patterns, appended after the built-in table.
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub patterns: Vec<PatternConfig>,
}

/// One `[[extract.patterns]]` entry.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PatternConfig {
    /// Node type name, e.g. `"decision"` or `"action_item"`.
    pub category: String,
    /// Trigger regex, matched case-insensitively.
    pub pattern: String,
    pub weight: f64,
    /// Label recorded on produced nodes; defaults to `custom_<n>`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub label: Option<String>,
}

impl PatternConfig {
    fn to_rule(&self, index: usize) -> Result<PatternRule> {
        let category = NodeType::parse(&self.category).ok_or_else(|| {
            ConfigError::invalid(
                "extract.patterns.category",
                format!("unknown category '{}'", self.category),
            )
        })?;
        if self.pattern.trim().is_empty() {
            return Err(ConfigError::invalid("extract.patterns.pattern", "must not be empty"));
        }
        let label = self
            .label
            .clone()
            .unwrap_or_else(|| format!("custom_{}", index));
        Ok(PatternRule::new(category, label, self.pattern.clone(), self.weight))
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Logging
// ─────────────────────────────────────────────────────────────────────────────

/// Logging configuration (`[logging]`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Default filter directive when `RUST_LOG` is unset.
    pub level: String,
    /// Emit JSON lines on stderr instead of text.
    pub json: bool,
    /// Write a daily-rolling JSON log file.
    pub file: bool,
    /// Directory for log files; defaults to `<config dir>/logs`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub directory: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "warn".to_string(),
            json: false,
            file: true,
            directory: None,
        }
    }
}

// ─────────────────────────────────────────────────────────────────────────────
// Tests
// ─────────────────────────────────────────────────────────────────────────────
