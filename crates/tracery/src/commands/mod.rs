//! CLI command handlers.

pub mod archive;
pub mod config;
pub mod file;
pub mod ingest;
pub mod network;
pub mod search;
pub mod session;
pub mod stats;
pub mod trace;

use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result};
use console::{Style, style};
use tracery_config::LoadedConfig;
use tracery_graph::{BackendKind, GraphStore, QueryEngine};
use tracery_types::NodeRecord;
use tracing::debug;

/// Shared context for all commands.
#[derive(Debug, Clone)]
pub struct Context {
    /// Output as JSON for scripting.
    pub json_output: bool,
    /// Verbose output enabled.
    pub verbose: bool,
    /// Graph file from `--db`.
    pub db: Option<PathBuf>,
    /// Backend from `--backend`.
    pub backend: Option<BackendKind>,
    /// Resolved user config directory.
    pub config_dir: PathBuf,
    /// Merged configuration and where it came from.
    pub loaded: LoadedConfig,
}

impl Context {
    /// Backend chosen by flag, else by config.
    pub fn backend_kind(&self) -> Result<BackendKind> {
        match self.backend {
            Some(kind) => Ok(kind),
            None => Ok(self.loaded.config.graph_section().backend_kind()?),
        }
    }

    /// Graph file: `--db`, then `[graph].path`, then a file in the config dir.
    pub fn graph_path(&self) -> Result<PathBuf> {
        if let Some(db) = &self.db {
            return Ok(db.clone());
        }
        if let Some(path) = self.loaded.config.graph_section().path {
            return Ok(path);
        }
        let file = match self.backend_kind()? {
            BackendKind::Native => "graph.json",
            BackendKind::Sqlite => "graph.db",
        };
        Ok(self.config_dir.join(file))
    }

    /// Open the configured graph store, creating its directory if needed.
    pub fn open_store(&self) -> Result<GraphStore> {
        let kind = self.backend_kind()?;
        let path = self.graph_path()?;
        ensure_parent(&path)?;

        debug!(path = %path.display(), backend = %kind, "Opening graph");

        let store = GraphStore::open(kind, Some(&path))
            .with_context(|| format!("failed to open graph at {}", path.display()))?;
        Ok(store.with_timeout(self.loaded.config.graph_section().timeout()))
    }

    /// Query engine over the configured store.
    pub fn query_engine(&self) -> Result<QueryEngine> {
        Ok(QueryEngine::with_config(
            self.open_store()?,
            self.loaded.config.query_config(),
        ))
    }
}

fn ensure_parent(path: &Path) -> Result<()> {
    if let Some(parent) = path.parent()
        && !parent.as_os_str().is_empty()
    {
        std::fs::create_dir_all(parent)
            .with_context(|| format!("failed to create {}", parent.display()))?;
    }
    Ok(())
}

// ─────────────────────────────────────────────────────────────────────────────
// Output helpers
// ─────────────────────────────────────────────────────────────────────────────

/// Bold title over a dim rule.
pub fn print_header(title: &str) {
    let dim = Style::new().dim();
    println!("{}", style(title).bold());
    println!("{}", dim.apply_to("─".repeat(50)));
}

/// One numbered line per record, with its id and scores underneath.
pub fn print_records(records: &[NodeRecord], empty_message: &str) {
    let dim = Style::new().dim();
    if records.is_empty() {
        println!("{}", dim.apply_to(empty_message));
        return;
    }
    for (i, record) in records.iter().enumerate() {
        print_record(i + 1, record);
    }
}

pub fn print_record(index: usize, record: &NodeRecord) {
    let dim = Style::new().dim();
    println!(
        "{}. {} {}",
        style(index).cyan(),
        type_label(record),
        truncate(&record.content, 70)
    );
    println!(
        "   {}",
        dim.apply_to(format!(
            "{}  confidence {:.2}  importance {:.2}  {}",
            record.id,
            record.confidence,
            record.importance,
            record.created_at.format("%Y-%m-%d %H:%M")
        ))
    );
}

pub fn type_label(record: &NodeRecord) -> console::StyledObject<String> {
    let label = format!("[{}]", record.node_type);
    match record.node_type {
        tracery_types::NodeType::Decision => style(label).green(),
        tracery_types::NodeType::Insight => style(label).yellow(),
        tracery_types::NodeType::ActionItem => style(label).magenta(),
        _ => style(label).dim(),
    }
}

/// Pretty JSON on stdout.
pub fn print_json<T: serde::Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

/// Shorten to `max` characters with an ellipsis, on one line.
pub fn truncate(s: &str, max: usize) -> String {
    let flat: String = s
        .chars()
        .map(|c| if c.is_whitespace() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max {
        flat
    } else {
        let cut: String = flat.chars().take(max.saturating_sub(3)).collect();
        format!("{}...", cut)
    }
}
