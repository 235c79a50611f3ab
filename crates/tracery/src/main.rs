//! Tracery - decision provenance graph for conversational engineering work
//!
//! Main entry point for the Tracery CLI.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Parser, Subcommand};
use tracery_graph::BackendKind;

mod commands;

use commands::{archive, config, file, ingest, network, search, session, stats, trace};

// ─────────────────────────────────────────────────────────────────────────────
// CLI Structure
// ─────────────────────────────────────────────────────────────────────────────

/// Tracery - decision provenance graph for conversational engineering work
#[derive(Parser)]
#[command(name = "tracery")]
#[command(author, version, about, long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Output as JSON (for scripting)
    #[arg(long, global = true)]
    pub json: bool,

    /// Graph file (overrides [graph].path)
    #[arg(long, global = true, env = "TRACERY_DB")]
    pub db: Option<PathBuf>,

    /// Storage backend: native or sqlite (overrides [graph].backend)
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    /// User config directory (default: platform config dir)
    #[arg(long, global = true, env = "TRACERY_CONFIG_DIR")]
    pub config_dir: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract knowledge from conversation text into the graph
    Ingest(ingest::IngestArgs),

    /// Trace why a decision was made and what it affected
    Trace(trace::TraceArgs),

    /// Search nodes by keyword
    Search(search::SearchArgs),

    /// Show graph statistics
    Stats(stats::StatsArgs),

    /// List what was discussed in a session
    Session(session::SessionArgs),

    /// Show the modification history of a file
    File(file::FileArgs),

    /// Show the neighborhood of a node
    Network(network::NetworkArgs),

    /// Archive a node so it no longer appears in search
    Archive(archive::ArchiveArgs),

    /// Configuration management
    Config(config::ConfigArgs),
}

// ─────────────────────────────────────────────────────────────────────────────
// Main
// ─────────────────────────────────────────────────────────────────────────────

fn main() -> Result<()> {
    let cli = Cli::parse();

    let loaded = tracery_config::load_config_with_options(None, cli.config_dir.as_deref())?;
    let config_dir = cli
        .config_dir
        .clone()
        .or_else(tracery_config::user_config_dir)
        .unwrap_or_else(|| PathBuf::from("."));

    let _log_guard = init_logging(&loaded.config.logging_config(), &config_dir, cli.verbose);
    for warning in &loaded.warnings {
        tracing::warn!("{}", warning);
    }

    let ctx = commands::Context {
        json_output: cli.json,
        verbose: cli.verbose,
        db: cli.db,
        backend: cli.backend,
        config_dir,
        loaded,
    };

    match cli.command {
        Commands::Ingest(args) => ingest::run(args, &ctx),
        Commands::Trace(args) => trace::run(args, &ctx),
        Commands::Search(args) => search::run(args, &ctx),
        Commands::Stats(args) => stats::run(args, &ctx),
        Commands::Session(args) => session::run(args, &ctx),
        Commands::File(args) => file::run(args, &ctx),
        Commands::Network(args) => network::run(args, &ctx),
        Commands::Archive(args) => archive::run(args, &ctx),
        Commands::Config(args) => config::run(args, &ctx),
    }
}

/// Console layer on stderr plus an optional daily-rolling JSON file.
///
/// The returned guard flushes the file writer when dropped.
fn init_logging(
    logging: &tracery_config::LoggingConfig,
    config_dir: &std::path::Path,
    verbose: bool,
) -> Option<tracing_appender::non_blocking::WorkerGuard> {
    use tracing_subscriber::prelude::*;
    use tracing_subscriber::{EnvFilter, fmt};

    let default_filter = if verbose {
        "tracery=debug,tracery_graph=debug,tracery_extract=debug,tracery_config=debug,info"
            .to_string()
    } else {
        logging.level.clone()
    };
    let console_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(&default_filter));

    let console = if logging.json {
        fmt::layer()
            .json()
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    } else {
        fmt::layer()
            .with_target(true)
            .with_writer(std::io::stderr)
            .with_filter(console_filter)
            .boxed()
    };

    let (file_layer, guard) = if logging.file {
        let log_dir = logging
            .directory
            .clone()
            .unwrap_or_else(|| config_dir.join("logs"));
        let appender = tracing_appender::rolling::daily(&log_dir, "tracery.log");
        let (writer, guard) = tracing_appender::non_blocking(appender);
        let layer = fmt::layer()
            .json()
            .with_writer(writer)
            .with_filter(EnvFilter::new(
                "tracery=trace,tracery_graph=debug,tracery_extract=debug,tracery_config=debug,info",
            ))
            .boxed();
        (Some(layer), Some(guard))
    } else {
        (None, None)
    };

    tracing_subscriber::registry()
        .with(console)
        .with(file_layer)
        .init();
    guard
}
