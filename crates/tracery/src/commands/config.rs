//! Config command - configuration management.

use std::path::PathBuf;

use anyhow::Result;
use clap::{Args, Subcommand};
use console::{Style, style};

use super::{Context, print_json};

/// Arguments for the config command.
#[derive(Args, Debug)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub command: ConfigCommand,
}

#[derive(Subcommand, Debug)]
pub enum ConfigCommand {
    /// Show the resolved configuration
    Show,

    /// Show which config files are loaded and their precedence
    Which,

    /// Initialize a config file with defaults
    Init {
        /// Create project-local config (./tracery.toml) instead of user config
        #[arg(long)]
        local: bool,
    },

    /// Show configuration file path
    Path,

    /// Check a config file without using it
    Validate {
        /// File to check (default: the merged configuration)
        file: Option<PathBuf>,
    },
}

/// Run the config command.
pub fn run(args: ConfigArgs, ctx: &Context) -> Result<()> {
    match args.command {
        ConfigCommand::Show => cmd_show(ctx),
        ConfigCommand::Which => cmd_which(ctx),
        ConfigCommand::Init { local } => cmd_init(local, ctx),
        ConfigCommand::Path => cmd_path(ctx),
        ConfigCommand::Validate { file } => cmd_validate(file, ctx),
    }
}

fn cmd_show(ctx: &Context) -> Result<()> {
    let resolved = ctx.loaded.config.resolved();
    if ctx.json_output {
        return print_json(&resolved);
    }

    let dim = Style::new().dim();
    println!("{}", style("# Tracery Configuration").bold());
    println!();

    let sources = ctx.loaded.loaded_from();
    if sources.is_empty() {
        println!("{}", dim.apply_to("No config files loaded (using defaults)"));
    } else {
        println!("Config files:");
        for source in &sources {
            println!("  {}", source.display());
        }
    }
    println!("Graph file: {} ({})", ctx.graph_path()?.display(), ctx.backend_kind()?);
    println!();

    if !ctx.loaded.warnings.is_empty() {
        println!("Warnings:");
        for w in &ctx.loaded.warnings {
            println!("  {} {}", style("⚠").yellow(), w);
        }
        println!();
    }

    println!("{}", resolved.to_toml()?);
    Ok(())
}

fn cmd_which(ctx: &Context) -> Result<()> {
    if ctx.json_output {
        let sources: Vec<serde_json::Value> = ctx
            .loaded
            .sources
            .iter()
            .map(|s| serde_json::json!({ "path": s.path, "loaded": s.loaded }))
            .collect();
        return print_json(&sources);
    }

    println!("Config file search order (later overrides earlier):\n");
    for source in &ctx.loaded.sources {
        let status = if source.loaded {
            style("✓ loaded").green()
        } else {
            style("· not found").dim()
        };
        println!("  {} {}", status, source.path.display());
    }

    println!();
    let loaded_count = ctx.loaded.loaded_from().len();
    if loaded_count == 0 {
        println!("No config files found. Run 'tracery config init' to create one.");
    } else {
        println!("{} config file(s) loaded.", loaded_count);
    }
    Ok(())
}

const TEMPLATE: &str = r#"# Tracery Configuration

[graph]
# "native" keeps an adjacency list with a JSON snapshot; "sqlite" uses SQLite.
backend = "native"
# path = "graph.json"
timeout_ms = 5000

[builder]
similarity_threshold = 0.3
fan_out = 3
lookback_days = 30

[query]
max_trace_depth = 5
search_limit = 20

# [extract]
# max_span_chars = 280
# Set to true to use only the patterns below, in their listed order.
# replace_defaults = false
#
# [[extract.patterns]]
# category = "decision"
# pattern = "we settled on"
# weight = 0.8

# [logging]
# level = "warn"
# json = false
# file = true
"#;

fn cmd_init(local: bool, ctx: &Context) -> Result<()> {
    let path = if local {
        PathBuf::from("tracery.toml")
    } else {
        std::fs::create_dir_all(&ctx.config_dir)?;
        ctx.config_dir.join("config.toml")
    };

    if path.exists() {
        println!("Config file already exists: {}", path.display());
        return Ok(());
    }

    std::fs::write(&path, TEMPLATE)?;
    println!("{} Created config file: {}", style("✓").green(), path.display());
    println!();
    println!("Next steps:");
    println!("  tracery config show      # verify configuration");
    println!("  tracery ingest --help    # start recording decisions");
    Ok(())
}

fn cmd_path(ctx: &Context) -> Result<()> {
    println!("{}", ctx.config_dir.join("config.toml").display());
    Ok(())
}

fn cmd_validate(file: Option<PathBuf>, ctx: &Context) -> Result<()> {
    let config = match &file {
        Some(path) => tracery_config::load_config_file(path)?,
        None => ctx.loaded.config.clone(),
    };
    config.validate()?;
    config.extractor()?;

    let label = file
        .map(|p| p.display().to_string())
        .unwrap_or_else(|| "merged configuration".to_string());
    if ctx.json_output {
        print_json(&serde_json::json!({ "valid": true, "source": label }))
    } else {
        println!("{} {} is valid", style("✓").green(), label);
        Ok(())
    }
}
