//! Search command - ranked keyword search.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, print_header, print_json, truncate, type_label};

/// Arguments for the search command.
#[derive(Args, Debug)]
pub struct SearchArgs {
    /// Search terms
    #[arg(required = true, num_args = 1..)]
    pub query: Vec<String>,

    /// Maximum results to return (overrides [query].search_limit)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub limit: Option<u32>,
}

/// Run the search command.
pub fn run(args: SearchArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.query_config();
    if let Some(limit) = args.limit {
        config.search_limit = limit as usize;
    }
    let query = args.query.join(" ");
    let engine = tracery_graph::QueryEngine::with_config(ctx.open_store()?, config);
    let hits = engine.search(&query)?;

    if ctx.json_output {
        return print_json(&hits);
    }

    let dim = Style::new().dim();
    if hits.is_empty() {
        println!("{}", dim.apply_to("No results found"));
        return Ok(());
    }

    print_header("Search Results");
    println!();
    for (i, hit) in hits.iter().enumerate() {
        println!(
            "{}. {} {}",
            style(i + 1).cyan(),
            type_label(&hit.record),
            truncate(&hit.record.content, 70)
        );
        println!(
            "   {}",
            dim.apply_to(format!(
                "{}  (relevance: {:.3})",
                hit.record.id, hit.relevance
            ))
        );
    }
    Ok(())
}
