//! Stats command - graph counts and the most connected nodes.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, print_header, print_json, truncate};

/// Arguments for the stats command.
#[derive(Args, Debug)]
pub struct StatsArgs {
    /// How many of the most connected nodes to list
    #[arg(short, long, default_value = "5")]
    pub top: usize,
}

/// Run the stats command.
pub fn run(args: StatsArgs, ctx: &Context) -> Result<()> {
    let store = ctx.open_store()?;
    let analytics = store.analytics(args.top)?;

    if ctx.json_output {
        return print_json(&analytics);
    }

    let dim = Style::new().dim();
    print_header("Graph Statistics");
    println!();
    println!("  Backend:   {}", store.backend_name());
    println!("  Nodes:     {}", style(analytics.node_count).cyan());
    println!("  Edges:     {}", style(analytics.edge_count).cyan());
    println!("  Archived:  {}", style(analytics.archived_count).cyan());
    println!();

    if !analytics.nodes_by_type.is_empty() {
        println!("{}", style("Nodes by type").bold());
        for (node_type, count) in &analytics.nodes_by_type {
            println!("  {:<14} {}", node_type, count);
        }
        println!();
    }
    if !analytics.edges_by_type.is_empty() {
        println!("{}", style("Edges by type").bold());
        for (relationship, count) in &analytics.edges_by_type {
            println!("  {:<18} {}", relationship, count);
        }
        println!();
    }
    if !analytics.most_connected.is_empty() {
        println!("{}", style("Most connected").bold());
        for node in &analytics.most_connected {
            println!(
                "  {:>3}  [{}] {} {}",
                node.degree,
                node.node_type,
                truncate(&node.title, 50),
                dim.apply_to(&node.id)
            );
        }
    }
    Ok(())
}
