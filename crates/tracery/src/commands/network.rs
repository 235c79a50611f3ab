//! Network command - the neighborhood of a node.

use anyhow::Result;
use clap::Args;

use super::{Context, print_header, print_json, print_records};

/// Arguments for the network command.
#[derive(Args, Debug)]
pub struct NetworkArgs {
    /// Node id
    pub node_id: String,

    /// How many hops to follow
    #[arg(short, long, default_value = "2")]
    pub depth: usize,
}

/// Run the network command.
pub fn run(args: NetworkArgs, ctx: &Context) -> Result<()> {
    let records = ctx
        .query_engine()?
        .insight_network(&args.node_id, args.depth)?;

    if ctx.json_output {
        return print_json(&records);
    }

    print_header(&format!("Network of {} (depth {})", args.node_id, args.depth));
    println!();
    print_records(&records, "Node not found or has no connections");
    Ok(())
}
