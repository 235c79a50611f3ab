//! Archive command - hide a node from search without deleting it.

use anyhow::Result;
use clap::Args;
use console::{Style, style};

use super::{Context, print_json, truncate};

/// Arguments for the archive command.
#[derive(Args, Debug)]
pub struct ArchiveArgs {
    /// Node id
    pub node_id: String,
}

/// Run the archive command.
pub fn run(args: ArchiveArgs, ctx: &Context) -> Result<()> {
    let node = ctx.open_store()?.archive_node(&args.node_id)?;

    if ctx.json_output {
        return print_json(&node);
    }

    let dim = Style::new().dim();
    println!(
        "{} {} {}",
        style("Archived").green(),
        node.id,
        dim.apply_to(truncate(&node.title, 50))
    );
    Ok(())
}
