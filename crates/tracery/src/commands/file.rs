//! File command - decisions and action items that touched a file.

use anyhow::Result;
use clap::Args;

use super::{Context, print_header, print_json, print_records};

/// Arguments for the file command.
#[derive(Args, Debug)]
pub struct FileArgs {
    /// File path as it appears in conversations
    pub path: String,
}

/// Run the file command.
pub fn run(args: FileArgs, ctx: &Context) -> Result<()> {
    let records = ctx.query_engine()?.file_modification_history(&args.path)?;

    if ctx.json_output {
        return print_json(&records);
    }

    print_header(&format!("History of {}", args.path));
    println!();
    print_records(&records, "No recorded changes for this file");
    Ok(())
}
