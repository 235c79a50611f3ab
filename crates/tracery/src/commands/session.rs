//! Session command - what was discussed in a session.

use anyhow::Result;
use clap::Args;

use super::{Context, print_header, print_json, print_records};

/// Arguments for the session command.
#[derive(Args, Debug)]
pub struct SessionArgs {
    /// Session id
    pub session_id: String,
}

/// Run the session command.
pub fn run(args: SessionArgs, ctx: &Context) -> Result<()> {
    let records = ctx.query_engine()?.session_insights(&args.session_id)?;

    if ctx.json_output {
        return print_json(&records);
    }

    print_header(&format!("Session {}", args.session_id));
    println!();
    print_records(&records, "Nothing recorded for this session");
    Ok(())
}
