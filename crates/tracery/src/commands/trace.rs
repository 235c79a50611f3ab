//! Trace command - why a decision was made and what it touched.

use anyhow::Result;
use clap::Args;
use console::{Style, style};
use tracery_graph::DecisionTrace;

use super::{Context, print_header, print_json, print_record, truncate, type_label};

/// Arguments for the trace command.
#[derive(Args, Debug)]
pub struct TraceArgs {
    /// Topic to look for in decisions and insights
    pub topic: String,

    /// Maximum influence-chain depth (overrides [query].max_trace_depth)
    #[arg(short, long, value_parser = clap::value_parser!(u32).range(1..))]
    pub depth: Option<u32>,
}

/// Run the trace command.
pub fn run(args: TraceArgs, ctx: &Context) -> Result<()> {
    let mut config = ctx.loaded.config.query_config();
    if let Some(depth) = args.depth {
        config.max_trace_depth = depth as usize;
    }
    let engine = tracery_graph::QueryEngine::with_config(ctx.open_store()?, config);
    let traces = engine.decision_trace(&args.topic)?;

    if ctx.json_output {
        return print_json(&traces);
    }

    let dim = Style::new().dim();
    if traces.is_empty() {
        println!(
            "{}",
            dim.apply_to(format!("No decisions or insights mention \"{}\"", args.topic))
        );
        return Ok(());
    }

    print_header(&format!("Decision trace: {}", args.topic));
    for (i, trace) in traces.iter().enumerate() {
        println!();
        print_record(i + 1, &trace.matched);
        print_trace_body(trace);
    }
    Ok(())
}

fn print_trace_body(trace: &DecisionTrace) {
    let dim = Style::new().dim();
    let sections = [
        ("informed by", &trace.influence_chain),
        ("affects", &trace.affected_artifacts),
        ("follow-ups", &trace.follow_ups),
    ];
    for (label, records) in sections {
        if records.is_empty() {
            continue;
        }
        println!("   {}", style(label).bold());
        for record in records {
            println!(
                "     {} {} {}",
                dim.apply_to("└"),
                type_label(record),
                truncate(&record.content, 60)
            );
        }
    }
}
