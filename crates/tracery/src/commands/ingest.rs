//! Ingest command - extract knowledge from conversation text.

use std::io::Read;
use std::path::{Path, PathBuf};

use anyhow::{Context as _, Result, bail};
use chrono::{DateTime, Utc};
use clap::Args;
use console::{Style, style};
use tracery_graph::{IngestReport, Ingestor, RelationshipBuilder};
use tracery_types::{Attribution, IngestContext, IngestRequest};

use super::{Context, print_header, print_json, truncate};

/// Arguments for the ingest command.
#[derive(Args, Debug)]
pub struct IngestArgs {
    /// Conversation text (read from stdin if omitted)
    pub text: Option<String>,

    /// Session the conversation belongs to
    #[arg(short, long, required_unless_present = "requests")]
    pub session: Option<String>,

    /// File touched by the conversation (repeatable)
    #[arg(short, long = "file", value_name = "PATH")]
    pub files: Vec<String>,

    /// Source conversation id
    #[arg(long)]
    pub conversation: Option<String>,

    /// Attribution: user id
    #[arg(long)]
    pub user: Option<String>,

    /// Attribution: channel id
    #[arg(long)]
    pub channel: Option<String>,

    /// The text comes from a completion event (e.g. a finished test run)
    #[arg(long)]
    pub completion: bool,

    /// Session that preceded this one
    #[arg(long, value_name = "SESSION")]
    pub previous_session: Option<String>,

    /// When the conversation happened (RFC 3339, default now)
    #[arg(long)]
    pub timestamp: Option<DateTime<Utc>>,

    /// Ingest a JSON-lines file of requests instead ("-" for stdin)
    #[arg(long, value_name = "FILE", conflicts_with_all = ["text", "session"])]
    pub requests: Option<PathBuf>,
}

/// Run the ingest command.
pub fn run(args: IngestArgs, ctx: &Context) -> Result<()> {
    let config = &ctx.loaded.config;
    let ingestor = Ingestor::new(ctx.open_store()?)
        .with_extractor(config.extractor()?)
        .with_scorer(config.scorer())
        .with_builder(RelationshipBuilder::new(config.builder_config()));

    if let Some(path) = &args.requests {
        let requests = read_requests(path)?;
        return ingest_batch(&ingestor, &requests, ctx);
    }

    let request = single_request(args)?;
    let report = ingestor.ingest(&request)?;
    if ctx.json_output {
        print_json(&report)?;
    } else {
        print_report(&report, ctx.verbose);
    }
    Ok(())
}

fn single_request(args: IngestArgs) -> Result<IngestRequest> {
    let text = match args.text {
        Some(text) => text,
        None => {
            let mut buf = String::new();
            std::io::stdin()
                .read_to_string(&mut buf)
                .context("failed to read conversation from stdin")?;
            buf
        }
    };
    let Some(session) = args.session else {
        bail!("--session is required");
    };

    let mut context = IngestContext::new(session)
        .with_attribution(Attribution {
            user_id: args.user,
            channel_id: args.channel,
        })
        .with_completion_event(args.completion);
    for file in args.files {
        context = context.with_file(file);
    }
    if let Some(conversation) = args.conversation {
        context = context.with_conversation(conversation);
    }
    if let Some(previous) = args.previous_session {
        context = context.with_previous_session(previous);
    }
    if let Some(timestamp) = args.timestamp {
        context = context.with_timestamp(timestamp);
    }
    Ok(IngestRequest::new(context, text))
}

/// One request per non-blank line.
fn read_requests(path: &Path) -> Result<Vec<IngestRequest>> {
    let contents = if path.as_os_str() == "-" {
        let mut buf = String::new();
        std::io::stdin().read_to_string(&mut buf)?;
        buf
    } else {
        std::fs::read_to_string(path)
            .with_context(|| format!("failed to read {}", path.display()))?
    };

    contents
        .lines()
        .enumerate()
        .filter(|(_, line)| !line.trim().is_empty())
        .map(|(i, line)| {
            serde_json::from_str(line).with_context(|| format!("invalid request on line {}", i + 1))
        })
        .collect()
}

fn ingest_batch(ingestor: &Ingestor, requests: &[IngestRequest], ctx: &Context) -> Result<()> {
    let results = ingestor.ingest_many(requests);
    let failures = results.iter().filter(|r| r.is_err()).count();

    if ctx.json_output {
        let rows: Vec<serde_json::Value> = results
            .iter()
            .map(|result| match result {
                Ok(report) => serde_json::json!({ "ok": report }),
                Err(e) => serde_json::json!({ "error": e.to_string() }),
            })
            .collect();
        print_json(&rows)?;
    } else {
        for (request, result) in requests.iter().zip(&results) {
            match result {
                Ok(report) => print_report(report, ctx.verbose),
                Err(e) => {
                    let red = Style::new().red();
                    eprintln!(
                        "{} session {}: {}",
                        red.apply_to("Error:"),
                        request.context.session_id,
                        e
                    );
                }
            }
            println!();
        }
    }

    if failures > 0 {
        bail!("{} of {} requests failed", failures, requests.len());
    }
    Ok(())
}

fn print_report(report: &IngestReport, verbose: bool) {
    let dim = Style::new().dim();
    print_header(&format!("Ingested into {}", report.session_node_id));
    println!("  Created:   {}", style(report.created.len()).cyan());
    println!("  Merged:    {}", style(report.merged.len()).cyan());
    println!("  Edges:     {}", style(report.edges_created).cyan());
    println!("  Rejected:  {}", style(report.rejected.len()).cyan());

    if verbose {
        for id in &report.created {
            println!("  {} {}", style("+").green(), dim.apply_to(id));
        }
        for id in &report.merged {
            println!("  {} {}", style("=").yellow(), dim.apply_to(id));
        }
    }
    for rejected in &report.rejected {
        println!(
            "  {} [{}] {} {}",
            style("-").red(),
            rejected.category,
            truncate(&rejected.content, 50),
            dim.apply_to(format!("({})", rejected.reason))
        );
    }
}
