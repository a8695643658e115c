//! Change-set replay tool
//!
//! Feeds scripted unit-of-work flushes through the change listener and prints
//! every event the dispatcher delivers, one JSON object per line:
//!
//!   changeset-replay --config registry.json --script flushes.json
//!
//! Logs go to stderr so stdout can be piped straight into `jq`.

use std::io::{self, BufWriter, Write};
use std::path::PathBuf;
use anyhow::Result;
use changeset_replay::{ReplayOptions, load_registry, load_script, run_script};
use clap::Parser;
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser, Debug)]
#[command(name = "changeset-replay")]
#[command(about = "Replay unit-of-work flushes and print the aggregated events")]
struct Args {
    /// Tracking registry (JSON)
    #[arg(short, long)]
    config: PathBuf,

    /// Flush script (JSON)
    #[arg(short, long)]
    script: PathBuf,

    /// Disable auto-dispatch and deliver everything in one pass at the end
    #[arg(long)]
    manual_dispatch: bool,

    /// Enable verbose debug logging
    #[arg(short, long)]
    verbose: bool,
}

fn main() -> Result<()> {
    let args = Args::parse();
    let log_level = if args.verbose { Level::DEBUG } else { Level::INFO };
    FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_target(false)
        .with_writer(io::stderr)
        .compact()
        .init();

    let registry = load_registry(&args.config)?;
    info!("Loaded {} tracked class(es) from {}", registry.len(), args.config.display());
    let script = load_script(&args.script)?;

    let options = ReplayOptions {
        manual_dispatch: args.manual_dispatch,
    };
    let mut out = BufWriter::new(io::stdout().lock());
    let summary = run_script(registry, &script, &options, &mut out)?;
    out.flush()?;

    info!(
        "Replayed {} flush(es), {} rolled back, {} event(s) written",
        summary.flushes, summary.rolled_back, summary.events
    );
    Ok(())
}
