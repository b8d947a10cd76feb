//! linkvault - maintenance CLI
//!
//! Inspect and maintain a linkvault data directory: per-stream stats,
//! forced compaction, and a recovery health check.

use anyhow::{Context, Result};
use chrono::Utc;
use clap::{Parser, Subcommand, ValueEnum};
use humansize::{format_size, BINARY};
use linkvault::{Engine, EngineConfig, StreamKind};
use std::env;
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::error;
use tracing_subscriber::EnvFilter;

/// Maintenance tool for a linkvault data directory
#[derive(Parser, Debug)]
#[command(
    name = "linkvault",
    version,
    about = "Inspect and maintain a linkvault data directory",
    after_help = "EXAMPLES:\n    \
        linkvault stats\n    \
        linkvault -D /var/lib/linkvault compact\n    \
        linkvault compact --stream bookmarks\n    \
        linkvault check"
)]
struct CliArgs {
    /// Data directory (falls back to $DATA_DIR, then ./data)
    #[arg(short = 'D', long, value_name = "DIR", global = true)]
    data_dir: Option<PathBuf>,

    /// Verbose output (show engine logs)
    #[arg(short = 'v', long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Show per-stream record counts and file sizes
    Stats,
    /// Rewrite base files from the merged view and truncate the deltas
    Compact {
        /// Compact only this stream (all four when omitted)
        #[arg(long, value_name = "STREAM")]
        stream: Option<StreamArg>,
    },
    /// Open the directory, replay the deltas, and read every stream
    Check,
}

#[derive(ValueEnum, Debug, Clone, Copy)]
enum StreamArg {
    Bookmarks,
    Sessions,
    History,
    LinkClicks,
}

impl From<StreamArg> for StreamKind {
    fn from(arg: StreamArg) -> Self {
        match arg {
            StreamArg::Bookmarks => StreamKind::Bookmarks,
            StreamArg::Sessions => StreamKind::Sessions,
            StreamArg::History => StreamKind::History,
            StreamArg::LinkClicks => StreamKind::LinkClicks,
        }
    }
}

fn main() -> ExitCode {
    match run() {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            eprintln!("Error: {:#}", e);
            ExitCode::FAILURE
        }
    }
}

fn run() -> Result<()> {
    let args = CliArgs::parse();
    setup_logging(args.verbose)?;

    let data_dir = resolve_data_dir(args.data_dir.clone());
    let engine = Engine::open(EngineConfig::new(&data_dir))
        .with_context(|| format!("failed to open data directory '{}'", data_dir.display()))?;

    let result = match args.command {
        Command::Stats => run_stats(&engine),
        Command::Compact { stream } => run_compact(&engine, stream),
        Command::Check => run_check(&engine),
    };

    engine.close()?;
    result
}

/// `--data-dir` beats `$DATA_DIR` beats `./data`.
fn resolve_data_dir(flag: Option<PathBuf>) -> PathBuf {
    flag.or_else(|| env::var_os("DATA_DIR").map(PathBuf::from))
        .unwrap_or_else(|| PathBuf::from("./data"))
}

fn setup_logging(verbose: bool) -> Result<()> {
    let default_level = if verbose { "info" } else { "warn" };
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(default_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|e| anyhow::anyhow!("failed to initialize logging: {e}"))?;
    Ok(())
}

fn run_stats(engine: &Engine) -> Result<()> {
    let stats = engine.stats().context("failed to collect stats")?;

    println!("Data directory: {}", engine.data_dir().display());
    println!("As of:          {}", Utc::now().format("%Y-%m-%d %H:%M:%S UTC"));
    println!();
    println!(
        "{:<12} {:>10} {:>14} {:>12} {:>12}",
        "STREAM", "RECORDS", "PENDING DELTA", "BASE", "DELTA"
    );
    for s in &stats.streams {
        println!(
            "{:<12} {:>10} {:>14} {:>12} {:>12}",
            s.stream,
            s.records,
            s.pending_delta,
            format_size(s.base_bytes, BINARY),
            format_size(s.delta_bytes, BINARY),
        );
    }
    Ok(())
}

fn run_compact(engine: &Engine, stream: Option<StreamArg>) -> Result<()> {
    match stream {
        Some(arg) => {
            let kind: StreamKind = arg.into();
            engine
                .compact(kind)
                .with_context(|| format!("compaction of '{}' failed", kind.name()))?;
            println!("Compacted {}", kind.name());
        }
        None => {
            engine.compact_all().context("compaction failed")?;
            println!("Compacted all streams");
        }
    }
    Ok(())
}

fn run_check(engine: &Engine) -> Result<()> {
    let mut failures = 0;

    for kind in StreamKind::ALL {
        let outcome = match kind {
            StreamKind::Bookmarks => engine.read_bookmarks().map(|r| r.len()),
            StreamKind::Sessions => engine.read_sessions().map(|r| r.len()),
            StreamKind::History => engine.read_history().map(|r| r.len()),
            StreamKind::LinkClicks => engine.read_link_clicks().map(|r| r.len()),
        };
        match outcome {
            Ok(count) => println!("{:<12} OK   {count} records", kind.name()),
            Err(e) => {
                failures += 1;
                println!("{:<12} FAIL {e}", kind.name());
            }
        }
    }

    if failures > 0 {
        anyhow::bail!("{failures} stream(s) failed to read");
    }
    println!("All streams readable");
    Ok(())
}
