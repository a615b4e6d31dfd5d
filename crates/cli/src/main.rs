//! reset-ttl entry point.
//!
//! Re-stamps every entry of an HTTP cache with the TTL of its matching
//! policy, then compacts the store. Logging goes to stderr; the summary is
//! printed on stdout.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::Parser;
use tracing_subscriber::EnvFilter;
use ttl_reset_core::{AppConfig, CompactionOutcome, RunReport};

/// Reset cache entry expirations from the current policy file.
#[derive(Parser, Debug)]
#[command(name = "reset-ttl", version)]
struct Args {
    /// Directory for HTTP cache storage [default: .httpcache]
    #[arg(long)]
    dir: Option<PathBuf>,

    /// File containing cache policies [default: .httpcache/policies.txt]
    #[arg(long)]
    policies: Option<PathBuf>,

    /// Records fetched per scan page
    #[arg(long)]
    page_size: Option<usize>,

    /// Emit logs as JSON
    #[arg(long, env = "RESET_TTL_LOG_JSON")]
    log_json: bool,
}

#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse();
    init_tracing(args.log_json);

    match run(args).await {
        Ok(report) => {
            print_summary(&report);
            ExitCode::SUCCESS
        }
        Err(e) => {
            tracing::error!(error = %format!("{e:#}"), "reset-ttl aborted");
            eprintln!("fatal: {e:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(json: bool) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    if json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn run(args: Args) -> Result<RunReport> {
    let config = AppConfig::load()?.with_overrides(args.dir, args.policies, args.page_size);
    config.validate()?;

    let report = ttl_reset_core::run(&config)
        .await
        .with_context(|| format!("TTL reset of {} failed", config.store_path().display()))?;
    Ok(report)
}

fn print_summary(report: &RunReport) {
    println!("Successfully updated TTL for {} cache entries", report.updated);
    if report.failures() > 0 {
        println!(
            "Skipped {} entries after errors ({} decode, {} encode, {} write)",
            report.failures(),
            report.decode_failures,
            report.encode_failures,
            report.write_failures
        );
    }
    match &report.compaction {
        CompactionOutcome::Compacted => println!("Successfully compacted cache"),
        CompactionOutcome::Failed(e) => println!("Failed to compact cache: {e}"),
    }
}
