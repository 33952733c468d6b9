//! dirtally - Fast Concurrent Tunable File Counter
//!
//! Entry point for the CLI application.

use anyhow::{Context, Result};
use clap::Parser;
use dirtally::config::{CliArgs, TallyConfig};
use dirtally::scan::ScanRunner;
use std::process::ExitCode;
use std::sync::Arc;
use tracing::error;
use tracing_subscriber::EnvFilter;

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

    setup_logging(args.verbose);

    let config = TallyConfig::from_args(args).context("invalid configuration")?;
    let config = Arc::new(config);

    // the head record carries the invocation, minus any trailing message
    let mut argv: Vec<String> = std::env::args().collect();
    if let Some(pos) = argv.iter().position(|a| a == "--") {
        argv.truncate(pos);
    }

    let runner = ScanRunner::new(config, argv).context("failed to set up scan log")?;
    runner.run().context("scan failed")?;

    Ok(())
}

fn setup_logging(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("dirtally=debug,warn")
    } else {
        EnvFilter::new("dirtally=info,warn")
    };

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}
