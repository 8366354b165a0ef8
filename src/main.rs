//! # ledgerline
//!
//! Entry point for the `ledgerline` CLI.
//!
//! ## Exit Status
//!
//! - `0`: the run finished, including runs that queued actions for the owner
//! - `1`: a configuration, backend, consistency or storage error stopped it
//!
//! Logging goes to stderr through `tracing`; set `RUST_LOG` to change the
//! level (default `info`).

#![forbid(unsafe_code)]
#![forbid(clippy::unwrap_used)]
#![forbid(clippy::panic)]
#![deny(clippy::expect_used)]

use std::process::ExitCode;
use std::time::Instant;

use clap::Parser;
use tracing::{error, info};
use tracing_subscriber::{EnvFilter, layer::SubscriberExt, util::SubscriberInitExt};

use ledgerline::cli::Cli;
use ledgerline::commands::execute_command;

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing();

    let start_time = Instant::now();
    match execute_command(cli.command, &cli.global).await {
        Ok(()) => {
            info!(elapsed = ?start_time.elapsed(), "Done");
            ExitCode::SUCCESS
        }
        Err(err) => {
            error!(error = %err, "Run failed");
            eprintln!("Error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

/// Initialize tracing subscriber with environment filter.
fn init_tracing() {
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
}
