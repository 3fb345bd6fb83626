//! Binary crate for the `weather-widget` server.
//!
//! This crate focuses on:
//! - Parsing CLI arguments
//! - Speaking the host event bridge over stdin/stdout
//! - Interactive configuration and one-shot output

use clap::Parser;
use tracing_subscriber::EnvFilter;

mod cli;
mod stdio;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // stdout carries bridge traffic, so logs go to stderr
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cmd = cli::Cli::parse();
    cmd.run().await
}
