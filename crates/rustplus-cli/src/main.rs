//! rustplus: command-line client for Rust+ companion servers.
//! Connects over WebSocket, issues one query (or watches broadcasts) and exits.

use std::time::Duration;

use anyhow::Context;
use clap::Parser;

mod cli;
mod commands;
mod config;
mod render;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    let filter = std::env::var("RUSTPLUS_LOG")
        .or_else(|_| std::env::var("RUST_LOG"))
        .unwrap_or_else(|_| "info".to_string());
    tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::new(filter))
        .with_writer(std::io::stderr)
        .init();

    let path = args.config.unwrap_or_else(cli::default_config_path);
    let config = config::CliConfig::load(&path)
        .with_context(|| format!("could not load config (pass --config or create {})", path.display()))?;
    tracing::debug!(url = %config.connection.url(), "config loaded");

    let options = commands::Options {
        config,
        json: args.json,
        timeout: Duration::from_secs(args.timeout.max(1)),
    };
    commands::run(options, args.command).await
}
