use anyhow::{Context, Result};
use clap::Parser;
use std::fs::OpenOptions;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tracing::info;
use tracing_subscriber::EnvFilter;

mod api;
mod clockodo;
mod config;
mod dates;
mod error;
mod matching;
mod models;
mod resolver;
mod retry;
mod server;
mod summary;
#[cfg(test)]
mod testing;
mod tracker;

use clockodo::ClockodoClient;
use config::Settings;
use resolver::Resolver;
use server::Dispatcher;
use tracker::Tracker;

/// Clockodo time tracking as MCP tools and resources over stdio.
#[derive(Parser, Debug)]
#[command(name = "clockodo-mcp", version, about)]
struct Cli {
    /// JSON settings file (defaults to ~/.clockodo-mcp.json when present)
    #[arg(long)]
    config: Option<PathBuf>,

    /// Append logs to this file instead of stderr
    #[arg(long)]
    log_file: Option<PathBuf>,

    /// Log filter, e.g. `info` or `clockodo_mcp=debug`; RUST_LOG wins when set
    #[arg(long, default_value = "info")]
    log_level: String,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    init_logging(&cli)?;

    let settings = Settings::load(cli.config.as_deref()).context("invalid configuration")?;
    info!(
        clockodo_email = %settings.credentials.email,
        credentials = %settings.credentials.fingerprint(),
        base_url = %settings.base_url,
        "Starting Clockodo MCP server"
    );

    let client = ClockodoClient::new(&settings).context("failed to build Clockodo client")?;
    let api = Arc::new(client);
    let resolver = Resolver::new(api.clone(), settings.credentials.email.clone(), settings.cache_ttl);
    let tracker = Arc::new(Tracker::new(api, resolver));

    server::run_stdio(Arc::new(Dispatcher::new(tracker))).await?;
    info!("stdin closed, shutting down");
    Ok(())
}

// stdout carries the protocol, so logs go to stderr or a file.
fn init_logging(cli: &Cli) -> Result<()> {
    let filter = EnvFilter::try_from_default_env().or_else(|_| EnvFilter::try_new(&cli.log_level))?;
    let builder = tracing_subscriber::fmt().with_env_filter(filter).with_target(true);

    match &cli.log_file {
        Some(path) => {
            let file = OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)
                .with_context(|| format!("cannot open log file {}", path.display()))?;
            builder.with_ansi(false).with_writer(Mutex::new(file)).init();
        }
        None => builder.with_writer(std::io::stderr).init(),
    }
    Ok(())
}
