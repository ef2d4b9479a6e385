use anyhow::{Context, Result};
use clap::Parser;

mod cli;
mod commands;
mod config;
mod pipeline;
mod providers;

use cli::Cli;
use config::AppConfig;

const DEFAULT_LOG_FILTER: &str = "bank_trader=info,market_data=info,prediction_store=info";

fn init_tracing() {
    let filter = || {
        tracing_subscriber::EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(DEFAULT_LOG_FILTER))
    };

    let json_logging = std::env::var("RUST_LOG_FORMAT")
        .map(|v| v.eq_ignore_ascii_case("json"))
        .unwrap_or(false);
    // Logs go to stderr so command output on stdout stays parseable
    if json_logging {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter())
            .with_writer(std::io::stderr)
            .init();
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    init_tracing();

    std::panic::set_hook(Box::new(|info| {
        eprintln!("PANIC: {info}");
        tracing::error!("PANIC: {info}");
    }));

    let cli = Cli::parse();
    let config = AppConfig::from_env().context("Invalid configuration")?;
    tracing::debug!("Database: {}", config.database_url);

    commands::run(cli.command, &config).await
}
