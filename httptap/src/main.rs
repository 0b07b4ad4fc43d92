use anyhow::{Context, Result};
use aya::include_bytes_aligned;
use clap::Parser;
use log::info;

use httptap::{HttpTapEngine, cli::Cli, ensure_privileges, settings::Settings};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(if cli.verbose { "info" } else { "warn" }),
    )
    .init();

    let mut settings = Settings::load(cli.config.as_deref()).context("Failed to load settings")?;
    settings.apply_cli(&cli);

    ensure_privileges()?;

    // build.rs compiles httptap-ebpf and copies the object to $OUT_DIR/httptap
    let engine = HttpTapEngine::new(
        settings,
        include_bytes_aligned!(concat!(env!("OUT_DIR"), "/httptap")),
    )?;

    let stats = engine.run().await?;
    info!("Captured {} HTTP messages", stats.http_messages());
    Ok(())
}
