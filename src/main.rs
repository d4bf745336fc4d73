mod bot;
mod collector;
mod config;
mod db;
mod http;
mod models;
mod pools;
mod price;
mod render;
mod report;
mod rpc;
mod twitter;

use clap::Parser;
use eyre::WrapErr;
use std::{fs::OpenOptions, sync::Mutex};
use tokio::signal;
use tracing::info;
use tracing_subscriber::{fmt, prelude::*, EnvFilter};

use crate::bot::{log_outcome, Bot};
use crate::config::Mode;

/// Posts AMP collateral pool TVL and APY updates to X.
#[derive(Debug, Parser)]
#[command(version, about)]
struct Cli {
    /// Pass `dev` to use the DEV_ credential set.
    #[arg(value_parser = ["dev"])]
    mode: Option<String>,
}

fn init_logging() -> eyre::Result<()> {
    let log_file = OpenOptions::new()
        .create(true)
        .append(true)
        .open("bot.log")
        .wrap_err("opening bot.log")?;

    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .with(fmt::layer().with_target(false))
        .with(
            fmt::layer()
                .with_target(false)
                .with_ansi(false)
                .with_writer(Mutex::new(log_file)),
        )
        .init();
    Ok(())
}

#[tokio::main]
async fn main() -> eyre::Result<()> {
    init_logging()?;

    let cli = Cli::parse();
    let mode = match cli.mode.as_deref() {
        Some("dev") => Mode::Dev,
        _ => Mode::Prod,
    };

    info!("Ampy Jr. starting ({:?})...", mode);

    let cfg = config::load(mode)?;

    // Run DB migrations once at startup
    {
        let conn = db::connect(&cfg.db_path)?;
        db::run_migrations(&conn)?;
    }

    let http = http::client()?;
    let bot = Bot::new(cfg, http);

    bot.twitter
        .verify()
        .await
        .wrap_err("Failed to initialize Twitter API v2 client")?;
    info!("Bot '{}' initialized successfully!", bot.cfg.bot_name);

    let Some(every) = bot.cfg.interval else {
        log_outcome(bot.run_once().await?);
        return Ok(());
    };

    info!("Bot is running! Will post every {:?}. Press Ctrl+C to stop.", every);

    let runs = bot::run_every(every, signal::ctrl_c(), || bot.run_once()).await;
    info!("Shut down after {} runs", runs);

    Ok(())
}
