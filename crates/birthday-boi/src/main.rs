mod commands;
mod config;
mod dates;
mod discord;
mod error;
mod ledger;
mod scheduler;
mod store;
mod version;
mod zodiac;

use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use anyhow::{Context as _, Result};
use chrono::Utc;
use clap::Parser;
use sqlx::postgres::PgPoolOptions;
use tracing::info;

use crate::{
    config::{open_config, write_default_config},
    ledger::AnnouncementLedger,
    store::PgStore,
    version::short_version,
};

#[derive(Parser)]
#[command(version = short_version())]
struct Args {
    #[arg(long, default_value = "config.toml")]
    config: PathBuf,

    #[arg(long)]
    init: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(tracing::Level::INFO.into()),
        )
        .init();

    let args = Args::parse();

    if args.init {
        write_default_config(&args.config)?;
        info!(path = ?args.config, "Created default configuration");
        return Ok(());
    }

    info!(version = short_version(), "birthday-boi version");

    let config = open_config(&args.config).context("Failed to load configuration")?;

    let pool = PgPoolOptions::new()
        .max_connections(5)
        .connect(&config.database.url)
        .await
        .context("Failed to connect to database")?;
    let store = PgStore::new(pool);
    store
        .init()
        .await
        .context("Failed to initialize database tables")?;
    info!("Database ready");

    let ledger = Arc::new(Mutex::new(AnnouncementLedger::new(Utc::now())));

    discord::run(config, store, ledger).await
}
