//! branchnote daemon entry point.
//!
//! Loads configuration, opens the default note repository, starts the web
//! server and handles graceful shutdown.

mod signals;

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::info;
use tracing_subscriber::EnvFilter;

use branchnote_core::config::AppConfig;
use branchnote_core::{GitStoreProvider, NoteService};
use branchnote_web::WebServer;

// ---------------------------------------------------------------------------
// CLI arguments
// ---------------------------------------------------------------------------

/// branchnote note server.
#[derive(Parser, Debug)]
#[command(
    name = "branchnote-daemon",
    version,
    about = "Collaborative note server backed by git branches"
)]
struct Args {
    /// Path to the TOML configuration file.
    #[arg(short, long)]
    config: PathBuf,

    /// Override the log level from the config file (trace, debug, info, warn, error).
    #[arg(long)]
    log_level: Option<String>,

    /// Override the listen address from the config file.
    #[arg(long)]
    listen: Option<String>,
}

// ---------------------------------------------------------------------------
// Main
// ---------------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    // Load configuration, environment overrides included
    let mut config = AppConfig::load_and_resolve(&args.config)
        .context("failed to load configuration file")?;
    if let Some(listen) = args.listen.clone() {
        config.server.listen = listen;
    }

    // Initialize tracing
    let log_level = args
        .log_level
        .clone()
        .unwrap_or_else(|| config.server.log_level.clone());

    let filter = EnvFilter::try_new(&log_level).unwrap_or_else(|_| EnvFilter::new("info"));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(true)
        .with_thread_ids(false)
        .with_file(false)
        .init();

    // Startup banner
    info!("========================================");
    info!("  branchnote v{}", env!("CARGO_PKG_VERSION"));
    info!("========================================");
    info!("Config file   : {}", args.config.display());
    info!("Data dir      : {}", config.store.data_dir.display());
    info!("Trunk branch  : {}", config.store.trunk_branch);
    info!("Default repo  : {}", config.store.default_repo);
    info!("Web listen    : {}", config.server.listen);
    info!("Log level     : {}", log_level);
    info!("========================================");

    std::fs::create_dir_all(&config.store.data_dir).context("failed to create data directory")?;

    let provider = GitStoreProvider::new(
        &config.store.data_dir,
        &config.store.trunk_branch,
        config.store.signature(),
        config.store.create_missing,
    );
    let service = Arc::new(NoteService::new(config.clone(), Arc::new(provider)));

    // Open (or create) the default repository before accepting requests
    let default_repo = config.store.default_repo.clone();
    let version = service
        .ensure_repository(&default_repo)
        .await
        .with_context(|| format!("failed to open repository '{default_repo}'"))?;
    info!("Repository '{}' ready at {}", default_repo, version);

    let listen_addr = config.server.listen.clone();
    let web_server = WebServer::new(config, service);
    web_server
        .start(&listen_addr, signals::wait_for_shutdown())
        .await
        .context("web server failed")?;

    info!("branchnote daemon stopped.");
    Ok(())
}
