//! `stowd`: the Stow shard ingest daemon.
//!
//! Accepts object uploads over HTTP, stores each on one of the shard's
//! storage nodes and replicates it to the rest before acknowledging.
//!
//! # Usage
//!
//! ```text
//! stowd start -c stow.toml                   # start with a config file
//! stowd start -c stow.toml -l 127.0.0.1:4831  # override the listen address
//! stowd check-config -c stow.toml            # validate and print the shard
//! ```

mod config;
mod error;
mod handler;
mod telemetry;


use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use stow_cluster::LocalCoordinator;
use stow_engine::{HttpNodeWriter, Shard};
use stow_net::{HttpReplicator, HttpTransport};
use stow_store::Spool;
use tracing::info;

use config::CliConfig;
use handler::AppState;

// -----------------------------------------------------------------------
// CLI definition
// -----------------------------------------------------------------------

#[derive(Parser)]
#[command(name = "stowd", version, about = "Stow shard write-ingest daemon")]
struct Cli {
    /// Path to TOML config file.
    #[arg(short, long, global = true, env = "STOW_CONFIG")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Start serving uploads.
    Start {
        /// Override the spool directory.
        #[arg(short, long)]
        spool_dir: Option<PathBuf>,

        /// Override the HTTP listen address (e.g. "127.0.0.1:4830").
        #[arg(short, long)]
        listen_addr: Option<String>,
    },

    /// Validate the configuration and print the shard layout.
    CheckConfig,
}

// -----------------------------------------------------------------------
// Entrypoint
// -----------------------------------------------------------------------

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let mut config = CliConfig::load(cli.config.as_deref()).context("failed to load config")?;

    telemetry::init(&config.log.level);

    match cli.command {
        Commands::Start {
            spool_dir,
            listen_addr,
        } => {
            // CLI args override config file values.
            if let Some(dir) = spool_dir {
                config.node.spool_dir = dir;
            }
            if let Some(addr) = listen_addr {
                config.node.listen_addr = addr;
            }
            cmd_start(config).await
        }
        Commands::CheckConfig => cmd_check_config(&config),
    }
}

// -----------------------------------------------------------------------
// stowd start
// -----------------------------------------------------------------------

async fn cmd_start(config: CliConfig) -> Result<()> {
    config.validate().context("invalid configuration")?;

    info!(
        shard = %config.shard_id(),
        nodes = config.shard.nodes.len(),
        spool_dir = %config.node.spool_dir.display(),
        listen_addr = %config.node.listen_addr,
        "starting stowd"
    );

    let coordinator = LocalCoordinator::with_limits(config.registry(), config.capacity_limits());
    let transport = HttpTransport::with_connect_timeout(config.connect_timeout())
        .context("failed to build HTTP client")?;

    let writer = Arc::new(HttpNodeWriter::new(coordinator.clone(), transport.clone()));
    let replicator = Arc::new(HttpReplicator::new(
        coordinator.clone(),
        transport,
        config.replication.concurrent_transfers,
    ));
    let spool = Spool::new(&config.node.spool_dir).context("failed to prepare spool directory")?;

    let shard = Shard::new(
        config.shard_config(),
        coordinator.clone(),
        writer,
        replicator,
        spool,
    )
    .context("invalid shard configuration")?;

    let app = handler::router(AppState {
        shard: Arc::new(shard),
        coordinator,
    });

    let listener = tokio::net::TcpListener::bind(&config.node.listen_addr)
        .await
        .with_context(|| format!("failed to bind {}", config.node.listen_addr))?;
    info!(addr = %config.node.listen_addr, "listening for uploads");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("HTTP server failed")?;

    info!("stowd stopped");
    Ok(())
}

async fn shutdown_signal() {
    if tokio::signal::ctrl_c().await.is_ok() {
        info!("shutdown requested");
    }
}

// -----------------------------------------------------------------------
// stowd check-config
// -----------------------------------------------------------------------

fn cmd_check_config(config: &CliConfig) -> Result<()> {
    config.validate()?;

    let registry = config.registry();
    println!("{}: {} assigned nodes", config.shard_id(), config.shard.nodes.len());
    for node in &config.shard.nodes {
        if let Some((id, addr)) = registry.iter().find(|(id, _)| id.as_str() == node) {
            println!("  {:<16} {addr}", id.as_str());
        }
    }
    match config.shard.capacity_bytes {
        Some(limit) => println!("Capacity limit: {limit} bytes"),
        None => println!("Capacity limit: none"),
    }
    println!("Spool directory: {}", config.node.spool_dir.display());
    Ok(())
}
