//! PulseKV server entry point.
//!
//! Sets up logging, the storage engine, the expiry manager and the TCP
//! listener, then serves until Ctrl+C.

use clap::Parser;
use pulsekv::connection::ConnectionStats;
use pulsekv::server::accept_loop;
use pulsekv::storage::{start_expiry_manager, StorageEngine};
use pulsekv::Config;
use std::sync::atomic::Ordering;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::signal;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = Config::parse();

    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(&config.log_level));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .init();

    info!("PulseKV v{}", pulsekv::VERSION);

    // Shared across all connections
    let storage = Arc::new(StorageEngine::new());
    let _expiry = start_expiry_manager(Arc::clone(&storage));

    let stats = Arc::new(ConnectionStats::new());

    let listener = TcpListener::bind(config.bind_address()).await?;
    info!("Listening on {}", config.bind_address());

    let shutdown = async {
        if let Err(e) = signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
            std::future::pending::<()>().await;
        }
        info!("Shutdown signal received, stopping server...");
    };

    tokio::select! {
        _ = accept_loop(listener, Arc::clone(&storage), Arc::clone(&stats)) => {}
        _ = shutdown => {}
    }

    let storage_stats = storage.stats();
    info!(
        connections = stats.connections_accepted.load(Ordering::Relaxed),
        commands = stats.commands_processed.load(Ordering::Relaxed),
        keys = storage_stats.keys,
        expired = storage_stats.expired,
        "Server shutdown complete"
    );
    Ok(())
}
