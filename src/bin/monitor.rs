//! Monitor Runtime - FTSO provider metrics for one network
//!
//! This binary runs the epoch-synchronized pipeline:
//! - Initializes SQLite database with schema
//! - Discovers the FTSO contracts behind the price submitter
//! - Spawns the epoch clock, finalization listeners, auto-claim dispatcher
//!   and round loop
//! - Writes the served snapshot to SNAPSHOT_PATH after every round
//!
//! Usage:
//!   cargo run --release --bin monitor
//!
//! Environment variables: see `MonitorConfig::from_env`
//!   RPC_URL - JSON-RPC endpoint (required)
//!   NETWORK - flare | songbird (default: songbird)
//!   EXECUTOR_ADDRESS - claim executor, enables auto-claim

use dotenv::dotenv;
use env_logger::Env;
use ftsoflow::backoff::ExponentialBackoff;
use ftsoflow::chain::rpc::JsonRpcGateway;
use ftsoflow::config::MonitorConfig;
use ftsoflow::pipeline::{EngineSettings, HttpProviderDirectory, MonitorEngine, SqliteStore};
use log::{error, info};
use std::sync::Arc;
use tokio::time::{interval, Duration};

const STATUS_INTERVAL_SECS: u64 = 60;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize environment and logging
    dotenv().ok();
    env_logger::Builder::from_env(Env::default().default_filter_or("info")).init();

    let config = MonitorConfig::from_env()?;

    info!("🚀 FTSO Monitor");
    info!("   ├─ Version: {}", env!("CARGO_PKG_VERSION"));
    info!("   ├─ Network: {} (chain id {})", config.network, config.network.chain_id());
    info!("   ├─ RPC: {}", config.rpc_url);
    info!("   ├─ Database: {}", config.db_path);
    info!("   ├─ Snapshot file: {}", config.snapshot_path);
    info!("   └─ Symbols: {}", config.watched_symbols.join(", "));

    // Initialize database (migrations are idempotent)
    info!("🔧 Initializing database...");
    let store = Arc::new(SqliteStore::open(&config.db_path, &config.schema_dir)?);
    info!("✅ Database initialized");

    // Contract discovery is retried until the node answers
    let mut backoff = ExponentialBackoff::from_millis(config.backoff_initial_ms, config.backoff_max_ms);
    let gateway = loop {
        match JsonRpcGateway::connect(&config).await {
            Ok(gateway) => break Arc::new(gateway),
            Err(e) => {
                error!("❌ Contract discovery failed: {}", e);
                backoff.sleep().await;
            }
        }
    };

    let directory = HttpProviderDirectory::new(&config.directory_url)?;

    let mut monitor = MonitorEngine::start(
        EngineSettings::from_config(&config),
        gateway,
        store,
        Box::new(directory),
    )
    .await;

    info!("🔄 Press CTRL+C to shutdown gracefully");

    let mut status_timer = interval(Duration::from_secs(STATUS_INTERVAL_SECS));
    status_timer.tick().await;

    loop {
        tokio::select! {
            result = tokio::signal::ctrl_c() => {
                match result {
                    Ok(()) => {
                        info!("");
                        info!("⚠️  Received CTRL+C, shutting down...");
                    }
                    Err(err) => error!("❌ Failed to listen for CTRL+C: {}", err),
                }
                break;
            }
            _ = status_timer.tick() => {
                match monitor.snapshots.latest() {
                    Some(served) => info!(
                        "📊 Epoch {} ends in {}s ({} providers)",
                        served.epoch_id,
                        served.ends_in,
                        served.providers_info.len()
                    ),
                    None => info!("📊 Waiting for the first round"),
                }
            }
            changed = monitor.snapshots.changed() => {
                if !changed {
                    error!("❌ Round loop stopped");
                    break;
                }
            }
        }
    }

    monitor.shutdown();
    info!("✅ Monitor stopped");
    Ok(())
}
