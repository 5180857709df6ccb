//! # Abasto Central
//!
//! Back-office ingestion daemon: consumes branch sale batches and keeps
//! the central inventory consistent.
//!
//! ## Architecture
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                        Central Daemon                                   │
//! │                                                                         │
//! │  Kafka (sync_ventas) ──► SyncConsumer ──► Gateway ──► SQLite/PG    │
//! │                                   │                                     │
//! │                                   └──► DLQ (sync_ventas_dlq)       │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```

mod config;

use anyhow::Result;
use tracing::info;
use tracing_subscriber::EnvFilter;

use abasto_db::Gateway;
use abasto_sync::SyncConsumer;

use crate::config::CentralConfig;

// Per-crate targets use the underscored crate names tracing emits.
const DEFAULT_LOG_FILTER: &str =
    "info,abasto_db=debug,abasto_inventory=debug,abasto_sync=debug,sqlx=warn";

#[tokio::main]
async fn main() -> Result<()> {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    tracing_subscriber::fmt().with_env_filter(filter).init();

    info!("Starting Abasto central daemon...");

    let config = CentralConfig::load()?;
    info!(
        backend = ?config.db_backend,
        brokers = %config.kafka_brokers,
        topic = %config.ventas_topic,
        "Configuration loaded"
    );

    let gateway = Gateway::connect(config.gateway()).await?;
    info!("Database connected, migrations applied");

    let consumer = SyncConsumer::new(gateway.clone(), config.broker())?;
    let ingest = tokio::spawn(async move {
        consumer.run().await;
    });

    info!("Sale ingestion running; press Ctrl-C to stop");
    tokio::signal::ctrl_c().await?;

    info!("Shutting down");
    ingest.abort();
    gateway.close().await;
    Ok(())
}
