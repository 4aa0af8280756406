//! weft-daemon - one node of the weft chat message fabric.
//!
//! Loads the node configuration, wires the runtime and serves the
//! WebSocket gateway until interrupted. Configuration validation failures
//! are the only fatal startup path; everything after that degrades and
//! counts instead of exiting.

#![deny(unsafe_code)]
#![deny(missing_docs)]
#![deny(clippy::all)]
#![warn(unreachable_pub)]
#![deny(clippy::unwrap_used)]
#![cfg_attr(test, allow(clippy::unwrap_used))]

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::info;

use weft_config::FabricConfig;
use weft_core::RoomId;
use weft_queue::{InMemoryQueue, MessageQueue};
use weft_runtime::FabricRuntime;
use weft_storage::{MessageStore, NullStore};
use weft_telemetry::{LogConfig, LogFormat, setup_logging};

/// weft - horizontally scaled chat message fabric
#[derive(Parser)]
#[command(name = "weft-daemon")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Path to the node configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Override the listener address (host:port)
    #[arg(long)]
    bind: Option<String>,

    /// Override the node id
    #[arg(long)]
    node_id: Option<String>,

    /// Override the log level
    #[arg(long)]
    log_level: Option<String>,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let mut config =
        weft_config::load(cli.config.as_deref()).context("configuration rejected")?;
    apply_cli_overrides(&mut config, &cli)?;

    setup_logging(
        &LogConfig::new(config.logging.level.clone())
            .with_format(LogFormat::parse(&config.logging.format)),
    )
    .context("logging setup failed")?;

    info!(
        node = %config.node.node_id,
        rooms = config.node.rooms,
        bind = %config.server.bind,
        "weft-daemon starting"
    );

    let queue = build_queue(&config);
    let store = build_store(&config).await?;

    let runtime = FabricRuntime::new(config, queue, store);
    runtime.start();
    runtime.serve_gateway()?;

    tokio::signal::ctrl_c()
        .await
        .context("cannot listen for shutdown signal")?;
    info!("shutdown signal received");

    runtime.stop().await;
    Ok(())
}

/// CLI flags win over file and env values; revalidate afterwards since
/// they can break cross-field invariants the loader already checked.
fn apply_cli_overrides(config: &mut FabricConfig, cli: &Cli) -> Result<()> {
    if let Some(bind) = &cli.bind {
        config.server.bind.clone_from(bind);
    }
    if let Some(node_id) = &cli.node_id {
        config.node.node_id.clone_from(node_id);
    }
    if let Some(level) = &cli.log_level {
        config.logging.level.clone_from(level);
    }
    weft_config::validate(config).context("configuration rejected")?;
    Ok(())
}

/// The queue backend.
///
/// The managed-queue binding is deployment infrastructure; a node run
/// from this binary carries the in-memory service with every room queue
/// and the DLQ pre-created, which keeps a single-node deployment fully
/// self-contained.
fn build_queue(config: &FabricConfig) -> Arc<dyn MessageQueue> {
    let queue = InMemoryQueue::new();
    for room in 1..=config.node.rooms {
        queue.create_queue(&config.queue.queue_name(RoomId(room)));
    }
    if config.dlq.enabled {
        queue.create_queue(&config.dlq.queue_name);
    }
    Arc::new(queue)
}

#[cfg(feature = "postgres")]
async fn build_store(config: &FabricConfig) -> Result<Arc<dyn MessageStore>> {
    if config.database.is_configured() {
        let store = weft_storage::PgMessageStore::connect(&config.database.url, 8)
            .await
            .context("cannot connect to database")?;
        info!("using postgres message store");
        Ok(Arc::new(store))
    } else {
        info!("no database configured; messages will not be persisted");
        Ok(Arc::new(NullStore::new()))
    }
}

#[cfg(not(feature = "postgres"))]
async fn build_store(config: &FabricConfig) -> Result<Arc<dyn MessageStore>> {
    if config.database.is_configured() {
        anyhow::bail!("database.url is set but this build has no postgres support");
    }
    info!("no database configured; messages will not be persisted");
    Ok(Arc::new(NullStore::new()))
}
