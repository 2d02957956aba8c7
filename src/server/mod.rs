// src/server/mod.rs

//! Process wiring: builds the collection services, spawns the collector and
//! the inventory refresh task, and serves the HTTP RPC surface until
//! shutdown.

mod api;

use crate::config::Config;
use crate::core::collect::{
    Collector, RoundContext, StaticDiscovery, StatsFanout, UnavailableMetakeyClient,
    UnconfiguredMetaDb,
};
use crate::core::collect::metadb::MetaDb;
use crate::core::collect::metakey::MetakeyClient;
use crate::core::collect::discovery::Discovery;
use crate::core::inventory::{Inventory, InventoryWorker, UnavailableInventoryWorker};
use anyhow::{Context, Result};
use std::net::SocketAddr;
use std::sync::Arc;
use tracing::{info, warn};

/// External collaborators injected into the collector. The defaults are
/// stand-ins that degrade gracefully; a deployment wires real clients here.
pub struct Collaborators {
    pub discovery: Arc<dyn Discovery>,
    pub metakey: Arc<dyn MetakeyClient>,
    pub metadb: Arc<dyn MetaDb>,
    pub inventory_worker: Arc<dyn InventoryWorker>,
}

impl Collaborators {
    pub fn stand_ins(config: &Config) -> Self {
        if !config.metadata.url.is_empty() {
            warn!(
                "metadata.url is configured but no database client is wired up; \
                 jobs, history, and inventory ingestion will be skipped"
            );
        }
        Self {
            discovery: Arc::new(StaticDiscovery::new(config.elliptics.nodes.clone())),
            metakey: Arc::new(UnavailableMetakeyClient),
            metadb: Arc::new(UnconfiguredMetaDb),
            inventory_worker: Arc::new(UnavailableInventoryWorker),
        }
    }
}

pub async fn run(config: Config) -> Result<()> {
    let collaborators = Collaborators::stand_ins(&config);
    run_with(config, collaborators).await
}

pub async fn run_with(config: Config, collaborators: Collaborators) -> Result<()> {
    let config = Arc::new(config);

    let inventory = Arc::new(Inventory::new(
        collaborators.metadb.clone(),
        collaborators.inventory_worker,
        config.infrastructure_dc_cache_valid_time,
        config.infrastructure_dc_cache_update_period,
        config.inventory_worker_timeout,
    ));
    inventory.download_initial().await;
    tokio::spawn(inventory.clone().run_refresh_loop());

    let ctx = RoundContext {
        config: config.clone(),
        fanout: StatsFanout::new(
            config.elliptics.monitor_port,
            config.elliptics.wait_timeout,
            config.worker_pool_size,
        ),
        discovery: collaborators.discovery,
        metakey: collaborators.metakey,
        metadb: collaborators.metadb,
        inventory,
    };

    let (collector, handle) = Collector::new(ctx);
    tokio::spawn(collector.run());

    let app = api::router(handle);
    let addr = SocketAddr::from(([0, 0, 0, 0], config.http.port));
    info!("{} API listening on http://{}", config.app_name, addr);

    let listener = tokio::net::TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind API server on port {}", config.http.port))?;

    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
            info!("Shutdown signal received.");
        })
        .await
        .context("API server failed")?;

    Ok(())
}
