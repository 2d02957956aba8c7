// src/core/inventory.rs

//! The host→DC inventory cache. Resolved mappings are persisted in a DB
//! collection and refreshed in the background; lookups hit the cache and
//! fall back to resolving through the inventory worker. A failed resolve
//! falls back to the host name itself.

use crate::core::FleetmonError;
use crate::core::collect::metadb::{InventoryRow, MetaDb};
use async_trait::async_trait;
use dashmap::DashMap;
use parking_lot::Mutex;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};
use tokio::time;
use tracing::{debug, error, info, warn};

#[async_trait]
pub trait InventoryWorker: Send + Sync {
    /// Resolves the data center a host lives in.
    async fn get_dc_by_host(&self, host: &str) -> Result<String, FleetmonError>;
}

/// Stand-in worker used when no inventory service is wired up.
pub struct UnavailableInventoryWorker;

#[async_trait]
impl InventoryWorker for UnavailableInventoryWorker {
    async fn get_dc_by_host(&self, _host: &str) -> Result<String, FleetmonError> {
        Err(FleetmonError::InventoryFailure(
            "inventory worker is not configured".to_string(),
        ))
    }
}

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs_f64())
        .unwrap_or(0.0)
}

pub struct Inventory {
    hosts: DashMap<String, InventoryRow>,
    metadb: Arc<dyn MetaDb>,
    worker: Arc<dyn InventoryWorker>,

    last_update_time: Mutex<f64>,

    cache_valid_time: Duration,
    update_period: Duration,
    worker_timeout: Duration,
}

impl Inventory {
    pub fn new(
        metadb: Arc<dyn MetaDb>,
        worker: Arc<dyn InventoryWorker>,
        cache_valid_time_secs: u64,
        update_period_secs: u64,
        worker_timeout_secs: u64,
    ) -> Self {
        Self {
            hosts: DashMap::new(),
            metadb,
            worker,
            last_update_time: Mutex::new(0.0),
            cache_valid_time: Duration::from_secs(cache_valid_time_secs),
            update_period: Duration::from_secs(update_period_secs),
            worker_timeout: Duration::from_secs(worker_timeout_secs),
        }
    }

    /// Startup load of the persisted cache. Rows older than the validity
    /// window are re-resolved and written back.
    pub async fn download_initial(&self) {
        info!("Inventory: performing initial download");
        let download_start = now_secs();
        let rows = self.load_hosts().await;
        for row in rows {
            let refreshed = row.timestamp >= download_start;
            let host = row.host.clone();
            self.hosts.insert(host, row.clone());
            if refreshed {
                self.persist(&row, false).await;
            }
        }
    }

    /// The background rescan: reloads the persisted cache periodically and
    /// re-resolves rows that went stale.
    pub async fn run_refresh_loop(self: Arc<Self>) {
        let mut timer = time::interval(self.update_period);
        timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);
        timer.tick().await;

        loop {
            timer.tick().await;
            info!("Inventory: reloading cache");

            let reload_start = now_secs();
            let rows = self.load_hosts().await;
            for row in rows {
                if row.timestamp >= reload_start {
                    self.persist(&row, true).await;
                }
                self.hosts.insert(row.host.clone(), row);
            }
        }
    }

    /// Cached lookup. A miss resolves through the worker and persists the
    /// fresh row; a failed resolve falls back to the host name itself.
    pub async fn get_dc(&self, host: &str) -> String {
        if let Some(row) = self.hosts.get(host) {
            debug!("Inventory: found host '{}' in map, DC is '{}'", host, row.dc);
            return row.dc.clone();
        }

        match self.resolve(host).await {
            Ok(dc) => {
                let row = InventoryRow {
                    host: host.to_string(),
                    dc: dc.clone(),
                    timestamp: now_secs(),
                };
                self.hosts.insert(host.to_string(), row.clone());
                self.persist(&row, false).await;
                dc
            }
            Err(e) => {
                warn!(
                    "Inventory: could not resolve DC for host {}: {}; defaulting DC=host",
                    host, e
                );
                host.to_string()
            }
        }
    }

    async fn resolve(&self, host: &str) -> Result<String, FleetmonError> {
        match time::timeout(self.worker_timeout, self.worker.get_dc_by_host(host)).await {
            Ok(result) => result,
            Err(_) => Err(FleetmonError::InventoryFailure(format!(
                "inventory worker timed out resolving '{host}'"
            ))),
        }
    }

    /// Loads rows newer than the last seen timestamp and re-resolves the
    /// ones that exceeded the validity window.
    async fn load_hosts(&self) -> Vec<InventoryRow> {
        let since = *self.last_update_time.lock();
        let documents = match self.metadb.inventory_since(since).await {
            Ok(documents) => documents,
            Err(e) => {
                warn!("Inventory: cannot load cache db: {}", e);
                return vec![];
            }
        };

        let now = now_secs();
        let mut rows = Vec::new();
        let mut max_seen = since;

        for document in &documents {
            match InventoryRow::from_document(document) {
                Ok(mut row) => {
                    max_seen = max_seen.max(row.timestamp);
                    let age = now - row.timestamp;
                    if age > self.cache_valid_time.as_secs_f64() {
                        if let Ok(dc) = self.resolve(&row.host).await {
                            row.dc = dc;
                            row.timestamp = now;
                        }
                    }
                    info!(
                        "Inventory: loaded DC '{}' for host '{}' (updated at {})",
                        row.dc, row.host, row.timestamp
                    );
                    rows.push(row);
                }
                Err(e) => error!("Inventory: bad row in cache db: {}", e),
            }
        }

        *self.last_update_time.lock() = max_seen;
        rows
    }

    async fn persist(&self, row: &InventoryRow, existing: bool) {
        if let Err(e) = self.metadb.upsert_inventory(row, existing).await {
            warn!("Inventory: cannot update cache db: {}", e);
        }
    }
}
