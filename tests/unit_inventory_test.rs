use async_trait::async_trait;
use fleetmon::core::FleetmonError;
use fleetmon::core::collect::metadb::{InventoryRow, MetaDb};
use fleetmon::core::inventory::{Inventory, InventoryWorker, UnavailableInventoryWorker};
use parking_lot::Mutex;
use serde_json::{Value, json};
use std::sync::Arc;
use std::time::{SystemTime, UNIX_EPOCH};

fn now_secs() -> f64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap()
        .as_secs_f64()
}

struct FakeMetaDb {
    rows: Vec<Value>,
    upserts: Mutex<Vec<InventoryRow>>,
}

impl FakeMetaDb {
    fn new(rows: Vec<Value>) -> Self {
        Self {
            rows,
            upserts: Mutex::new(vec![]),
        }
    }
}

#[async_trait]
impl MetaDb for FakeMetaDb {
    async fn active_jobs(&self) -> Result<Vec<Value>, FleetmonError> {
        Ok(vec![])
    }

    async fn group_history_since(&self, _since: f64) -> Result<Vec<Value>, FleetmonError> {
        Ok(vec![])
    }

    async fn inventory_since(&self, since: f64) -> Result<Vec<Value>, FleetmonError> {
        Ok(self
            .rows
            .iter()
            .filter(|row| row["timestamp"].as_f64().unwrap_or(0.0) > since)
            .cloned()
            .collect())
    }

    async fn upsert_inventory(
        &self,
        row: &InventoryRow,
        _existing: bool,
    ) -> Result<(), FleetmonError> {
        self.upserts.lock().push(row.clone());
        Ok(())
    }
}

struct FixedWorker(&'static str);

#[async_trait]
impl InventoryWorker for FixedWorker {
    async fn get_dc_by_host(&self, _host: &str) -> Result<String, FleetmonError> {
        Ok(self.0.to_string())
    }
}

fn inventory(metadb: Arc<dyn MetaDb>, worker: Arc<dyn InventoryWorker>) -> Inventory {
    Inventory::new(metadb, worker, 604_800, 150, 1)
}

#[tokio::test]
async fn test_initial_download_caches_fresh_rows() {
    let metadb = Arc::new(FakeMetaDb::new(vec![json!({
        "host": "node1.storage",
        "dc": "alpha",
        "timestamp": now_secs(),
    })]));
    let inv = inventory(metadb, Arc::new(FixedWorker("resolved")));

    inv.download_initial().await;
    assert_eq!(inv.get_dc("node1.storage").await, "alpha");
}

#[tokio::test]
async fn test_stale_rows_are_re_resolved_on_load() {
    let metadb = Arc::new(FakeMetaDb::new(vec![json!({
        "host": "node1.storage",
        "dc": "ancient",
        "timestamp": 1.0,
    })]));
    let inv = inventory(metadb.clone(), Arc::new(FixedWorker("fresh-dc")));

    inv.download_initial().await;
    assert_eq!(inv.get_dc("node1.storage").await, "fresh-dc");
    // The refreshed row was written back.
    assert!(metadb.upserts.lock().iter().any(|r| r.dc == "fresh-dc"));
}

#[tokio::test]
async fn test_cache_miss_resolves_and_persists() {
    let metadb = Arc::new(FakeMetaDb::new(vec![]));
    let inv = inventory(metadb.clone(), Arc::new(FixedWorker("beta")));

    inv.download_initial().await;
    assert_eq!(inv.get_dc("node9.storage").await, "beta");

    let upserts = metadb.upserts.lock();
    assert_eq!(upserts.len(), 1);
    assert_eq!(upserts[0].host, "node9.storage");
    assert_eq!(upserts[0].dc, "beta");

    // The second lookup is served from the cache.
    drop(upserts);
    assert_eq!(inv.get_dc("node9.storage").await, "beta");
    assert_eq!(metadb.upserts.lock().len(), 1);
}

#[tokio::test]
async fn test_failed_resolve_falls_back_to_the_host_name() {
    let metadb = Arc::new(FakeMetaDb::new(vec![]));
    let inv = inventory(metadb, Arc::new(UnavailableInventoryWorker));

    inv.download_initial().await;
    assert_eq!(inv.get_dc("node1.storage").await, "node1.storage");
}
