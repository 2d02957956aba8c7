// src/core/collect/metadb.rs

//! External document-database ingestion: active jobs and group-topology
//! history. The database client is an external collaborator; this module
//! names its interface and parses its records, skipping malformed records
//! without failing the round.

use crate::core::FleetmonError;
use crate::core::entity::{GroupHistoryEntry, Job};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{error, info, warn};

/// Row of the persisted inventory collection.
#[derive(Debug, Clone)]
pub struct InventoryRow {
    pub host: String,
    pub dc: String,
    pub timestamp: f64,
}

impl InventoryRow {
    pub fn from_document(doc: &Value) -> Result<Self, FleetmonError> {
        let obj = doc.as_object().ok_or_else(|| {
            FleetmonError::SchemaMismatch("inventory row is not an object".into())
        })?;

        let row = Self {
            host: obj
                .get("host")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            dc: obj
                .get("dc")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            timestamp: obj.get("timestamp").and_then(Value::as_f64).unwrap_or(0.0),
        };

        if row.host.is_empty() || row.dc.is_empty() || row.timestamp == 0.0 {
            return Err(FleetmonError::SchemaMismatch(format!(
                "incomplete inventory row: host='{}' dc='{}' timestamp={}",
                row.host, row.dc, row.timestamp
            )));
        }

        Ok(row)
    }

    pub fn to_document(&self) -> Value {
        serde_json::json!({
            "host": self.host,
            "dc": self.dc,
            "timestamp": self.timestamp,
        })
    }
}

#[async_trait]
pub trait MetaDb: Send + Sync {
    /// Jobs whose status is neither completed nor cancelled, projected to
    /// `{id, status, group, type}`.
    async fn active_jobs(&self) -> Result<Vec<Value>, FleetmonError>;

    /// Group history entries with `nodes.timestamp` newer than `since`.
    async fn group_history_since(&self, since: f64) -> Result<Vec<Value>, FleetmonError>;

    /// Inventory rows with a timestamp newer than `since`.
    async fn inventory_since(&self, since: f64) -> Result<Vec<Value>, FleetmonError>;

    /// Inserts or updates one inventory row.
    async fn upsert_inventory(
        &self,
        row: &InventoryRow,
        existing: bool,
    ) -> Result<(), FleetmonError>;
}

/// Stand-in used when no metadata database is configured. Every call
/// reports the database as unavailable; rounds continue without that input.
pub struct UnconfiguredMetaDb;

#[async_trait]
impl MetaDb for UnconfiguredMetaDb {
    async fn active_jobs(&self) -> Result<Vec<Value>, FleetmonError> {
        Err(FleetmonError::ExternalDbUnavailable(
            "jobs database is not configured".to_string(),
        ))
    }

    async fn group_history_since(&self, _since: f64) -> Result<Vec<Value>, FleetmonError> {
        Err(FleetmonError::ExternalDbUnavailable(
            "history database is not configured".to_string(),
        ))
    }

    async fn inventory_since(&self, _since: f64) -> Result<Vec<Value>, FleetmonError> {
        Err(FleetmonError::ExternalDbUnavailable(
            "inventory database is not configured".to_string(),
        ))
    }

    async fn upsert_inventory(
        &self,
        _row: &InventoryRow,
        _existing: bool,
    ) -> Result<(), FleetmonError> {
        Err(FleetmonError::ExternalDbUnavailable(
            "inventory database is not configured".to_string(),
        ))
    }
}

/// Parses the active-jobs records, dropping records with unknown enum
/// strings record by record.
pub fn parse_jobs(records: &[Value], timestamp_ns: u64) -> Vec<Job> {
    let mut jobs = Vec::with_capacity(records.len());
    for record in records {
        match Job::from_document(record, timestamp_ns) {
            Ok(job) => jobs.push(job),
            Err(e) => error!("Failed to parse database record: {}\nrecord: {}", e, record),
        }
    }
    info!(
        "Successfully processed {} of {} active jobs",
        jobs.len(),
        records.len()
    );
    jobs
}

/// Parses group-history records, keeping only entries that carry a
/// manually-created backend set.
pub fn parse_group_history(records: &[Value]) -> Vec<GroupHistoryEntry> {
    let mut entries = Vec::new();
    for record in records {
        match GroupHistoryEntry::from_document(record) {
            Ok(entry) => {
                if !entry.empty() {
                    info!(
                        "Loaded group history entry: group {} with {} backends",
                        entry.group_id(),
                        entry.backends().len()
                    );
                    entries.push(entry);
                }
            }
            Err(e) => warn!(
                "Failed to parse history database record: {}\nrecord: {}",
                e, record
            ),
        }
    }
    entries
}
