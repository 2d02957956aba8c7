// src/core/entity/history.rs

//! Group-topology history ingested from the external database. For every
//! group, the latest manually-created record wins and names the backend
//! addresses the group is expected to live on.

use crate::core::FleetmonError;
use serde_json::Value;
use std::collections::BTreeSet;

#[derive(Debug, Clone, Default)]
pub struct GroupHistoryEntry {
    group_id: u64,
    timestamp: f64,
    backends: BTreeSet<String>,
}

impl GroupHistoryEntry {
    /// Parses one history document: `{group_id, nodes: [{timestamp, type,
    /// set: [{backend_id, hostname, port, family}]}]}`. The newest record
    /// whose type is not "automatic" supplies the backend set.
    pub fn from_document(doc: &Value) -> Result<Self, FleetmonError> {
        let obj = doc.as_object().ok_or_else(|| {
            FleetmonError::SchemaMismatch("history record is not an object".into())
        })?;

        let group_id = obj.get("group_id").and_then(Value::as_u64).ok_or_else(|| {
            FleetmonError::SchemaMismatch("malformed group history entry: no group_id".into())
        })?;

        let mut entry = Self {
            group_id,
            timestamp: 0.0,
            backends: BTreeSet::new(),
        };

        if let Some(nodes) = obj.get("nodes").and_then(Value::as_array) {
            for record in nodes {
                entry.apply_record(record)?;
            }
        }

        Ok(entry)
    }

    fn apply_record(&mut self, record: &Value) -> Result<(), FleetmonError> {
        let obj = record.as_object().ok_or_else(|| {
            FleetmonError::SchemaMismatch("history record entry is not an object".into())
        })?;

        let timestamp = obj.get("timestamp").and_then(Value::as_f64).unwrap_or(0.0);
        let record_type = obj.get("type").and_then(Value::as_str).unwrap_or_default();

        let mut backends = BTreeSet::new();
        if let Some(set) = obj.get("set").and_then(Value::as_array) {
            for backend in set {
                backends.insert(Self::parse_backend(backend)?);
            }
        }

        if timestamp >= self.timestamp && record_type != "automatic" {
            self.timestamp = timestamp;
            self.backends = backends;
        }

        Ok(())
    }

    fn parse_backend(value: &Value) -> Result<String, FleetmonError> {
        let obj = value.as_object().ok_or_else(|| {
            FleetmonError::SchemaMismatch("history backend is not an object".into())
        })?;

        let backend_id = obj.get("backend_id").and_then(Value::as_u64).unwrap_or(0);
        let hostname = obj
            .get("hostname")
            .and_then(Value::as_str)
            .unwrap_or_default();
        let port = obj.get("port").and_then(Value::as_u64).unwrap_or(0);
        let family = obj.get("family").and_then(Value::as_u64).unwrap_or(0);

        if backend_id == 0 || hostname.is_empty() || port == 0 || family == 0 {
            return Err(FleetmonError::SchemaMismatch(
                "malformed group history entry: incomplete backend".into(),
            ));
        }

        Ok(format!("{hostname}:{port}:{family}/{backend_id}"))
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    pub fn timestamp(&self) -> f64 {
        self.timestamp
    }

    pub fn backends(&self) -> &BTreeSet<String> {
        &self.backends
    }

    /// An entry with no manually-created record carries nothing.
    pub fn empty(&self) -> bool {
        self.timestamp < 1.0
    }

    /// Folds another entry for the same group in, monotonic on the record
    /// timestamp. Returns `true` when the local side was newer.
    pub fn merge(&mut self, other: &GroupHistoryEntry) -> bool {
        if self.timestamp > other.timestamp {
            return true;
        }
        if self.timestamp < other.timestamp {
            self.timestamp = other.timestamp;
            self.backends = other.backends.clone();
        }
        false
    }
}
