// src/core/entity/job.rs

//! An active job bound to a group, ingested from the external job queue.

use crate::core::FleetmonError;
use serde_json::{Value, json};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum JobType {
    #[strum(serialize = "MOVE")]
    Move,
    #[strum(serialize = "RECOVER_DC")]
    RecoverDc,
    #[strum(serialize = "COUPLE_DEFRAG")]
    CoupleDefrag,
    #[strum(serialize = "RESTORE_GROUP")]
    RestoreGroup,
}

impl JobType {
    fn from_record(s: &str) -> Result<Self, FleetmonError> {
        match s {
            "move_job" => Ok(Self::Move),
            "recover_dc_job" => Ok(Self::RecoverDc),
            "couple_defrag_job" => Ok(Self::CoupleDefrag),
            "restore_group_job" => Ok(Self::RestoreGroup),
            other => Err(FleetmonError::SchemaMismatch(format!(
                "unknown job type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "SCREAMING_SNAKE_CASE")]
pub enum JobStatus {
    New,
    NotApproved,
    Executing,
    Pending,
    Broken,
    Completed,
    Cancelled,
}

impl JobStatus {
    fn from_record(s: &str) -> Result<Self, FleetmonError> {
        match s {
            "new" => Ok(Self::New),
            "not_approved" => Ok(Self::NotApproved),
            "executing" => Ok(Self::Executing),
            "pending" => Ok(Self::Pending),
            "broken" => Ok(Self::Broken),
            "completed" => Ok(Self::Completed),
            "cancelled" => Ok(Self::Cancelled),
            other => Err(FleetmonError::SchemaMismatch(format!(
                "unknown job status '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone)]
pub struct Job {
    id: String,
    kind: JobType,
    status: JobStatus,
    group_id: u64,
    timestamp: u64,
}

impl Job {
    /// Parses one job record as projected by the jobs query: `{id, status,
    /// group, type}`. An unknown enum string fails just this record.
    pub fn from_document(doc: &Value, timestamp: u64) -> Result<Self, FleetmonError> {
        let obj = doc
            .as_object()
            .ok_or_else(|| FleetmonError::SchemaMismatch("job record is not an object".into()))?;

        let id = obj
            .get("id")
            .and_then(Value::as_str)
            .ok_or_else(|| FleetmonError::SchemaMismatch("no job identifier".into()))?
            .to_string();
        if id.is_empty() {
            return Err(FleetmonError::SchemaMismatch("no job identifier".into()));
        }

        let group_id = obj.get("group").and_then(Value::as_u64).ok_or_else(|| {
            FleetmonError::SchemaMismatch("job record has no group id".into())
        })?;

        let status = JobStatus::from_record(
            obj.get("status")
                .and_then(Value::as_str)
                .ok_or_else(|| FleetmonError::SchemaMismatch("job record has no status".into()))?,
        )?;

        let kind = JobType::from_record(
            obj.get("type")
                .and_then(Value::as_str)
                .ok_or_else(|| FleetmonError::SchemaMismatch("job record has no type".into()))?,
        )?;

        Ok(Self {
            id,
            kind,
            status,
            group_id,
            timestamp,
        })
    }

    pub fn new(
        id: &str,
        kind: JobType,
        status: JobStatus,
        group_id: u64,
        timestamp: u64,
    ) -> Self {
        Self {
            id: id.to_string(),
            kind,
            status,
            group_id,
            timestamp,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn kind(&self) -> JobType {
        self.kind
    }

    pub fn status(&self) -> JobStatus {
        self.status
    }

    pub fn group_id(&self) -> u64 {
        self.group_id
    }

    pub fn timestamp(&self) -> u64 {
        self.timestamp
    }

    /// Content equality, ignoring the ingest timestamp.
    pub fn same_content(&self, other: &Job) -> bool {
        self.id == other.id
            && self.kind == other.kind
            && self.status == other.status
            && self.group_id == other.group_id
    }

    /// Folds another instance of this job in, monotonic on the ingest
    /// timestamp. Returns `true` when the local side was newer.
    pub fn merge(&mut self, other: &Job) -> bool {
        if self.timestamp > other.timestamp {
            return true;
        }
        if self.timestamp < other.timestamp {
            *self = other.clone();
        }
        false
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.id,
            "type": self.kind.to_string(),
            "status": self.status.to_string(),
            "group": self.group_id,
        })
    }
}
