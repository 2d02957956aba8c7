// src/core/entity/group.rs

//! A group is a replica identity. Several backends across nodes may together
//! realize one group; the group's metakey binds it into a couple and a
//! namespace.

use super::job::Job;
use super::wall_clock_ns;
use crate::core::FleetmonError;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum GroupStatus {
    Init,
    Coupled,
    Bad,
    Broken,
    Ro,
    Migrating,
}

/// Fine-grained status used for change detection: transitions only fire when
/// the internal status actually changes, which keeps `update_time` and the
/// status text stable across identical rounds.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum GroupInternalStatus {
    #[strum(serialize = "INIT_Init")]
    Init,
    #[strum(serialize = "INIT_NoBackends")]
    NoBackends,
    #[strum(serialize = "INIT_MetadataFailed")]
    MetadataFailed,
    #[strum(serialize = "INIT_Uncoupled")]
    Uncoupled,
    #[strum(serialize = "BROKEN_DHTForbidden")]
    DhtForbidden,
    #[strum(serialize = "BAD_HaveOther")]
    HaveOther,
    #[strum(serialize = "BAD_ParseFailed")]
    ParseFailed,
    #[strum(serialize = "BAD_InconsistentCouple")]
    InconsistentCouple,
    #[strum(serialize = "BAD_DifferentMetadata")]
    DifferentMetadata,
    #[strum(serialize = "BAD_CoupleBAD")]
    CoupleBad,
    #[strum(serialize = "BAD_NoActiveJob")]
    NoActiveJob,
    #[strum(serialize = "MIGRATING_ServiceMigrating")]
    ServiceMigrating,
    #[strum(serialize = "RO_HaveROBackends")]
    HaveRoBackends,
    #[strum(serialize = "COUPLED_MetadataOK")]
    MetadataOk,
    #[strum(serialize = "COUPLED_Coupled")]
    Coupled,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum GroupType {
    Data,
    Cache,
    Unmarked,
}

/// Service-state fields of the group metakey.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ServiceMetadata {
    pub migrating: bool,
    pub job_id: String,
}

/// Parsed group metakey. Version 1 is a bare array of group ids; version 2 is
/// a map with explicit namespace, frozen flag, type, and service state.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct GroupMetadata {
    pub version: u64,
    pub frozen: bool,
    pub couple: Vec<u64>,
    pub namespace_name: String,
    pub type_label: String,
    pub service: ServiceMetadata,
}

impl GroupMetadata {
    /// Decodes a metakey payload. A bare array is the version-1 encoding with
    /// the namespace defaulting to "default".
    pub fn parse(raw: &[u8]) -> Result<Self, FleetmonError> {
        let value = rmpv::decode::read_value(&mut &raw[..])?;

        match value {
            rmpv::Value::Array(items) => {
                let mut couple = parse_couple_ids(&items)?;
                couple.sort_unstable();
                Ok(Self {
                    version: 1,
                    frozen: false,
                    couple,
                    namespace_name: "default".to_string(),
                    type_label: String::new(),
                    service: ServiceMetadata::default(),
                })
            }
            rmpv::Value::Map(entries) => {
                let mut metadata = Self::default();
                for (key, val) in &entries {
                    let Some(key) = key.as_str() else { continue };
                    match key {
                        "version" => {
                            metadata.version = val.as_u64().ok_or_else(|| {
                                FleetmonError::ParseFailure("invalid 'version' value".into())
                            })?;
                        }
                        "couple" => {
                            let items = val.as_array().ok_or_else(|| {
                                FleetmonError::ParseFailure("invalid 'couple' value".into())
                            })?;
                            metadata.couple = parse_couple_ids(items)?;
                            metadata.couple.sort_unstable();
                        }
                        "namespace" => {
                            metadata.namespace_name = val
                                .as_str()
                                .ok_or_else(|| {
                                    FleetmonError::ParseFailure(
                                        "invalid 'namespace' value".into(),
                                    )
                                })?
                                .to_string();
                        }
                        "frozen" => {
                            metadata.frozen = val.as_bool().ok_or_else(|| {
                                FleetmonError::ParseFailure("invalid 'frozen' value".into())
                            })?;
                        }
                        "type" => {
                            metadata.type_label = val
                                .as_str()
                                .ok_or_else(|| {
                                    FleetmonError::ParseFailure("invalid 'type' value".into())
                                })?
                                .to_string();
                        }
                        "service" => {
                            let entries = val.as_map().ok_or_else(|| {
                                FleetmonError::ParseFailure("invalid 'service' value".into())
                            })?;
                            for (srv_key, srv_val) in entries {
                                let Some(srv_key) = srv_key.as_str() else { continue };
                                match srv_key {
                                    "status" => {
                                        if srv_val.as_str() == Some("MIGRATING") {
                                            metadata.service.migrating = true;
                                        }
                                    }
                                    "job_id" => {
                                        metadata.service.job_id = srv_val
                                            .as_str()
                                            .ok_or_else(|| {
                                                FleetmonError::ParseFailure(
                                                    "invalid 'job_id' value".into(),
                                                )
                                            })?
                                            .to_string();
                                    }
                                    _ => {}
                                }
                            }
                        }
                        _ => {}
                    }
                }
                Ok(metadata)
            }
            other => Err(FleetmonError::ParseFailure(format!(
                "unexpected metakey encoding: {other}"
            ))),
        }
    }

    /// Rebuilds metadata from the `metadata_internal` section of a group's
    /// JSON projection.
    pub fn from_internal_json(value: &Value) -> Result<Self, FleetmonError> {
        let obj = value
            .as_object()
            .ok_or_else(|| FleetmonError::ParseFailure("metadata_internal is not an object".into()))?;

        let mut metadata = Self {
            version: obj.get("version").and_then(Value::as_u64).unwrap_or(0),
            frozen: obj.get("frozen").and_then(Value::as_bool).unwrap_or(false),
            couple: vec![],
            namespace_name: obj
                .get("namespace_name")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            type_label: obj
                .get("type")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string(),
            service: ServiceMetadata::default(),
        };

        if let Some(items) = obj.get("couple").and_then(Value::as_array) {
            for item in items {
                let id = item.as_u64().ok_or_else(|| {
                    FleetmonError::ParseFailure("metadata_internal couple id is not an integer".into())
                })?;
                metadata.couple.push(id);
            }
        }

        if let Some(service) = obj.get("service").and_then(Value::as_object) {
            metadata.service.migrating = service
                .get("migrating")
                .and_then(Value::as_bool)
                .unwrap_or(false);
            metadata.service.job_id = service
                .get("job_id")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
        }

        Ok(metadata)
    }
}

fn parse_couple_ids(items: &[rmpv::Value]) -> Result<Vec<u64>, FleetmonError> {
    let mut couple = Vec::with_capacity(items.len());
    for item in items {
        let id = item
            .as_u64()
            .ok_or_else(|| FleetmonError::ParseFailure("couple id is not an integer".into()))?;
        couple.push(id);
    }
    Ok(couple)
}

/// A view of one member backend used by the status cascade.
#[derive(Debug, Clone, Copy)]
pub struct BackendView {
    pub status: super::backend::BackendStatus,
    pub timestamp_us: u64,
}

#[derive(Debug, Clone)]
pub struct Group {
    id: u64,

    backend_keys: BTreeSet<String>,

    couple_key: Option<String>,
    namespace_name: Option<String>,

    clean: bool,
    metadata_file: Vec<u8>,
    update_time: u64,

    pub metadata: GroupMetadata,
    metadata_parsed: bool,
    metadata_parse_duration: u64,

    active_job: Option<Job>,

    group_type: GroupType,
    status: GroupStatus,
    internal_status: GroupInternalStatus,
    status_text: String,
}

impl Group {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            backend_keys: BTreeSet::new(),
            couple_key: None,
            namespace_name: None,
            clean: true,
            metadata_file: vec![],
            update_time: 0,
            metadata: GroupMetadata::default(),
            metadata_parsed: false,
            metadata_parse_duration: 0,
            active_job: None,
            group_type: GroupType::Data,
            status: GroupStatus::Init,
            internal_status: GroupInternalStatus::Init,
            status_text: String::new(),
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }

    pub fn status(&self) -> GroupStatus {
        self.status
    }

    pub fn internal_status(&self) -> GroupInternalStatus {
        self.internal_status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn group_type(&self) -> GroupType {
        self.group_type
    }

    pub fn update_time(&self) -> u64 {
        self.update_time
    }

    pub fn metadata_parsed(&self) -> bool {
        self.metadata_parsed
    }

    pub fn metadata_parse_duration(&self) -> u64 {
        self.metadata_parse_duration
    }

    pub fn couple_key(&self) -> Option<&str> {
        self.couple_key.as_deref()
    }

    pub fn set_couple_key(&mut self, key: Option<String>) {
        self.couple_key = key;
    }

    pub fn namespace_name(&self) -> Option<&str> {
        self.namespace_name.as_deref()
    }

    pub fn set_namespace_name(&mut self, name: Option<String>) {
        self.namespace_name = name;
    }

    pub fn backend_keys(&self) -> &BTreeSet<String> {
        &self.backend_keys
    }

    pub fn add_backend(&mut self, key: &str) {
        self.backend_keys.insert(key.to_string());
    }

    pub fn remove_backend(&mut self, key: &str) {
        self.backend_keys.remove(key);
    }

    pub fn clear_backends(&mut self) {
        self.backend_keys.clear();
    }

    pub fn has_backend(&self, key: &str) -> bool {
        self.backend_keys.contains(key)
    }

    pub fn active_job(&self) -> Option<&Job> {
        self.active_job.as_ref()
    }

    pub fn set_active_job(&mut self, job: Job) {
        self.active_job = Some(job);
    }

    pub fn clear_active_job(&mut self) {
        self.active_job = None;
    }

    /// Captures a downloaded metakey verbatim. Identical content leaves the
    /// group clean; fresh content is restamped with the wall clock so the
    /// merge sees it as newer.
    pub fn save_metadata(&mut self, data: &[u8], timestamp_ns: u64) {
        if timestamp_ns > self.update_time {
            self.update_time = timestamp_ns;
        }

        if self.clean && !self.metadata_file.is_empty() && self.metadata_file == data {
            return;
        }

        self.update_time = self.update_time.max(wall_clock_ns());
        self.metadata_file = data.to_vec();
        self.clean = false;
    }

    /// Records a failed metakey read. The parsed metadata is dropped so the
    /// group reads as metadata-less until the next successful download.
    pub fn handle_metadata_download_failed(&mut self, why: &str) {
        if self.internal_status != GroupInternalStatus::MetadataFailed {
            self.internal_status = GroupInternalStatus::MetadataFailed;
            self.status_text = format!("Metadata download failed: {why}");
            self.metadata.version = 0;
            self.metadata_parsed = false;
            self.clean = true;
        }
    }

    /// Parses the captured metakey if it changed since the last parse.
    /// Returns `false` when parsing failed and the group was marked BAD.
    pub fn parse_metadata(&mut self) -> bool {
        if self.clean {
            return true;
        }

        self.clean = true;
        self.metadata_parsed = false;

        let started = std::time::Instant::now();
        let parsed = GroupMetadata::parse(&self.metadata_file);
        self.metadata_parse_duration = started.elapsed().as_micros() as u64;

        match parsed {
            Ok(metadata) => {
                self.metadata = metadata;
                self.metadata_parsed = true;
                true
            }
            Err(e) => {
                self.status_text = format!("Could not parse group metadata: {e}");
                self.internal_status = GroupInternalStatus::ParseFailed;
                self.status = GroupStatus::Bad;
                false
            }
        }
    }

    /// Classifies the group as DATA, CACHE, or UNMARKED. Unversioned groups
    /// are recognized as cache groups by their backends' base paths.
    pub fn calculate_type<'a>(
        &mut self,
        cache_group_path_prefix: &str,
        base_paths: impl Iterator<Item = &'a str>,
    ) {
        if self.metadata.version == 0 {
            if !cache_group_path_prefix.is_empty() {
                for path in base_paths {
                    if path.starts_with(cache_group_path_prefix) {
                        self.group_type = GroupType::Unmarked;
                        return;
                    }
                }
            }
        } else if self.metadata.type_label == "cache" {
            self.group_type = GroupType::Cache;
            return;
        }
        self.group_type = GroupType::Data;
    }

    /// The ordered status cascade. Ties resolve toward the first matching
    /// clause; transitions advance `update_time` to the newest backend
    /// sample that drove them.
    pub fn update_status(&mut self, backends: &[BackendView], forbidden_dht_groups: bool) {
        use super::backend::BackendStatus;

        if backends.is_empty() {
            if self.internal_status != GroupInternalStatus::NoBackends {
                self.internal_status = GroupInternalStatus::NoBackends;
                self.status = GroupStatus::Init;
                self.status_text = "No node backends".to_string();
            }
            return;
        }

        let backend_ts = backends
            .iter()
            .map(|b| b.timestamp_us * 1000)
            .max()
            .unwrap_or(0);

        if backends.len() > 1 && forbidden_dht_groups {
            if self.internal_status != GroupInternalStatus::DhtForbidden {
                self.internal_status = GroupInternalStatus::DhtForbidden;
                self.status = GroupStatus::Broken;
                self.status_text = format!(
                    "DHT groups are forbidden but the group has {} backends",
                    backends.len()
                );
                self.bump_update_time(backend_ts);
            }
            return;
        }

        let have_ro = backends.iter().any(|b| b.status == BackendStatus::Ro);
        let have_other = backends
            .iter()
            .any(|b| b.status != BackendStatus::Ok && b.status != BackendStatus::Ro);

        if have_ro {
            if self.metadata.service.migrating {
                let job_matches = self
                    .active_job
                    .as_ref()
                    .is_some_and(|job| job.id() == self.metadata.service.job_id);
                if job_matches {
                    self.internal_status = GroupInternalStatus::ServiceMigrating;
                    self.status = GroupStatus::Migrating;
                    self.status_text = format!(
                        "Group is migrating, job id is '{}'",
                        self.metadata.service.job_id
                    );
                } else {
                    self.internal_status = GroupInternalStatus::NoActiveJob;
                    self.status = GroupStatus::Bad;
                    self.status_text = format!(
                        "Group has no active job, but marked as migrating with job id '{}'",
                        self.metadata.service.job_id
                    );
                }
            } else if self.internal_status != GroupInternalStatus::HaveRoBackends {
                self.bump_update_time(backend_ts);
                self.internal_status = GroupInternalStatus::HaveRoBackends;
                self.status = GroupStatus::Ro;
                self.status_text =
                    "Group is read-only because it has read-only backends".to_string();
            }
        } else if have_other {
            if self.internal_status != GroupInternalStatus::HaveOther {
                self.bump_update_time(backend_ts);
                self.internal_status = GroupInternalStatus::HaveOther;
                self.status = GroupStatus::Bad;
                self.status_text =
                    "Group is in state BAD because some of backends are not in state OK"
                        .to_string();
            }
        } else if self.metadata_parsed {
            self.status_text = "Group is OK".to_string();
            if !self.metadata.couple.is_empty() {
                if self.status != GroupStatus::Coupled {
                    self.internal_status = GroupInternalStatus::MetadataOk;
                    self.status = GroupStatus::Coupled;
                }
            } else {
                self.internal_status = GroupInternalStatus::Uncoupled;
                self.status = GroupStatus::Init;
            }
        }
    }

    /// Feedback from the couple check. Backend-driven and parse-driven
    /// verdicts are not overridden.
    pub fn set_coupled_status(&mut self, ok: bool, timestamp_ns: u64) {
        use GroupInternalStatus::*;
        if matches!(
            self.internal_status,
            DhtForbidden
                | HaveOther
                | ParseFailed
                | InconsistentCouple
                | DifferentMetadata
                | ServiceMigrating
                | HaveRoBackends
        ) {
            return;
        }

        let new_internal = if ok { Coupled } else { CoupleBad };
        if self.internal_status != new_internal {
            self.bump_update_time(timestamp_ns);
            self.internal_status = new_internal;
            self.status = if ok { GroupStatus::Coupled } else { GroupStatus::Bad };
            self.status_text = if ok {
                "Group is OK".to_string()
            } else {
                "Group is in state BAD because couple check fails".to_string()
            };
        }
    }

    /// Whether the conflict checks must skip this group (its metadata is not
    /// comparable yet).
    pub fn conflict_check_skipped(&self) -> bool {
        matches!(
            self.internal_status,
            GroupInternalStatus::Init
                | GroupInternalStatus::NoBackends
                | GroupInternalStatus::MetadataFailed
        )
    }

    /// Pure comparison of the couple lists of two groups.
    pub fn couple_equals(&self, other: &Group) -> bool {
        if self.conflict_check_skipped() || other.conflict_check_skipped() {
            return true;
        }
        self.metadata.couple == other.metadata.couple
    }

    /// Pure comparison of the replicated metadata fields of two groups.
    pub fn check_metadata_equals(&self, other: &Group) -> bool {
        if self.conflict_check_skipped() || other.conflict_check_skipped() {
            return true;
        }
        self.metadata.frozen == other.metadata.frozen
            && self.metadata.couple == other.metadata.couple
            && self.metadata.namespace_name == other.metadata.namespace_name
    }

    /// Marks this group BAD because a peer carries a different couple list.
    pub fn mark_inconsistent_couple(&mut self, other_id: u64, other_update_time: u64) {
        if self.internal_status != GroupInternalStatus::InconsistentCouple {
            self.bump_update_time(other_update_time);
            self.status_text = format!(
                "Groups {} and {} have inconsistent couple info",
                self.id, other_id
            );
            self.internal_status = GroupInternalStatus::InconsistentCouple;
            self.status = GroupStatus::Bad;
        }
    }

    /// Marks this group BAD because a peer carries different metadata.
    pub fn mark_different_metadata(&mut self, other_id: u64, other_update_time: u64) {
        if self.internal_status != GroupInternalStatus::DifferentMetadata {
            self.bump_update_time(other_update_time);
            self.status_text =
                format!("Groups {} and {} have different metadata", self.id, other_id);
            self.internal_status = GroupInternalStatus::DifferentMetadata;
            self.status = GroupStatus::Bad;
        }
    }

    fn bump_update_time(&mut self, timestamp_ns: u64) {
        if self.update_time < timestamp_ns {
            self.update_time = timestamp_ns;
        }
    }

    /// Folds another instance of this group in, monotonic on `update_time`.
    /// Returns `true` when the local side was strictly newer.
    pub fn merge(&mut self, other: &Group) -> bool {
        if self.update_time > other.update_time {
            return true;
        }
        if self.update_time == other.update_time {
            return false;
        }

        self.clean = other.clean;
        self.metadata_file = other.metadata_file.clone();
        self.update_time = other.update_time;
        self.metadata = other.metadata.clone();
        self.metadata_parsed = other.metadata_parsed;
        self.metadata_parse_duration = other.metadata_parse_duration;
        self.group_type = other.group_type;
        self.status_text = other.status_text.clone();
        self.status = other.status;
        self.internal_status = other.internal_status;
        false
    }

    pub fn to_json(&self, history: Option<&super::GroupHistoryEntry>, show_internals: bool) -> Value {
        let mut obj = json!({
            "id": self.id,
            "backends": self.backend_keys.iter().collect::<Vec<_>>(),
            "status_text": self.status_text,
            "status": self.status.to_string(),
            "type": self.group_type.to_string(),
        });

        if let Some(couple) = &self.couple_key {
            obj["couple"] = Value::String(couple.clone());
        }

        if self.metadata_parsed {
            obj["frozen"] = Value::Bool(self.metadata.frozen);
            obj["version"] = json!(self.metadata.version);
            obj["namespace"] = Value::String(self.metadata.namespace_name.clone());
            if self.metadata.service.migrating || !self.metadata.service.job_id.is_empty() {
                obj["service"] = json!({
                    "migrating": self.metadata.service.migrating,
                    "job_id": self.metadata.service.job_id,
                });
            }
        }

        if let Some(job) = &self.active_job {
            obj["active_job"] = json!({
                "type": job.kind().to_string(),
                "status": job.status().to_string(),
            });
        }

        if show_internals {
            obj["clean"] = Value::Bool(self.clean);
            obj["update_time"] = json!(self.update_time);
            obj["metadata_parsed"] = Value::Bool(self.metadata_parsed);
            obj["metadata_parse_duration"] = json!(self.metadata_parse_duration);
            obj["internal_status"] = Value::String(self.internal_status.to_string());
            let mut internal = json!({
                "version": self.metadata.version,
                "frozen": self.metadata.frozen,
                "couple": self.metadata.couple,
                "namespace_name": self.metadata.namespace_name,
                "service": {
                    "migrating": self.metadata.service.migrating,
                    "job_id": self.metadata.service.job_id,
                },
            });
            if !self.metadata.type_label.is_empty() {
                internal["type"] = Value::String(self.metadata.type_label.clone());
            }
            obj["metadata_internal"] = internal;
            if let Some(entry) = history {
                obj["history_backends"] = json!(entry.backends().iter().collect::<Vec<_>>());
            }
        }

        obj
    }

    /// Plain-text report used by the group info endpoint.
    pub fn info_text(&self) -> String {
        format!(
            "Group {{\n  id: {}\n  status: {}\n  status_text: {}\n  type: {}\n  couple: {}\n  \
             namespace: {}\n  backends: {}\n}}",
            self.id,
            self.status,
            self.status_text,
            self.group_type,
            self.couple_key.as_deref().unwrap_or("-"),
            self.namespace_name.as_deref().unwrap_or("-"),
            self.backend_keys.len()
        )
    }
}
