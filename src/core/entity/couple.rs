// src/core/entity/couple.rs

//! A couple is an ordered tuple of groups replicating the same data, the
//! smallest unit of placement. Its status folds together the member groups'
//! verdicts, the namespace settings, and placement policy flags.

use super::group::GroupStatus;
use super::job::{Job, JobStatus, JobType};
use serde_json::{Value, json};
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
pub enum CoupleStatus {
    #[strum(serialize = "INIT")]
    Init,
    #[strum(serialize = "OK")]
    Ok,
    #[strum(serialize = "FULL")]
    Full,
    #[strum(serialize = "BAD")]
    Bad,
    #[strum(serialize = "BROKEN")]
    Broken,
    #[strum(serialize = "RO")]
    Ro,
    #[strum(serialize = "FROZEN")]
    Frozen,
    #[strum(serialize = "MIGRATING")]
    Migrating,
    #[strum(serialize = "SERVICE_ACTIVE")]
    ServiceActive,
    #[strum(serialize = "SERVICE_STALLED")]
    ServiceStalled,
}

/// The slice of one member group's state consumed by the couple status
/// cascade. Assembled by the storage graph, which owns the group map.
#[derive(Debug, Clone)]
pub struct CoupleGroupView {
    pub id: u64,
    pub status: GroupStatus,
    pub metadata_version: u64,
    pub frozen: bool,
    pub namespace_name: String,
    pub couple_list: Vec<u64>,
    /// Metadata conflicts are not assessed against groups that have not
    /// reported comparable metadata yet.
    pub conflict_skip: bool,
    pub total_space: u64,
    pub effective_space: u64,
    pub free_space: u64,
    pub full: bool,
    pub update_time: u64,
    pub active_job: Option<Job>,
    /// Deduplicated DCs of the group's backends, or the node key whose DC
    /// could not be resolved.
    pub dcs: Result<Vec<String>, String>,
}

/// Policy flags consumed by the couple cascade.
#[derive(Debug, Clone, Copy, Default)]
pub struct CouplePolicy {
    pub forbidden_dc_sharing_among_groups: bool,
    pub forbidden_ns_without_settings: bool,
    pub forbidden_unmatched_group_total_space: bool,
}

#[derive(Debug, Clone)]
pub struct Couple {
    key: String,
    group_ids: Vec<u64>,
    namespace_name: String,

    status: CoupleStatus,
    status_text: String,

    modified_time: u64,
    update_status_duration: u64,
}

impl Couple {
    pub fn new(group_ids: Vec<u64>, namespace_name: &str) -> Self {
        Self {
            key: Self::key_of(&group_ids),
            group_ids,
            namespace_name: namespace_name.to_string(),
            status: CoupleStatus::Init,
            status_text: String::new(),
            modified_time: 0,
            update_status_duration: 0,
        }
    }

    pub fn key_of(group_ids: &[u64]) -> String {
        group_ids
            .iter()
            .map(|id| id.to_string())
            .collect::<Vec<_>>()
            .join(":")
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn group_ids(&self) -> &[u64] {
        &self.group_ids
    }

    pub fn namespace_name(&self) -> &str {
        &self.namespace_name
    }

    pub fn status(&self) -> CoupleStatus {
        self.status
    }

    pub fn status_text(&self) -> &str {
        &self.status_text
    }

    pub fn modified_time(&self) -> u64 {
        self.modified_time
    }

    pub fn update_status_duration(&self) -> u64 {
        self.update_status_duration
    }

    pub fn check_groups(&self, group_ids: &[u64]) -> bool {
        self.group_ids == group_ids
    }

    /// The full status cascade over the member views.
    pub fn update_status(
        &mut self,
        members: &[CoupleGroupView],
        ns_reserved: f64,
        ns_has_default_settings: bool,
        policy: CouplePolicy,
    ) {
        let started = std::time::Instant::now();
        self.derive_status(members, ns_reserved, ns_has_default_settings, policy);
        self.update_status_duration = started.elapsed().as_micros() as u64;
    }

    fn derive_status(
        &mut self,
        members: &[CoupleGroupView],
        ns_reserved: f64,
        ns_has_default_settings: bool,
        policy: CouplePolicy,
    ) {
        for group in members {
            if group.metadata_version == 0 {
                self.status = CoupleStatus::Bad;
                self.status_text = format!("Group {} has empty metadata.", group.id);
                return;
            }
            if group.namespace_name != self.namespace_name {
                self.status = CoupleStatus::Bad;
                self.status_text = format!(
                    "Couple's namespace '{}' doesn't match group's namespace '{}'.",
                    self.namespace_name, group.namespace_name
                );
                return;
            }
        }

        for group in members.iter().skip(1) {
            if metadata_conflict(&members[0], group) {
                self.status = CoupleStatus::Bad;
                self.status_text = format!(
                    "Groups {} and {} have different metadata.",
                    members[0].id, group.id
                );
                self.account_job_in_status(members);
                return;
            }
        }

        if let Some(frozen) = members.iter().find(|g| g.frozen) {
            self.status = CoupleStatus::Frozen;
            self.status_text = format!("Group {} is frozen.", frozen.id);
            return;
        }

        if policy.forbidden_dc_sharing_among_groups && !self.check_dc_sharing(members) {
            return;
        }

        if policy.forbidden_ns_without_settings && ns_has_default_settings {
            self.status = CoupleStatus::Broken;
            self.status_text = format!(
                "Couple {} is assigned to namespace '{}' which is not set up",
                self.key, self.namespace_name
            );
            return;
        }

        let nr_coupled = members
            .iter()
            .filter(|g| g.status == GroupStatus::Coupled)
            .count();
        if nr_coupled == members.len() {
            if policy.forbidden_unmatched_group_total_space {
                for group in members.iter().skip(1) {
                    if group.total_space != members[0].total_space {
                        self.status = CoupleStatus::Broken;
                        self.status_text = format!(
                            "Couple {} has unequal total space in groups {} and {}.",
                            self.key, members[0].id, group.id
                        );
                        return;
                    }
                }
            }
            if is_full(members, ns_reserved) {
                self.status = CoupleStatus::Full;
                self.status_text = format!("Couple {} is full.", self.key);
            } else {
                self.status = CoupleStatus::Ok;
                self.status_text = format!("Couple {} is OK.", self.key);
            }
            return;
        }

        if let Some(group) = members.iter().find(|g| g.status == GroupStatus::Init) {
            self.status = CoupleStatus::Init;
            self.status_text =
                format!("Couple {} has uninitialized group {}.", self.key, group.id);
        } else if let Some(group) = members.iter().find(|g| g.status == GroupStatus::Broken) {
            self.status = CoupleStatus::Broken;
            self.status_text = format!("Couple {} has broken group {}.", self.key, group.id);
        } else if let Some(group) = members.iter().find(|g| g.status == GroupStatus::Bad) {
            self.status = CoupleStatus::Bad;
            self.status_text = format!("Couple {} has bad group {}.", self.key, group.id);
        } else if let Some(group) = members.iter().find(|g| {
            g.status == GroupStatus::Ro || g.status == GroupStatus::Migrating
        }) {
            self.status = CoupleStatus::Bad;
            self.status_text =
                format!("Couple {} has read-only group {}.", self.key, group.id);
        } else {
            self.status = CoupleStatus::Bad;
            self.status_text = format!("Couple {} is bad for unknown reason.", self.key);
        }

        self.account_job_in_status(members);
    }

    /// A BAD couple whose member carries an active service job reads as
    /// SERVICE_ACTIVE (job running) or SERVICE_STALLED (job stuck) instead.
    fn account_job_in_status(&mut self, members: &[CoupleGroupView]) -> bool {
        if self.status != CoupleStatus::Bad {
            return false;
        }

        for group in members {
            if let Some(job) = &group.active_job {
                if job.kind() != JobType::Move && job.kind() != JobType::RestoreGroup {
                    return false;
                }

                if job.status() == JobStatus::New || job.status() == JobStatus::Executing {
                    self.status = CoupleStatus::ServiceActive;
                    self.status_text = format!("Couple has active job {}", job.id());
                } else {
                    self.status = CoupleStatus::ServiceStalled;
                    self.status_text = format!("Couple has stalled job {}", job.id());
                }

                if self.modified_time < group.update_time {
                    self.modified_time = group.update_time;
                }
                return true;
            }
        }

        false
    }

    /// Verifies that no DC hosts backends of more than one member group.
    /// Returns `false` when the couple was marked degraded.
    fn check_dc_sharing(&mut self, members: &[CoupleGroupView]) -> bool {
        let mut all_dcs: Vec<&String> = Vec::new();

        for group in members {
            match &group.dcs {
                Ok(dcs) => all_dcs.extend(dcs.iter()),
                Err(node_key) => {
                    self.status = CoupleStatus::Bad;
                    self.status_text = format!(
                        "Group {}: Failed to resolve DC for node {}",
                        group.id, node_key
                    );
                    return false;
                }
            }
        }

        let total = all_dcs.len();
        all_dcs.sort();
        all_dcs.dedup();
        if all_dcs.len() != total {
            self.status = CoupleStatus::Broken;
            self.status_text = "Couple has nodes sharing the same DC".to_string();
            return false;
        }

        true
    }

    /// Folds another instance of this couple in, monotonic on
    /// `modified_time`. Returns `true` when the local side was newer.
    pub fn merge(&mut self, other: &Couple) -> bool {
        if self.modified_time > other.modified_time {
            return true;
        }

        self.status = other.status;
        self.status_text = other.status_text.clone();
        self.update_status_duration = other.update_status_duration;
        self.modified_time = other.modified_time;
        false
    }

    pub fn to_json(
        &self,
        members: &[CoupleGroupView],
        ns_reserved: f64,
        show_internals: bool,
    ) -> Value {
        let mut obj = json!({
            "id": self.key,
            "groups": self.group_ids,
            "effective_space": effective_space(members, ns_reserved),
            "effective_free_space": effective_free_space(members, ns_reserved),
            "status": self.status.to_string(),
            "status_text": self.status_text,
        });

        if show_internals {
            obj["update_status_duration"] = json!(self.update_status_duration);
            obj["modified_time"] = json!(self.modified_time);
        }

        obj
    }
}

/// Frozen flag, couple list, or namespace diverging between two comparable
/// members is a metadata conflict.
fn metadata_conflict(a: &CoupleGroupView, b: &CoupleGroupView) -> bool {
    if a.conflict_skip || b.conflict_skip {
        return false;
    }
    a.frozen != b.frozen
        || a.couple_list != b.couple_list
        || a.namespace_name != b.namespace_name
}

/// Couple effective space: the weakest member scaled down by the namespace
/// reserve, rounded with `floor`.
pub fn effective_space(members: &[CoupleGroupView], ns_reserved: f64) -> u64 {
    let Some(min_effective) = members.iter().map(|g| g.effective_space).min() else {
        return 0;
    };
    (min_effective as f64 * (1.0 - ns_reserved)).floor() as u64
}

/// Free space still usable by clients once the reserve is honoured.
pub fn effective_free_space(members: &[CoupleGroupView], ns_reserved: f64) -> u64 {
    if members.is_empty() {
        return 0;
    }

    let min_free = members.iter().map(|g| g.free_space).min().unwrap_or(0);
    let min_total = members.iter().map(|g| g.total_space).min().unwrap_or(0);
    let effective = effective_space(members, ns_reserved);

    min_free.saturating_sub(min_total.saturating_sub(effective))
}

/// A couple is full when any member group is full or no effective free space
/// remains.
pub fn is_full(members: &[CoupleGroupView], ns_reserved: f64) -> bool {
    if members.iter().any(|g| g.full) {
        return true;
    }
    effective_free_space(members, ns_reserved) == 0
}
