// src/core/storage/mod.rs

//! The in-memory storage graph: entity maps, the status-update cascade, and
//! the shadow→live merge.
//!
//! Rounds operate on a *shadow* graph (a clone of the live one) and promote
//! their result with [`Storage::merge`], which is the only writer to the
//! live graph. Merge folds entity by entity, monotonic on each entity's
//! timestamp, and reports whether the live side held anything newer.

mod select;
mod snapshot;

pub use select::Entries;

use crate::config::Config;
use crate::core::entity::couple::{CoupleGroupView, CouplePolicy};
use crate::core::entity::group::BackendView;
use crate::core::entity::{
    Backend, Couple, Group, GroupHistoryEntry, GroupStatus, Host, Job, Namespace, Node,
};
use crate::core::stats::ParsedStats;
use std::collections::BTreeMap;
use tracing::{debug, error, info, warn};

#[derive(Debug, Clone, Default)]
pub struct Storage {
    nodes: BTreeMap<String, Node>,
    groups: BTreeMap<u64, Group>,
    couples: BTreeMap<String, Couple>,
    namespaces: BTreeMap<String, Namespace>,

    jobs: BTreeMap<u64, Job>,
    jobs_timestamp: u64,
    new_jobs: Vec<Job>,

    group_history: BTreeMap<u64, GroupHistoryEntry>,
    group_history_ts: f64,

    hosts: BTreeMap<String, Host>,
}

impl Storage {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn nodes(&self) -> &BTreeMap<String, Node> {
        &self.nodes
    }

    pub fn groups(&self) -> &BTreeMap<u64, Group> {
        &self.groups
    }

    pub fn couples(&self) -> &BTreeMap<String, Couple> {
        &self.couples
    }

    pub fn namespaces(&self) -> &BTreeMap<String, Namespace> {
        &self.namespaces
    }

    pub fn jobs(&self) -> &BTreeMap<u64, Job> {
        &self.jobs
    }

    pub fn group_history(&self) -> &BTreeMap<u64, GroupHistoryEntry> {
        &self.group_history
    }

    pub fn group_history_ts(&self) -> f64 {
        self.group_history_ts
    }

    pub fn hosts(&self) -> &BTreeMap<String, Host> {
        &self.hosts
    }

    pub fn node(&self, key: &str) -> Option<&Node> {
        self.nodes.get(key)
    }

    pub fn node_mut(&mut self, key: &str) -> Option<&mut Node> {
        self.nodes.get_mut(key)
    }

    pub fn group(&self, id: u64) -> Option<&Group> {
        self.groups.get(&id)
    }

    pub fn group_mut(&mut self, id: u64) -> Option<&mut Group> {
        self.groups.get_mut(&id)
    }

    /// Registers a node discovered from the configured cluster. Nodes are
    /// never destroyed while configured.
    pub fn add_node(&mut self, host: &str, port: u16, family: u32) {
        let key = Node::key_of(host, port, family);
        if self.nodes.contains_key(&key) {
            debug!("Node {} already exists", key);
            return;
        }
        info!("New node {}", key);
        self.nodes.insert(key.clone(), Node::new(host, port, family));
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Host::new(host));
    }

    /// Records the resolved DC of a host.
    pub fn set_host_dc(&mut self, host: &str, dc: &str) {
        self.hosts
            .entry(host.to_string())
            .or_insert_with(|| Host::new(host))
            .set_dc(dc);
    }

    /// Integrates one node's parsed monitor payload into the graph.
    pub fn ingest_node_stats(&mut self, node_key: &str, stats: ParsedStats, config: &Config) {
        let Some(node) = self.nodes.get_mut(node_key) else {
            warn!("Dropping stats for unknown node {}", node_key);
            return;
        };

        node.update(stats.node);
        for backend_stat in stats.backends {
            node.handle_backend(backend_stat, config.reserved_space);
        }
    }

    /// Rebuilds the backend→group membership from the node maps, creating
    /// groups on the first backend that names them.
    pub fn update_group_structure(&mut self) {
        for group in self.groups.values_mut() {
            group.clear_backends();
        }

        for node in self.nodes.values() {
            for backend in node.backends().values() {
                let group_id = backend.group_id();
                self.groups
                    .entry(group_id)
                    .or_insert_with(|| Group::new(group_id))
                    .add_backend(backend.key());
            }
        }
    }

    /// Stages the jobs of this round; [`Storage::process_new_jobs`] folds
    /// them into the graph.
    pub fn save_new_jobs(&mut self, jobs: Vec<Job>, timestamp_ns: u64) {
        debug_assert!(self.jobs_timestamp <= timestamp_ns);
        self.new_jobs = jobs;
        self.jobs_timestamp = timestamp_ns;
    }

    /// Reconciles the job map with the staged jobs: departed jobs unbind
    /// from their groups, fresh jobs replace or join.
    pub fn process_new_jobs(&mut self) {
        let fresh: BTreeMap<u64, Job> = std::mem::take(&mut self.new_jobs)
            .into_iter()
            .map(|job| (job.group_id(), job))
            .collect();

        let stale: Vec<u64> = self
            .jobs
            .keys()
            .filter(|group_id| !fresh.contains_key(group_id))
            .copied()
            .collect();
        for group_id in stale {
            self.jobs.remove(&group_id);
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.clear_active_job();
            }
        }

        for (group_id, job) in fresh {
            self.jobs.insert(group_id, job);
        }
    }

    /// Folds freshly read group-history entries in, newest record per group
    /// winning.
    pub fn save_group_history(&mut self, entries: Vec<GroupHistoryEntry>, timestamp: f64) {
        for entry in entries {
            if entry.empty() {
                continue;
            }
            match self.group_history.get_mut(&entry.group_id()) {
                Some(existing) => {
                    existing.merge(&entry);
                }
                None => {
                    self.group_history.insert(entry.group_id(), entry);
                }
            }
        }
        self.group_history_ts = timestamp;
    }

    /// The status-update cascade: filesystems, then groups (job binding,
    /// namespace reattachment, metadata parsing), then couple creation on
    /// metadata quorum, then couple statuses with feedback into groups.
    pub fn update(&mut self, config: &Config) {
        info!("Storage: updating filesystems, groups, and couples");

        for node in self.nodes.values_mut() {
            node.update_filesystems();
        }

        self.update_groups(config);
        self.update_couple_structure(config);
        self.update_couples(config);

        info!("Storage update completed");
    }

    fn update_groups(&mut self, config: &Config) {
        let group_ids: Vec<u64> = self.groups.keys().copied().collect();

        for group_id in group_ids {
            let job = self.jobs.get(&group_id).cloned();
            let Some(group) = self.groups.get_mut(&group_id) else {
                continue;
            };

            match job {
                Some(job) => group.set_active_job(job),
                None => group.clear_active_job(),
            }

            let old_namespace = group.namespace_name().map(str::to_string);

            if !group.parse_metadata() {
                continue;
            }

            let new_namespace = if group.metadata_parsed() {
                group.metadata.namespace_name.clone()
            } else {
                old_namespace.clone().unwrap_or_default()
            };

            if old_namespace.as_deref().unwrap_or("") != new_namespace {
                if let Some(old) = &old_namespace {
                    if let Some(ns) = self.namespaces.get_mut(old) {
                        ns.remove_group(group_id);
                    }
                }
                if new_namespace.is_empty() {
                    group.set_namespace_name(None);
                } else {
                    self.namespaces
                        .entry(new_namespace.clone())
                        .or_insert_with(|| Namespace::new(&new_namespace))
                        .add_group(group_id);
                    group.set_namespace_name(Some(new_namespace));
                }
            }

            // Uncoupled metadata drops the couple binding.
            if group.metadata_parsed() && group.metadata.couple.is_empty() {
                group.set_couple_key(None);
            }

            let base_paths: Vec<String> = group
                .backend_keys()
                .iter()
                .filter_map(|key| find_backend(&self.nodes, key))
                .map(|backend| backend.stat.base_path.clone())
                .collect();
            group.calculate_type(
                &config.cache.group_path_prefix,
                base_paths.iter().map(String::as_str),
            );

            let backends = backend_views(&self.nodes, group.backend_keys());
            group.update_status(&backends, config.forbidden_dht_groups);
        }
    }

    /// Creates couples for groups whose parsed metadata agrees, creating
    /// INIT placeholders for referenced groups that have no backends yet,
    /// and dissolves couples no member references anymore.
    fn update_couple_structure(&mut self, config: &Config) {
        let group_ids: Vec<u64> = self.groups.keys().copied().collect();

        for group_id in group_ids {
            let Some(group) = self.groups.get(&group_id) else { continue };
            if !group.metadata_parsed() {
                continue;
            }
            let member_ids = group.metadata.couple.clone();
            if member_ids.is_empty() {
                continue;
            }

            // Referenced groups appear as INIT placeholders until their
            // backends show up.
            for member_id in &member_ids {
                if !self.groups.contains_key(member_id) {
                    let mut placeholder = Group::new(*member_id);
                    placeholder.update_status(&[], config.forbidden_dht_groups);
                    self.groups.insert(*member_id, placeholder);
                }
            }

            let couple_key = Couple::key_of(&member_ids);

            let all_bound = member_ids.iter().all(|id| {
                self.groups
                    .get(id)
                    .is_some_and(|g| g.couple_key() == Some(couple_key.as_str()))
            });
            if all_bound {
                continue;
            }

            // Metadata quorum: every member must carry the same couple list.
            let mut quorum = true;
            for member_id in member_ids.iter().skip(1) {
                let (Some(first), Some(member)) = (
                    self.groups.get(&member_ids[0]),
                    self.groups.get(member_id),
                ) else {
                    quorum = false;
                    break;
                };
                if !first.couple_equals(member) {
                    let other_update_time = member.update_time();
                    let other_id = *member_id;
                    if let Some(first) = self.groups.get_mut(&member_ids[0]) {
                        first.mark_inconsistent_couple(other_id, other_update_time);
                    }
                    quorum = false;
                    break;
                }
            }
            if !quorum {
                continue;
            }

            let namespace_name = self
                .groups
                .get(&member_ids[0])
                .and_then(|g| g.namespace_name())
                .unwrap_or("default")
                .to_string();

            if !self.couples.contains_key(&couple_key) {
                debug!("New couple {}", couple_key);
                self.couples.insert(
                    couple_key.clone(),
                    Couple::new(member_ids.clone(), &namespace_name),
                );
            }
            self.namespaces
                .entry(namespace_name.clone())
                .or_insert_with(|| Namespace::new(&namespace_name))
                .add_couple(&couple_key);

            for member_id in &member_ids {
                if let Some(member) = self.groups.get_mut(member_id) {
                    member.set_couple_key(Some(couple_key.clone()));
                }
            }
        }

        // A couple survives only while some member still points at it.
        let groups = &self.groups;
        let mut dissolved: Vec<String> = Vec::new();
        self.couples.retain(|key, couple| {
            let referenced = couple.group_ids().iter().any(|id| {
                groups
                    .get(id)
                    .is_some_and(|g| g.couple_key() == Some(key.as_str()))
            });
            if !referenced {
                dissolved.push(key.clone());
            }
            referenced
        });
        for key in dissolved {
            info!("Couple {} dissolved", key);
            for ns in self.namespaces.values_mut() {
                ns.remove_couple(&key);
            }
        }
    }

    fn update_couples(&mut self, config: &Config) {
        let policy = CouplePolicy {
            forbidden_dc_sharing_among_groups: config.forbidden_dc_sharing_among_groups,
            forbidden_ns_without_settings: config.forbidden_ns_without_settings,
            forbidden_unmatched_group_total_space: config.forbidden_unmatched_group_total_space,
        };

        let couple_keys: Vec<String> = self.couples.keys().cloned().collect();
        for couple_key in couple_keys {
            let Some(couple) = self.couples.get(&couple_key) else { continue };
            let member_ids = couple.group_ids().to_vec();
            let namespace_name = couple.namespace_name().to_string();

            // Divergent metadata marks the affected members as well.
            for member_id in member_ids.iter().skip(1) {
                let (Some(first), Some(member)) = (
                    self.groups.get(&member_ids[0]),
                    self.groups.get(member_id),
                ) else {
                    continue;
                };
                if !first.check_metadata_equals(member) {
                    let first_time = first.update_time();
                    let member_time = member.update_time();
                    let (first_id, other_id) = (member_ids[0], *member_id);
                    if let Some(first) = self.groups.get_mut(&first_id) {
                        first.mark_different_metadata(other_id, member_time);
                    }
                    if let Some(member) = self.groups.get_mut(&other_id) {
                        member.mark_different_metadata(first_id, first_time);
                    }
                }
            }

            let members =
                member_views(&self.groups, &self.nodes, &self.hosts, &member_ids);
            let (ns_reserved, ns_default) = self
                .namespaces
                .get(&namespace_name)
                .map(|ns| (ns.settings.reserved_space_fraction, ns.default_settings()))
                .unwrap_or((0.0, true));

            if let Some(couple) = self.couples.get_mut(&couple_key) {
                couple.update_status(&members, ns_reserved, ns_default, policy);
            }
        }
    }

    /// A couple's member views, as consumed by the status cascade and the
    /// snapshot projection.
    pub fn couple_member_views(&self, couple: &Couple) -> Vec<CoupleGroupView> {
        member_views(&self.groups, &self.nodes, &self.hosts, couple.group_ids())
    }

    /// The namespace reserve fraction a couple is subject to.
    pub fn namespace_reserved_fraction(&self, couple: &Couple) -> f64 {
        self.namespaces
            .get(couple.namespace_name())
            .map(|ns| ns.settings.reserved_space_fraction)
            .unwrap_or(0.0)
    }

    /// Merges a shadow graph into this one. Fixed order: nodes, group
    /// structure, groups, jobs, couples. Returns `true` when this side held
    /// state newer than the incoming shadow.
    pub fn merge(&mut self, other: &Storage) -> bool {
        let mut have_newer = false;

        self.merge_nodes(other, &mut have_newer);
        self.update_group_structure();
        self.merge_groups(other, &mut have_newer);
        self.merge_jobs(other, &mut have_newer);
        self.merge_couples(other, &mut have_newer);
        self.merge_history(other);
        self.merge_hosts(other, &mut have_newer);
        self.rebuild_namespaces(other);

        have_newer
    }

    fn merge_nodes(&mut self, other: &Storage, have_newer: &mut bool) {
        for (key, other_node) in &other.nodes {
            match self.nodes.get_mut(key) {
                Some(node) => {
                    if node.merge(other_node) {
                        *have_newer = true;
                    }
                }
                None => {
                    self.nodes.insert(key.clone(), other_node.clone());
                }
            }
        }
        if self.nodes.len() > other.nodes.len() {
            *have_newer = true;
        }
    }

    fn merge_groups(&mut self, other: &Storage, have_newer: &mut bool) {
        for (id, other_group) in &other.groups {
            match self.groups.get_mut(id) {
                Some(group) => {
                    if group.merge(other_group) {
                        *have_newer = true;
                    }
                }
                None => {
                    let mut group = Group::new(*id);
                    group.merge(other_group);
                    group.set_couple_key(other_group.couple_key().map(str::to_string));
                    group
                        .set_namespace_name(other_group.namespace_name().map(str::to_string));
                    self.groups.insert(*id, group);
                }
            }
        }
        if self.groups.len() > other.groups.len() {
            *have_newer = true;
        }
    }

    fn merge_jobs(&mut self, other: &Storage, have_newer: &mut bool) {
        if self.jobs_timestamp > other.jobs_timestamp {
            if self.jobs.len() != other.jobs.len() {
                *have_newer = true;
                return;
            }
            let identical = self
                .jobs
                .iter()
                .zip(other.jobs.iter())
                .all(|((my_id, my_job), (other_id, other_job))| {
                    my_id == other_id && my_job.same_content(other_job)
                });
            if !identical {
                *have_newer = true;
            }
            return;
        }

        if self.jobs_timestamp == other.jobs_timestamp {
            return;
        }

        let stale: Vec<u64> = self
            .jobs
            .keys()
            .filter(|group_id| !other.jobs.contains_key(group_id))
            .copied()
            .collect();
        for group_id in stale {
            self.jobs.remove(&group_id);
            if let Some(group) = self.groups.get_mut(&group_id) {
                group.clear_active_job();
            }
        }

        for (group_id, other_job) in &other.jobs {
            match self.jobs.get_mut(group_id) {
                Some(job) => {
                    job.merge(other_job);
                }
                None => {
                    self.jobs.insert(*group_id, other_job.clone());
                }
            }
        }

        self.jobs_timestamp = other.jobs_timestamp;
    }

    fn merge_couples(&mut self, other: &Storage, have_newer: &mut bool) {
        for (key, other_couple) in &other.couples {
            match self.couples.get_mut(key) {
                Some(couple) => {
                    if couple.merge(other_couple) {
                        *have_newer = true;
                    }
                }
                None => {
                    for id in other_couple.group_ids() {
                        if !self.groups.contains_key(id) {
                            error!(
                                "Merge storage: internal inconsistency: have no group {} for couple",
                                id
                            );
                        }
                    }
                    let mut couple = Couple::new(
                        other_couple.group_ids().to_vec(),
                        other_couple.namespace_name(),
                    );
                    couple.merge(other_couple);
                    for id in other_couple.group_ids() {
                        if let Some(group) = self.groups.get_mut(id) {
                            group.set_couple_key(Some(key.clone()));
                        }
                    }
                    self.couples.insert(key.clone(), couple);
                }
            }
        }
        if self.couples.len() > other.couples.len() {
            *have_newer = true;
        }
    }

    fn merge_history(&mut self, other: &Storage) {
        for (group_id, other_entry) in &other.group_history {
            match self.group_history.get_mut(group_id) {
                Some(entry) => {
                    entry.merge(other_entry);
                }
                None => {
                    self.group_history.insert(*group_id, other_entry.clone());
                }
            }
        }
        if other.group_history_ts > self.group_history_ts {
            self.group_history_ts = other.group_history_ts;
        }
    }

    fn merge_hosts(&mut self, other: &Storage, have_newer: &mut bool) {
        for (addr, other_host) in &other.hosts {
            match self.hosts.get_mut(addr) {
                Some(host) => {
                    if host.merge(other_host) {
                        *have_newer = true;
                    }
                }
                None => {
                    self.hosts.insert(addr.clone(), other_host.clone());
                }
            }
        }
    }

    /// Namespace membership is derived state: recompute it from the merged
    /// group and couple maps, keeping any provisioned settings.
    fn rebuild_namespaces(&mut self, other: &Storage) {
        for (name, other_ns) in &other.namespaces {
            if !self.namespaces.contains_key(name) {
                self.namespaces.insert(name.clone(), other_ns.clone());
            }
        }

        let mut rebuilt: BTreeMap<String, Namespace> = self
            .namespaces
            .iter()
            .map(|(name, ns)| {
                let mut fresh = Namespace::new(name);
                fresh.settings = ns.settings.clone();
                (name.clone(), fresh)
            })
            .collect();

        for (id, group) in &self.groups {
            if let Some(name) = group.namespace_name() {
                rebuilt
                    .entry(name.to_string())
                    .or_insert_with(|| Namespace::new(name))
                    .add_group(*id);
            }
        }
        for (key, couple) in &self.couples {
            let name = couple.namespace_name();
            rebuilt
                .entry(name.to_string())
                .or_insert_with(|| Namespace::new(name))
                .add_couple(key);
        }

        self.namespaces = rebuilt;
    }
}

/// Looks a backend up by its `"<node_key>/<backend_id>"` key.
pub(crate) fn find_backend<'a>(
    nodes: &'a BTreeMap<String, Node>,
    backend_key: &str,
) -> Option<&'a Backend> {
    let (node_key, backend_id) = crate::core::filter::Filter::split_node_num(backend_key)?;
    nodes.get(node_key)?.backend(backend_id)
}

/// Status and timestamp of a group's member backends.
fn backend_views(
    nodes: &BTreeMap<String, Node>,
    backend_keys: &std::collections::BTreeSet<String>,
) -> Vec<BackendView> {
    backend_keys
        .iter()
        .filter_map(|key| find_backend(nodes, key))
        .map(|backend| BackendView {
            status: backend.status(),
            timestamp_us: backend.stat.timestamp_us(),
        })
        .collect()
}

/// Assembles the member views a couple's status cascade consumes.
fn member_views(
    groups: &BTreeMap<u64, Group>,
    nodes: &BTreeMap<String, Node>,
    hosts: &BTreeMap<String, Host>,
    member_ids: &[u64],
) -> Vec<CoupleGroupView> {
    member_ids
        .iter()
        .map(|id| match groups.get(id) {
            Some(group) => group_view(group, nodes, hosts),
            None => CoupleGroupView {
                id: *id,
                status: GroupStatus::Init,
                metadata_version: 0,
                frozen: false,
                namespace_name: String::new(),
                couple_list: vec![],
                conflict_skip: true,
                total_space: 0,
                effective_space: 0,
                free_space: 0,
                full: true,
                update_time: 0,
                active_job: None,
                dcs: Ok(vec![]),
            },
        })
        .collect()
}

fn group_view(
    group: &Group,
    nodes: &BTreeMap<String, Node>,
    hosts: &BTreeMap<String, Host>,
) -> CoupleGroupView {
    let backends: Vec<&Backend> = group
        .backend_keys()
        .iter()
        .filter_map(|key| find_backend(nodes, key))
        .collect();

    let mut dcs: Result<Vec<String>, String> = Ok(vec![]);
    'outer: for backend in &backends {
        let host = match nodes.get(backend.node_key()) {
            Some(node) => node.host().to_string(),
            None => {
                dcs = Err(backend.node_key().to_string());
                break 'outer;
            }
        };
        let dc = hosts.get(&host).map(|h| h.dc().to_string()).unwrap_or_default();
        if dc.is_empty() {
            dcs = Err(backend.node_key().to_string());
            break 'outer;
        }
        if let Ok(list) = &mut dcs {
            list.push(dc);
        }
    }
    if let Ok(list) = &mut dcs {
        list.sort();
        list.dedup();
    }

    CoupleGroupView {
        id: group.id(),
        status: group.status(),
        metadata_version: group.metadata.version,
        frozen: group.metadata.frozen,
        namespace_name: group.metadata.namespace_name.clone(),
        couple_list: group.metadata.couple.clone(),
        conflict_skip: group.conflict_check_skipped(),
        total_space: backends.iter().map(|b| b.total_space()).sum(),
        effective_space: backends.iter().map(|b| b.effective_space()).sum(),
        free_space: backends.iter().map(|b| b.free_space()).sum(),
        full: backends.iter().all(|b| b.full()),
        update_time: group.update_time(),
        active_job: group.active_job().cloned(),
        dcs,
    }
}
