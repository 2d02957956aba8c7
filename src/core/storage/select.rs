// src/core/storage/select.rs

//! The selection engine: filter-driven projection across the entity graph.
//!
//! Explicit axes are taken verbatim. A requested item kind without an
//! explicit set is the intersection, across all other explicit axes, of the
//! items related to those axes. Intersection is associative and
//! order-independent; a related set that comes up empty empties the result.
//! An axis whose kind is itself requested does not constrain the others.

use super::{Storage, find_backend};
use crate::core::filter::{Filter, ItemTypes};
use std::collections::BTreeSet;

/// Disjoint per-kind result sets of one selection.
#[derive(Debug, Clone, Default)]
pub struct Entries {
    pub groups: BTreeSet<u64>,
    pub couples: BTreeSet<String>,
    pub namespaces: BTreeSet<String>,
    pub nodes: BTreeSet<String>,
    pub backends: BTreeSet<String>,
    pub filesystems: BTreeSet<String>,
}

/// Explicit filter axes narrowed down to entities that actually exist.
struct Resolved {
    namespaces: Vec<String>,
    couples: Vec<String>,
    groups: Vec<u64>,
    nodes: Vec<String>,
    backends: Vec<String>,
    filesystems: Vec<String>,
}

impl Resolved {
    /// The axes that constrain a selection of `target`: every explicit axis
    /// whose own kind is not among the requested item types.
    fn constraining_axes(&self, filter: &Filter, target: ItemTypes) -> Vec<Axis<'_>> {
        let mut axes = Vec::new();
        let skip = filter.item_types | target;

        if !skip.contains(ItemTypes::GROUP) && !self.groups.is_empty() {
            axes.push(Axis::Groups(&self.groups));
        }
        if !skip.contains(ItemTypes::COUPLE) && !self.couples.is_empty() {
            axes.push(Axis::Couples(&self.couples));
        }
        if !skip.contains(ItemTypes::NAMESPACE) && !self.namespaces.is_empty() {
            axes.push(Axis::Namespaces(&self.namespaces));
        }
        if !skip.contains(ItemTypes::NODE) && !self.nodes.is_empty() {
            axes.push(Axis::Nodes(&self.nodes));
        }
        if !skip.contains(ItemTypes::BACKEND) && !self.backends.is_empty() {
            axes.push(Axis::Backends(&self.backends));
        }
        if !skip.contains(ItemTypes::FS) && !self.filesystems.is_empty() {
            axes.push(Axis::Filesystems(&self.filesystems));
        }

        axes
    }
}

fn intersect_into<T: Ord>(acc: &mut Option<BTreeSet<T>>, related: BTreeSet<T>) {
    match acc {
        None => *acc = Some(related),
        Some(set) => {
            if set.is_empty() {
                return;
            }
            set.retain(|item| related.contains(item));
        }
    }
}

impl Storage {
    pub fn select(&self, filter: &Filter) -> Entries {
        let resolved = self.resolve(filter);
        let mut entries = Entries::default();

        if filter.item_types.contains(ItemTypes::GROUP) {
            if !filter.groups.is_empty() {
                entries.groups = resolved.groups.iter().copied().collect();
            } else {
                let mut acc = None;
                for axis in resolved.constraining_axes(filter, ItemTypes::GROUP) {
                    let mut related = BTreeSet::new();
                    self.push_related_groups(axis, &mut related);
                    intersect_into(&mut acc, related);
                }
                entries.groups = acc.unwrap_or_default();
            }
        }

        if filter.item_types.contains(ItemTypes::COUPLE) {
            if !filter.couples.is_empty() {
                entries.couples = resolved.couples.iter().cloned().collect();
            } else {
                let mut acc = None;
                for axis in resolved.constraining_axes(filter, ItemTypes::COUPLE) {
                    let mut related = BTreeSet::new();
                    self.push_related_couples(axis, &mut related);
                    intersect_into(&mut acc, related);
                }
                entries.couples = acc.unwrap_or_default();
            }
        }

        if filter.item_types.contains(ItemTypes::NAMESPACE) {
            if !filter.namespaces.is_empty() {
                entries.namespaces = resolved.namespaces.iter().cloned().collect();
            } else {
                let mut acc = None;
                for axis in resolved.constraining_axes(filter, ItemTypes::NAMESPACE) {
                    let mut related = BTreeSet::new();
                    self.push_related_namespaces(axis, &mut related);
                    intersect_into(&mut acc, related);
                }
                entries.namespaces = acc.unwrap_or_default();
            }
        }

        if filter.item_types.contains(ItemTypes::NODE) {
            if !filter.nodes.is_empty() {
                entries.nodes = resolved.nodes.iter().cloned().collect();
            } else {
                let mut acc = None;
                for axis in resolved.constraining_axes(filter, ItemTypes::NODE) {
                    let mut related = BTreeSet::new();
                    self.push_related_nodes(axis, &mut related);
                    intersect_into(&mut acc, related);
                }
                entries.nodes = acc.unwrap_or_default();
            }
        }

        if filter.item_types.contains(ItemTypes::BACKEND) {
            if !filter.backends.is_empty() {
                entries.backends = resolved.backends.iter().cloned().collect();
            } else {
                let mut acc = None;
                for axis in resolved.constraining_axes(filter, ItemTypes::BACKEND) {
                    let mut related = BTreeSet::new();
                    self.push_related_backends(axis, &mut related);
                    intersect_into(&mut acc, related);
                }
                entries.backends = acc.unwrap_or_default();
            }
        }

        if filter.item_types.contains(ItemTypes::FS) {
            if !filter.filesystems.is_empty() {
                entries.filesystems = resolved.filesystems.iter().cloned().collect();
            } else {
                let mut acc = None;
                for axis in resolved.constraining_axes(filter, ItemTypes::FS) {
                    let mut related = BTreeSet::new();
                    self.push_related_filesystems(axis, &mut related);
                    intersect_into(&mut acc, related);
                }
                entries.filesystems = acc.unwrap_or_default();
            }
        }

        entries
    }

    fn resolve(&self, filter: &Filter) -> Resolved {
        Resolved {
            namespaces: filter
                .namespaces
                .iter()
                .filter(|name| self.namespaces.contains_key(*name))
                .cloned()
                .collect(),
            couples: filter
                .couples
                .iter()
                .filter(|key| self.couples.contains_key(*key))
                .cloned()
                .collect(),
            groups: filter
                .groups
                .iter()
                .filter(|id| self.groups.contains_key(*id))
                .copied()
                .collect(),
            nodes: filter
                .nodes
                .iter()
                .filter(|key| self.nodes.contains_key(*key))
                .cloned()
                .collect(),
            backends: filter
                .backends
                .iter()
                .filter(|key| find_backend(&self.nodes, key).is_some())
                .cloned()
                .collect(),
            filesystems: filter
                .filesystems
                .iter()
                .filter(|key| {
                    Filter::split_node_num(key).is_some_and(|(node, fsid)| {
                        self.nodes
                            .get(node)
                            .is_some_and(|n| n.filesystem(fsid).is_some())
                    })
                })
                .cloned()
                .collect(),
        }
    }

    fn push_related_groups(&self, axis: Axis<'_>, out: &mut BTreeSet<u64>) {
        match axis {
            Axis::Groups(ids) => out.extend(ids.iter().copied()),
            Axis::Couples(keys) => {
                for key in keys {
                    if let Some(couple) = self.couples.get(key) {
                        out.extend(couple.group_ids().iter().copied());
                    }
                }
            }
            Axis::Namespaces(names) => {
                for name in names {
                    if let Some(ns) = self.namespaces.get(name) {
                        for key in ns.couple_keys() {
                            if let Some(couple) = self.couples.get(key) {
                                out.extend(couple.group_ids().iter().copied());
                            }
                        }
                    }
                }
            }
            Axis::Nodes(keys) => {
                for key in keys {
                    if let Some(node) = self.nodes.get(key) {
                        out.extend(node.backends().values().map(|b| b.group_id()));
                    }
                }
            }
            Axis::Backends(keys) => {
                for key in keys {
                    if let Some(backend) = find_backend(&self.nodes, key) {
                        out.insert(backend.group_id());
                    }
                }
            }
            Axis::Filesystems(keys) => {
                for key in keys {
                    for backend in self.fs_backends(key) {
                        out.insert(backend.group_id());
                    }
                }
            }
        }
    }

    fn push_related_couples(&self, axis: Axis<'_>, out: &mut BTreeSet<String>) {
        let mut groups = BTreeSet::new();
        match axis {
            Axis::Couples(keys) => {
                out.extend(keys.iter().cloned());
                return;
            }
            Axis::Namespaces(names) => {
                for name in names {
                    if let Some(ns) = self.namespaces.get(name) {
                        out.extend(ns.couple_keys().iter().cloned());
                    }
                }
                return;
            }
            other => self.push_related_groups(other, &mut groups),
        }
        for id in groups {
            if let Some(key) = self.groups.get(&id).and_then(|g| g.couple_key()) {
                out.insert(key.to_string());
            }
        }
    }

    fn push_related_namespaces(&self, axis: Axis<'_>, out: &mut BTreeSet<String>) {
        match axis {
            Axis::Namespaces(names) => out.extend(names.iter().cloned()),
            Axis::Couples(keys) => {
                for key in keys {
                    if let Some(couple) = self.couples.get(key) {
                        out.insert(couple.namespace_name().to_string());
                    }
                }
            }
            other => {
                let mut groups = BTreeSet::new();
                self.push_related_groups(other, &mut groups);
                for id in groups {
                    if let Some(name) = self.groups.get(&id).and_then(|g| g.namespace_name()) {
                        out.insert(name.to_string());
                    }
                }
            }
        }
    }

    fn push_related_nodes(&self, axis: Axis<'_>, out: &mut BTreeSet<String>) {
        match axis {
            Axis::Nodes(keys) => out.extend(keys.iter().cloned()),
            Axis::Backends(keys) | Axis::Filesystems(keys) => {
                for key in keys {
                    if let Some((node, _)) = Filter::split_node_num(key) {
                        out.insert(node.to_string());
                    }
                }
            }
            other => {
                let mut backends = BTreeSet::new();
                self.push_related_backends(other, &mut backends);
                for key in backends {
                    if let Some((node, _)) = Filter::split_node_num(&key) {
                        out.insert(node.to_string());
                    }
                }
            }
        }
    }

    fn push_related_backends(&self, axis: Axis<'_>, out: &mut BTreeSet<String>) {
        match axis {
            Axis::Backends(keys) => out.extend(keys.iter().cloned()),
            Axis::Nodes(keys) => {
                for key in keys {
                    if let Some(node) = self.nodes.get(key) {
                        out.extend(node.backends().values().map(|b| b.key().to_string()));
                    }
                }
            }
            Axis::Filesystems(keys) => {
                for key in keys {
                    out.extend(self.fs_backends(key).map(|b| b.key().to_string()));
                }
            }
            Axis::Groups(ids) => {
                for id in ids {
                    if let Some(group) = self.groups.get(id) {
                        out.extend(group.backend_keys().iter().cloned());
                    }
                }
            }
            Axis::Couples(keys) => {
                for key in keys {
                    if let Some(couple) = self.couples.get(key) {
                        for id in couple.group_ids() {
                            if let Some(group) = self.groups.get(id) {
                                out.extend(group.backend_keys().iter().cloned());
                            }
                        }
                    }
                }
            }
            Axis::Namespaces(names) => {
                let mut couples = BTreeSet::new();
                self.push_related_couples(Axis::Namespaces(names), &mut couples);
                let keys: Vec<String> = couples.into_iter().collect();
                self.push_related_backends(Axis::Couples(&keys), out);
            }
        }
    }

    fn push_related_filesystems(&self, axis: Axis<'_>, out: &mut BTreeSet<String>) {
        match axis {
            Axis::Filesystems(keys) => out.extend(keys.iter().cloned()),
            Axis::Nodes(keys) => {
                for key in keys {
                    if let Some(node) = self.nodes.get(key) {
                        out.extend(node.filesystems().values().map(|fs| fs.key().to_string()));
                    }
                }
            }
            other => {
                let mut backends = BTreeSet::new();
                self.push_related_backends(other, &mut backends);
                for key in backends {
                    if let Some(backend) = find_backend(&self.nodes, &key) {
                        out.insert(format!("{}/{}", backend.node_key(), backend.fsid()));
                    }
                }
            }
        }
    }

    fn fs_backends<'a>(
        &'a self,
        fs_key: &str,
    ) -> impl Iterator<Item = &'a crate::core::entity::Backend> {
        let resolved = Filter::split_node_num(fs_key).and_then(|(node_key, fsid)| {
            let node = self.nodes.get(node_key)?;
            let fs = node.filesystem(fsid)?;
            Some((node, fs))
        });
        resolved.into_iter().flat_map(|(node, fs)| {
            fs.backend_ids()
                .iter()
                .filter_map(move |id| node.backend(*id))
        })
    }
}

/// One explicit filter axis with its resolved keys.
#[derive(Clone, Copy)]
enum Axis<'a> {
    Groups(&'a [u64]),
    Couples(&'a [String]),
    Namespaces(&'a [String]),
    Nodes(&'a [String]),
    Backends(&'a [String]),
    Filesystems(&'a [String]),
}
