// src/core/storage/snapshot.rs

//! JSON projection of the storage graph: either the whole graph restricted
//! to the requested item types, or the result of a filtered selection.

use super::select::Entries;
use super::Storage;
use crate::core::filter::{Filter, ItemTypes};
use serde_json::{Map, Value};
use std::collections::BTreeSet;

impl Storage {
    /// Renders a snapshot for the given filter. An empty filter projects the
    /// whole graph restricted to `item_types`.
    pub fn snapshot_json(&self, filter: &Filter) -> Value {
        if filter.empty() {
            self.print_all(filter.item_types, filter.show_internals)
        } else {
            let entries = self.select(filter);
            self.print_entries(&entries, filter.item_types, filter.show_internals)
        }
    }

    /// Renders the selected entries. Sections come out only when non-empty;
    /// backend and filesystem sub-arrays inside each node are restricted to
    /// the selected sets.
    pub fn print_entries(
        &self,
        entries: &Entries,
        item_types: ItemTypes,
        show_internals: bool,
    ) -> Value {
        let mut out = Map::new();

        if !entries.nodes.is_empty() {
            let nodes: Vec<Value> = entries
                .nodes
                .iter()
                .filter_map(|key| self.nodes().get(key))
                .map(|node| {
                    node.to_json(
                        &entries.backends,
                        &entries.filesystems,
                        item_types.contains(ItemTypes::BACKEND),
                        item_types.contains(ItemTypes::FS),
                        show_internals,
                    )
                })
                .collect();
            out.insert("nodes".to_string(), Value::Array(nodes));
        }

        if !entries.groups.is_empty() {
            let groups: Vec<Value> = entries
                .groups
                .iter()
                .filter_map(|id| self.groups().get(id))
                .map(|group| group.to_json(self.group_history().get(&group.id()), show_internals))
                .collect();
            out.insert("groups".to_string(), Value::Array(groups));
        }

        if !entries.couples.is_empty() {
            let couples: Vec<Value> = entries
                .couples
                .iter()
                .filter_map(|key| self.couples().get(key))
                .map(|couple| {
                    let members = self.couple_member_views(couple);
                    couple.to_json(
                        &members,
                        self.namespace_reserved_fraction(couple),
                        show_internals,
                    )
                })
                .collect();
            out.insert("couples".to_string(), Value::Array(couples));
        }

        if !entries.namespaces.is_empty() {
            let namespaces: Vec<Value> = entries
                .namespaces
                .iter()
                .map(|name| Value::String(name.clone()))
                .collect();
            out.insert("namespaces".to_string(), Value::Array(namespaces));
        }

        Value::Object(out)
    }

    /// Renders the whole graph restricted to the requested item types.
    fn print_all(&self, item_types: ItemTypes, show_internals: bool) -> Value {
        let mut out = Map::new();
        let none: BTreeSet<String> = BTreeSet::new();

        if item_types.intersects(ItemTypes::NODE | ItemTypes::BACKEND | ItemTypes::FS) {
            let nodes: Vec<Value> = self
                .nodes()
                .values()
                .map(|node| {
                    node.to_json(
                        &none,
                        &none,
                        item_types.contains(ItemTypes::BACKEND),
                        item_types.contains(ItemTypes::FS),
                        show_internals,
                    )
                })
                .collect();
            out.insert("nodes".to_string(), Value::Array(nodes));
        }

        if item_types.contains(ItemTypes::GROUP) {
            let groups: Vec<Value> = self
                .groups()
                .values()
                .map(|group| group.to_json(self.group_history().get(&group.id()), show_internals))
                .collect();
            out.insert("groups".to_string(), Value::Array(groups));
        }

        if item_types.contains(ItemTypes::COUPLE) {
            let couples: Vec<Value> = self
                .couples()
                .values()
                .map(|couple| {
                    let members = self.couple_member_views(couple);
                    couple.to_json(
                        &members,
                        self.namespace_reserved_fraction(couple),
                        show_internals,
                    )
                })
                .collect();
            out.insert("couples".to_string(), Value::Array(couples));
        }

        if item_types.contains(ItemTypes::NAMESPACE) {
            let namespaces: Vec<Value> = self
                .namespaces()
                .keys()
                .map(|name| Value::String(name.clone()))
                .collect();
            out.insert("namespaces".to_string(), Value::Array(namespaces));
        }

        if item_types.contains(ItemTypes::JOB) {
            let jobs: Vec<Value> = self.jobs().values().map(|job| job.to_json()).collect();
            out.insert("jobs".to_string(), Value::Array(jobs));
        }

        Value::Object(out)
    }
}
