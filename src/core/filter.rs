// src/core/filter.rs

//! The selection filter: explicit entity sets plus a bitmask of requested
//! item types, parsed from the wire JSON shape used by the snapshot and
//! refresh endpoints.

use crate::core::FleetmonError;
use bitflags::bitflags;
use serde::Deserialize;

bitflags! {
    /// Which entity kinds a selection should produce.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
    pub struct ItemTypes: u32 {
        const GROUP     = 1;
        const COUPLE    = 1 << 1;
        const NAMESPACE = 1 << 2;
        const NODE      = 1 << 3;
        const BACKEND   = 1 << 4;
        const FS        = 1 << 5;
        const JOB       = 1 << 6;
    }
}

impl ItemTypes {
    fn from_label(label: &str) -> Result<Self, FleetmonError> {
        match label {
            "group" => Ok(Self::GROUP),
            "couple" => Ok(Self::COUPLE),
            "namespace" => Ok(Self::NAMESPACE),
            "node" => Ok(Self::NODE),
            "backend" => Ok(Self::BACKEND),
            "fs" => Ok(Self::FS),
            "job" => Ok(Self::JOB),
            other => Err(FleetmonError::ParseFailure(format!(
                "unknown item type '{other}'"
            ))),
        }
    }
}

#[derive(Debug, Clone, Default)]
pub struct Filter {
    pub namespaces: Vec<String>,
    pub couples: Vec<String>,
    pub groups: Vec<u64>,
    pub backends: Vec<String>,
    pub nodes: Vec<String>,
    pub filesystems: Vec<String>,

    pub item_types: ItemTypes,
    pub show_internals: bool,
}

/// Wire shape of the filter document.
#[derive(Debug, Default, Deserialize)]
struct FilterDocument {
    #[serde(default)]
    filter: FilterSection,
    #[serde(default)]
    item_types: Vec<String>,
    #[serde(default)]
    options: FilterOptions,
}

#[derive(Debug, Default, Deserialize)]
struct FilterSection {
    #[serde(default)]
    namespaces: Vec<String>,
    #[serde(default)]
    couples: Vec<String>,
    #[serde(default)]
    groups: Vec<u64>,
    #[serde(default)]
    backends: Vec<String>,
    #[serde(default)]
    nodes: Vec<String>,
    #[serde(default)]
    filesystems: Vec<String>,
}

#[derive(Debug, Default, Deserialize)]
struct FilterOptions {
    #[serde(default)]
    show_internals: bool,
}

impl Filter {
    pub fn from_json(input: &str) -> Result<Self, FleetmonError> {
        let document: FilterDocument = serde_json::from_str(input)?;
        Self::from_document(document)
    }

    pub fn from_value(input: &serde_json::Value) -> Result<Self, FleetmonError> {
        let document: FilterDocument = serde_json::from_value(input.clone())?;
        Self::from_document(document)
    }

    fn from_document(document: FilterDocument) -> Result<Self, FleetmonError> {
        let mut item_types = ItemTypes::empty();
        for label in &document.item_types {
            item_types |= ItemTypes::from_label(label)?;
        }

        let mut filter = Self {
            namespaces: document.filter.namespaces,
            couples: document.filter.couples,
            groups: document.filter.groups,
            backends: document.filter.backends,
            nodes: document.filter.nodes,
            filesystems: document.filter.filesystems,
            item_types,
            show_internals: document.options.show_internals,
        };
        filter.sort();
        Ok(filter)
    }

    /// Sorts and deduplicates every explicit set.
    pub fn sort(&mut self) {
        self.namespaces.sort_unstable();
        self.namespaces.dedup();
        self.couples.sort_unstable();
        self.couples.dedup();
        self.groups.sort_unstable();
        self.groups.dedup();
        self.backends.sort_unstable();
        self.backends.dedup();
        self.nodes.sort_unstable();
        self.nodes.dedup();
        self.filesystems.sort_unstable();
        self.filesystems.dedup();
    }

    /// Whether no explicit set constrains the selection.
    pub fn empty(&self) -> bool {
        self.namespaces.is_empty()
            && self.couples.is_empty()
            && self.groups.is_empty()
            && self.backends.is_empty()
            && self.nodes.is_empty()
            && self.filesystems.is_empty()
    }

    /// Splits a `"<node_key>/<num>"` backend or filesystem key.
    pub fn split_node_num(key: &str) -> Option<(&str, u64)> {
        let (node, id) = key.rsplit_once('/')?;
        let id = id.parse().ok()?;
        Some((node, id))
    }
}
