// src/core/entity/namespace.rs

//! A namespace is an administrative grouping of couples with shared
//! settings.

use serde_json::{Value, json};
use std::collections::BTreeSet;

/// Namespace settings. Until an operator provisions the namespace, the
/// defaults apply and `is_default` stays set, which some placement policies
/// treat as a misconfiguration.
#[derive(Debug, Clone, PartialEq)]
pub struct NamespaceSettings {
    /// Fraction of the couple's effective space withheld from clients.
    pub reserved_space_fraction: f64,
    pub is_default: bool,
}

impl Default for NamespaceSettings {
    fn default() -> Self {
        Self {
            reserved_space_fraction: 0.0,
            is_default: true,
        }
    }
}

#[derive(Debug, Clone)]
pub struct Namespace {
    name: String,
    couple_keys: BTreeSet<String>,
    group_ids: BTreeSet<u64>,
    pub settings: NamespaceSettings,
}

impl Namespace {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_string(),
            couple_keys: BTreeSet::new(),
            group_ids: BTreeSet::new(),
            settings: NamespaceSettings::default(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn couple_keys(&self) -> &BTreeSet<String> {
        &self.couple_keys
    }

    pub fn group_ids(&self) -> &BTreeSet<u64> {
        &self.group_ids
    }

    pub fn add_couple(&mut self, key: &str) {
        self.couple_keys.insert(key.to_string());
    }

    pub fn remove_couple(&mut self, key: &str) {
        self.couple_keys.remove(key);
    }

    pub fn add_group(&mut self, id: u64) {
        self.group_ids.insert(id);
    }

    pub fn remove_group(&mut self, id: u64) {
        self.group_ids.remove(&id);
    }

    pub fn default_settings(&self) -> bool {
        self.settings.is_default
    }

    pub fn to_json(&self) -> Value {
        json!({
            "id": self.name,
            "couples": self.couple_keys.iter().collect::<Vec<_>>(),
        })
    }
}
