// src/core/entity/host.rs

//! A host record: the address a node was discovered under, its resolved
//! name, and the data center it lives in.

use serde_json::{Value, json};

#[derive(Debug, Clone, Default)]
pub struct Host {
    addr: String,
    name: String,
    dc: String,
}

impl Host {
    pub fn new(addr: &str) -> Self {
        Self {
            addr: addr.to_string(),
            name: String::new(),
            dc: String::new(),
        }
    }

    pub fn addr(&self) -> &str {
        &self.addr
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn dc(&self) -> &str {
        &self.dc
    }

    pub fn set_name(&mut self, name: &str) {
        self.name = name.to_string();
    }

    pub fn set_dc(&mut self, dc: &str) {
        self.dc = dc.to_string();
    }

    /// Folds another record for the same address in. A populated field beats
    /// an empty one; `true` is returned when the local side knew more.
    pub fn merge(&mut self, other: &Host) -> bool {
        let mut have_newer = false;

        if self.name.is_empty() {
            if !other.name.is_empty() {
                self.name = other.name.clone();
            }
        } else if other.name.is_empty() {
            have_newer = true;
        }

        if self.dc.is_empty() {
            if !other.dc.is_empty() {
                self.dc = other.dc.clone();
            }
        } else if other.dc.is_empty() {
            have_newer = true;
        }

        have_newer
    }

    pub fn to_json(&self) -> Value {
        json!({
            "addr": self.addr,
            "name": self.name,
            "dc": self.dc,
        })
    }
}
