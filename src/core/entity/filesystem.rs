// src/core/entity/filesystem.rs

//! A filesystem is the block device mount a set of backends share, keyed by
//! the `fsid` reported in backend stats.

use super::backend::{Backend, BackendStatus};
use crate::core::metrics::timeval_user_friendly;
use serde_json::{Value, json};
use std::collections::BTreeSet;
use strum_macros::Display;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum FsStatus {
    Ok,
    Broken,
}

#[derive(Debug, Clone, Copy, Default)]
pub struct FsStat {
    pub ts_sec: u64,
    pub ts_usec: u64,
    /// VFS capacity of the mount, the largest figure reported by any of the
    /// member backends.
    pub total_space: u64,
}

impl FsStat {
    fn timestamp_us(&self) -> u64 {
        self.ts_sec * 1_000_000 + self.ts_usec
    }
}

#[derive(Debug, Clone)]
pub struct Filesystem {
    key: String,
    node_key: String,
    fsid: u64,

    pub stat: FsStat,

    backend_ids: BTreeSet<u64>,

    status: FsStatus,
}

impl Filesystem {
    pub fn new(node_key: &str, fsid: u64) -> Self {
        Self {
            key: format!("{node_key}/{fsid}"),
            node_key: node_key.to_string(),
            fsid,
            stat: FsStat::default(),
            backend_ids: BTreeSet::new(),
            status: FsStatus::Ok,
        }
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn node_key(&self) -> &str {
        &self.node_key
    }

    pub fn fsid(&self) -> u64 {
        self.fsid
    }

    pub fn status(&self) -> FsStatus {
        self.status
    }

    pub fn backend_ids(&self) -> &BTreeSet<u64> {
        &self.backend_ids
    }

    pub fn add_backend(&mut self, backend_id: u64) {
        self.backend_ids.insert(backend_id);
    }

    pub fn remove_backend(&mut self, backend_id: u64) {
        self.backend_ids.remove(&backend_id);
    }

    pub fn set_backends(&mut self, backend_ids: impl IntoIterator<Item = u64>) {
        self.backend_ids = backend_ids.into_iter().collect();
    }

    pub fn backend_count(&self) -> usize {
        self.backend_ids.len()
    }

    /// Records the timestamp and VFS capacity seen from one member backend.
    pub fn observe(&mut self, backend: &Backend) {
        self.stat.ts_sec = backend.stat.ts_sec;
        self.stat.ts_usec = backend.stat.ts_usec;
        self.stat.total_space = self.stat.total_space.max(backend.vfs_total_space());
    }

    /// Derives the filesystem status from its member backends. A backend set
    /// whose combined configured space exceeds the reported VFS capacity
    /// signals a misconfigured mount.
    pub fn update_status<'a>(&mut self, backends: impl Iterator<Item = &'a Backend>) -> FsStatus {
        let mut vfs_total_max = 0u64;
        let mut allocated = 0u64;

        for backend in backends {
            vfs_total_max = vfs_total_max.max(backend.vfs_total_space());
            match backend.status() {
                BackendStatus::Ok | BackendStatus::Broken => {
                    allocated += backend.total_space();
                }
                _ => {}
            }
        }

        if vfs_total_max > 0 {
            self.stat.total_space = vfs_total_max;
        }

        self.status = if allocated <= self.stat.total_space {
            FsStatus::Ok
        } else {
            FsStatus::Broken
        };
        self.status
    }

    pub fn merge(&mut self, other: &Filesystem) -> bool {
        let my_ts = self.stat.timestamp_us();
        let other_ts = other.stat.timestamp_us();
        if my_ts > other_ts {
            return true;
        }
        if my_ts < other_ts {
            self.stat = other.stat;
            self.status = other.status;
        }
        false
    }

    pub fn to_json(&self, show_internals: bool) -> Value {
        let mut timestamp = json!({
            "tv_sec": self.stat.ts_sec,
            "tv_usec": self.stat.ts_usec,
        });
        if show_internals {
            timestamp["user_friendly"] =
                Value::String(timeval_user_friendly(self.stat.ts_sec, self.stat.ts_usec));
        }

        json!({
            "timestamp": timestamp,
            "node": self.node_key,
            "fsid": self.fsid,
            "total_space": self.stat.total_space,
            "status": self.status.to_string(),
        })
    }
}
