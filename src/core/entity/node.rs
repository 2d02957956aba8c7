// src/core/entity/node.rs

//! A node is one storage server, identified by `(host, port, family)`. It
//! owns its backends and filesystems and carries the rolling procfs sample.

use super::backend::{Backend, BackendStat};
use super::filesystem::{Filesystem, FsStatus};
use serde_json::{Value, json};
use std::collections::BTreeMap;

/// One procfs-style sample plus the rates derived between two successive
/// samples.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct NodeStat {
    pub ts_sec: u64,
    pub ts_usec: u64,
    /// One-minute load average scaled by 100, as reported by the monitor.
    pub la1: u64,
    pub tx_bytes: u64,
    pub rx_bytes: u64,

    pub load_average: f64,
    pub tx_rate: f64,
    pub rx_rate: f64,
}

impl NodeStat {
    pub fn timestamp_us(&self) -> u64 {
        self.ts_sec * 1_000_000 + self.ts_usec
    }

    fn timestamp_secs(&self) -> f64 {
        self.ts_sec as f64 + self.ts_usec as f64 / 1_000_000.0
    }
}

/// Per-node processing timings surfaced by the summary report, in
/// microseconds.
#[derive(Debug, Clone, Copy, Default)]
pub struct NodeClock {
    pub stats_parse: u64,
    pub update_fs: u64,
}

#[derive(Debug, Clone)]
pub struct Node {
    host: String,
    port: u16,
    family: u32,

    key: String,

    pub stat: NodeStat,

    backends: BTreeMap<u64, Backend>,
    filesystems: BTreeMap<u64, Filesystem>,

    pub clock: NodeClock,
}

impl Node {
    pub fn new(host: &str, port: u16, family: u32) -> Self {
        Self {
            host: host.to_string(),
            port,
            family,
            key: Self::key_of(host, port, family),
            stat: NodeStat::default(),
            backends: BTreeMap::new(),
            filesystems: BTreeMap::new(),
            clock: NodeClock::default(),
        }
    }

    pub fn key_of(host: &str, port: u16, family: u32) -> String {
        format!("{host}:{port}:{family}")
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn host(&self) -> &str {
        &self.host
    }

    pub fn port(&self) -> u16 {
        self.port
    }

    pub fn family(&self) -> u32 {
        self.family
    }

    pub fn backends(&self) -> &BTreeMap<u64, Backend> {
        &self.backends
    }

    pub fn backend(&self, id: u64) -> Option<&Backend> {
        self.backends.get(&id)
    }

    pub fn filesystems(&self) -> &BTreeMap<u64, Filesystem> {
        &self.filesystems
    }

    pub fn filesystem(&self, fsid: u64) -> Option<&Filesystem> {
        self.filesystems.get(&fsid)
    }

    /// Folds a fresh procfs sample in. Throughput rates advance only when the
    /// byte counters grew and the samples are more than a second apart.
    pub fn update(&mut self, stat: NodeStat) {
        let dt = stat.timestamp_secs() - self.stat.timestamp_secs();

        if dt > 1.0 {
            if self.stat.tx_bytes < stat.tx_bytes {
                self.stat.tx_rate = (stat.tx_bytes - self.stat.tx_bytes) as f64 / dt;
            }
            if self.stat.rx_bytes < stat.rx_bytes {
                self.stat.rx_rate = (stat.rx_bytes - self.stat.rx_bytes) as f64 / dt;
            }
        }

        self.stat.load_average = stat.la1 as f64 / 100.0;
        self.stat.ts_sec = stat.ts_sec;
        self.stat.ts_usec = stat.ts_usec;
        self.stat.la1 = stat.la1;
        self.stat.tx_bytes = stat.tx_bytes;
        self.stat.rx_bytes = stat.rx_bytes;
    }

    /// Folds one backend stat sample in, creating the backend on the first
    /// sample with a non-zero state and migrating it between filesystems on
    /// an `fsid` change. Returns the backend id when the sample was applied.
    pub fn handle_backend(&mut self, stat: BackendStat, reserved_space: u64) -> Option<u64> {
        let id = stat.backend_id;
        let fsid = stat.fsid;
        let load_average = self.stat.load_average;

        match self.backends.get_mut(&id) {
            Some(backend) => {
                let old_fsid = backend.fsid();
                if old_fsid != fsid {
                    if let Some(old_fs) = self.filesystems.get_mut(&old_fsid) {
                        old_fs.remove_backend(id);
                    }
                }
                backend.apply_stat(stat, load_average);
            }
            None => {
                if stat.state == 0 {
                    return None;
                }
                self.backends.insert(id, Backend::new(&self.key, stat));
            }
        }

        let fs = self
            .filesystems
            .entry(fsid)
            .or_insert_with(|| Filesystem::new(&self.key, fsid));
        fs.add_backend(id);

        let fs_broken = {
            let backend = self.backends.get_mut(&id)?;
            backend.recalculate(reserved_space);
            fs.observe(backend);
            fs.status() == FsStatus::Broken
        };

        if let Some(backend) = self.backends.get_mut(&id) {
            backend.update_status(fs_broken);
        }

        Some(id)
    }

    /// Re-derives every filesystem status from its member backends, then
    /// refreshes backend statuses against the fresh filesystem verdicts.
    pub fn update_filesystems(&mut self) {
        let started = std::time::Instant::now();

        let mut fs_status: BTreeMap<u64, FsStatus> = BTreeMap::new();
        for (fsid, fs) in self.filesystems.iter_mut() {
            let members = fs.backend_ids().clone();
            let status =
                fs.update_status(members.iter().filter_map(|id| self.backends.get(id)));
            fs_status.insert(*fsid, status);
        }

        for backend in self.backends.values_mut() {
            let broken = fs_status
                .get(&backend.fsid())
                .is_some_and(|s| *s == FsStatus::Broken);
            backend.update_status(broken);
        }

        self.clock.update_fs = started.elapsed().as_micros() as u64;
    }

    /// Folds another instance of this node in. The procfs sample is monotonic
    /// on its timestamp; backends and filesystems merge per entry.
    pub fn merge(&mut self, other: &Node) -> bool {
        let mut have_newer = false;

        let my_ts = self.stat.timestamp_us();
        let other_ts = other.stat.timestamp_us();
        if my_ts > other_ts {
            have_newer = true;
        } else if my_ts < other_ts {
            self.stat = other.stat.clone();
            self.clock = other.clock;
        }

        for (id, other_backend) in &other.backends {
            match self.backends.get_mut(id) {
                Some(backend) => {
                    if backend.merge(other_backend) {
                        have_newer = true;
                    }
                }
                None => {
                    self.backends.insert(*id, other_backend.clone());
                }
            }
        }
        if self.backends.len() > other.backends.len() {
            have_newer = true;
        }

        for (fsid, other_fs) in &other.filesystems {
            match self.filesystems.get_mut(fsid) {
                Some(fs) => {
                    if fs.merge(other_fs) {
                        have_newer = true;
                    }
                }
                None => {
                    self.filesystems.insert(*fsid, other_fs.clone());
                }
            }
        }

        // Filesystem membership follows the merged backend set.
        for fs in self.filesystems.values_mut() {
            let fsid = fs.fsid();
            let members: Vec<u64> = self
                .backends
                .values()
                .filter(|b| b.fsid() == fsid)
                .map(|b| b.stat.backend_id)
                .collect();
            fs.set_backends(members);
        }

        have_newer
    }

    /// Renders the node with its backend and filesystem sub-arrays. A
    /// non-empty selection restricts the sub-arrays to the selected keys.
    pub fn to_json(
        &self,
        selected_backends: &std::collections::BTreeSet<String>,
        selected_filesystems: &std::collections::BTreeSet<String>,
        print_backends: bool,
        print_fs: bool,
        show_internals: bool,
    ) -> Value {
        let mut obj = json!({
            "timestamp": {
                "tv_sec": self.stat.ts_sec,
                "tv_usec": self.stat.ts_usec,
            },
            "host": self.host,
            "port": self.port,
            "family": self.family,
            "tx_bytes": self.stat.tx_bytes,
            "rx_bytes": self.stat.rx_bytes,
            "load_average": self.stat.load_average,
            "tx_rate": self.stat.tx_rate,
            "rx_rate": self.stat.rx_rate,
        });

        if print_backends {
            let backends: Vec<Value> = self
                .backends
                .values()
                .filter(|b| selected_backends.is_empty() || selected_backends.contains(b.key()))
                .map(|b| b.to_json())
                .collect();
            obj["backends"] = Value::Array(backends);
        }

        if print_fs {
            let filesystems: Vec<Value> = self
                .filesystems
                .values()
                .filter(|fs| {
                    selected_filesystems.is_empty() || selected_filesystems.contains(fs.key())
                })
                .map(|fs| fs.to_json(show_internals))
                .collect();
            obj["filesystems"] = Value::Array(filesystems);
        }

        obj
    }

    /// Plain-text report used by the node info endpoint.
    pub fn info_text(&self) -> String {
        format!(
            "Node {{\n  host: {}\n  port: {}\n  family: {}\n  la: {}\n  tx_bytes: {}\n  \
             rx_bytes: {}\n  load_average: {}\n  tx_rate: {}\n  rx_rate: {}\n  \
             number of backends: {}\n}}",
            self.host,
            self.port,
            self.family,
            self.stat.la1,
            self.stat.tx_bytes,
            self.stat.rx_bytes,
            self.stat.load_average,
            self.stat.tx_rate,
            self.stat.rx_rate,
            self.backends.len()
        )
    }
}
