// src/core/entity/backend.rs

//! A backend is one storage slot inside a node, the smallest unit of I/O
//! status. Derived space figures and the backend status are recomputed on
//! every ingested stat sample.

use serde_json::{Value, json};
use strum_macros::Display;

/// The perceived status of a single backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Display)]
#[strum(serialize_all = "UPPERCASE")]
pub enum BackendStatus {
    Init,
    Ok,
    Ro,
    Bad,
    Stalled,
    Broken,
}

/// One raw stat sample for a backend, as parsed from the monitor payload.
/// The timestamp is taken from the payload's top-level `timestamp` object.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct BackendStat {
    pub ts_sec: u64,
    pub ts_usec: u64,
    pub backend_id: u64,
    pub state: u64,

    pub vfs_blocks: u64,
    pub vfs_bavail: u64,
    pub vfs_bsize: u64,

    pub records_total: u64,
    pub records_removed: u64,
    pub records_removed_size: u64,
    pub base_size: u64,

    pub fsid: u64,
    pub defrag_state: u64,
    pub want_defrag: u64,

    pub read_ios: u64,
    pub write_ios: u64,
    pub error: u64,

    pub blob_size_limit: u64,
    pub max_blob_base_size: u64,
    pub blob_size: u64,
    pub group: u64,

    /// Base path of the backend's blob directory (`config.data`), used to
    /// recognize unmarked cache groups.
    pub base_path: String,
}

impl BackendStat {
    pub fn timestamp_us(&self) -> u64 {
        self.ts_sec * 1_000_000 + self.ts_usec
    }

    fn timestamp_secs(&self) -> f64 {
        self.ts_sec as f64 + self.ts_usec as f64 / 1_000_000.0
    }
}

/// Backend state values reported by the monitor endpoint.
const STATE_DISABLED: u64 = 0;
const STATE_READ_ONLY: u64 = 2;

#[derive(Debug, Clone)]
pub struct Backend {
    key: String,
    node_key: String,

    pub stat: BackendStat,

    vfs_total_space: u64,
    vfs_free_space: u64,
    vfs_used_space: u64,

    records: u64,

    total_space: u64,
    used_space: u64,
    free_space: u64,
    effective_space: u64,

    fragmentation: f64,

    read_rps: u64,
    write_rps: u64,
    max_read_rps: u64,
    max_write_rps: u64,

    status: BackendStatus,
    read_only: bool,
    disabled: bool,
}

impl Backend {
    pub fn new(node_key: &str, stat: BackendStat) -> Self {
        let key = format!("{}/{}", node_key, stat.backend_id);
        let mut backend = Self {
            key,
            node_key: node_key.to_string(),
            stat,
            vfs_total_space: 0,
            vfs_free_space: 0,
            vfs_used_space: 0,
            records: 0,
            total_space: 0,
            used_space: 0,
            free_space: 0,
            effective_space: 0,
            fragmentation: 0.0,
            read_rps: 0,
            write_rps: 0,
            max_read_rps: 0,
            max_write_rps: 0,
            status: BackendStatus::Init,
            read_only: false,
            disabled: false,
        };
        backend.read_only = backend.stat.state == STATE_READ_ONLY;
        backend.disabled = backend.stat.state == STATE_DISABLED;
        backend
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn node_key(&self) -> &str {
        &self.node_key
    }

    pub fn status(&self) -> BackendStatus {
        self.status
    }

    pub fn group_id(&self) -> u64 {
        self.stat.group
    }

    pub fn fsid(&self) -> u64 {
        self.stat.fsid
    }

    pub fn vfs_total_space(&self) -> u64 {
        self.vfs_total_space
    }

    pub fn vfs_free_space(&self) -> u64 {
        self.vfs_free_space
    }

    pub fn vfs_used_space(&self) -> u64 {
        self.vfs_used_space
    }

    pub fn total_space(&self) -> u64 {
        self.total_space
    }

    pub fn used_space(&self) -> u64 {
        self.used_space
    }

    pub fn free_space(&self) -> u64 {
        self.free_space
    }

    pub fn effective_space(&self) -> u64 {
        self.effective_space
    }

    pub fn fragmentation(&self) -> f64 {
        self.fragmentation
    }

    pub fn read_rps(&self) -> u64 {
        self.read_rps
    }

    pub fn write_rps(&self) -> u64 {
        self.write_rps
    }

    pub fn max_read_rps(&self) -> u64 {
        self.max_read_rps
    }

    pub fn max_write_rps(&self) -> u64 {
        self.max_write_rps
    }

    /// Folds a fresh stat sample in, deriving request rates from the delta
    /// against the previous sample when the samples are far enough apart.
    pub fn apply_stat(&mut self, stat: BackendStat, load_average: f64) {
        let dt = stat.timestamp_secs() - self.stat.timestamp_secs();

        if dt > 1.0 {
            self.read_rps =
                (stat.read_ios.saturating_sub(self.stat.read_ios) as f64 / dt) as u64;
            self.write_rps =
                (stat.write_ios.saturating_sub(self.stat.write_ios) as f64 / dt) as u64;

            let la = load_average.max(0.01);
            self.max_read_rps = ((self.read_rps as f64 / la).max(100.0)) as u64;
            self.max_write_rps = ((self.write_rps as f64 / la).max(100.0)) as u64;
        }

        self.read_only = stat.state == STATE_READ_ONLY;
        self.disabled = stat.state == STATE_DISABLED;
        self.stat = stat;
    }

    /// Recomputes the derived space figures from the current stat sample.
    pub fn recalculate(&mut self, reserved_space: u64) {
        self.vfs_total_space = self.stat.vfs_blocks * self.stat.vfs_bsize;
        self.vfs_free_space = self.stat.vfs_bavail * self.stat.vfs_bsize;
        self.vfs_used_space = self.vfs_total_space.saturating_sub(self.vfs_free_space);

        self.records = self.stat.records_total.saturating_sub(self.stat.records_removed);
        self.fragmentation =
            self.stat.records_removed as f64 / self.stat.records_total.max(1) as f64;

        if self.stat.blob_size_limit > 0 {
            // vfs_total_space can be less than blob_size_limit in case of
            // misconfiguration
            self.total_space = self.stat.blob_size_limit.min(self.vfs_total_space);
            self.used_space = self.stat.base_size;
            self.free_space = self
                .vfs_free_space
                .min(self.total_space.saturating_sub(self.used_space));
        } else {
            self.total_space = self.vfs_total_space;
            self.free_space = self.vfs_free_space;
            self.used_space = self.vfs_used_space;
        }

        let share = if self.vfs_total_space > 0 {
            self.total_space as f64 / self.vfs_total_space as f64
        } else {
            0.0
        };
        let reserved_share = (reserved_space as f64 * share).ceil() as u64;
        self.effective_space = self.total_space.saturating_sub(reserved_share);
    }

    /// Derives the backend status. Order: a reported error or a disabled
    /// state wins, then a broken filesystem, then read-only.
    pub fn update_status(&mut self, fs_broken: bool) {
        self.status = if self.stat.error != 0 || self.disabled {
            BackendStatus::Stalled
        } else if fs_broken {
            BackendStatus::Broken
        } else if self.read_only {
            BackendStatus::Ro
        } else {
            BackendStatus::Ok
        };
    }

    pub fn full(&self) -> bool {
        self.free_space == 0 || self.used_space >= self.effective_space
    }

    /// Folds another instance of this backend in. The sample with the newer
    /// timestamp wins wholesale; `true` is returned when the local side was
    /// already newer.
    pub fn merge(&mut self, other: &Backend) -> bool {
        let my_ts = self.stat.timestamp_us();
        let other_ts = other.stat.timestamp_us();

        if my_ts > other_ts {
            return true;
        }
        if my_ts < other_ts {
            let key = std::mem::take(&mut self.key);
            let node_key = std::mem::take(&mut self.node_key);
            *self = other.clone();
            self.key = key;
            self.node_key = node_key;
        }
        false
    }

    pub fn to_json(&self) -> Value {
        json!({
            "timestamp": {
                "tv_sec": self.stat.ts_sec,
                "tv_usec": self.stat.ts_usec,
            },
            "node": self.node_key,
            "backend_id": self.stat.backend_id,
            "state": self.stat.state,
            "vfs_blocks": self.stat.vfs_blocks,
            "vfs_bavail": self.stat.vfs_bavail,
            "vfs_bsize": self.stat.vfs_bsize,
            "records_total": self.stat.records_total,
            "records_removed": self.stat.records_removed,
            "records_removed_size": self.stat.records_removed_size,
            "base_size": self.stat.base_size,
            "fsid": self.stat.fsid,
            "defrag_state": self.stat.defrag_state,
            "want_defrag": self.stat.want_defrag,
            "read_ios": self.stat.read_ios,
            "write_ios": self.stat.write_ios,
            "error": self.stat.error,
            "blob_size_limit": self.stat.blob_size_limit,
            "max_blob_base_size": self.stat.max_blob_base_size,
            "blob_size": self.stat.blob_size,
            "group": self.stat.group,
            "vfs_free_space": self.vfs_free_space,
            "vfs_total_space": self.vfs_total_space,
            "vfs_used_space": self.vfs_used_space,
            "records": self.records,
            "free_space": self.free_space,
            "total_space": self.total_space,
            "used_space": self.used_space,
            "effective_space": self.effective_space,
            "fragmentation": self.fragmentation,
            "read_rps": self.read_rps,
            "write_rps": self.write_rps,
            "max_read_rps": self.max_read_rps,
            "max_write_rps": self.max_write_rps,
            "status": self.status.to_string(),
            "read_only": self.read_only,
            "disabled": self.disabled,
        })
    }
}
