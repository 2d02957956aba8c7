// src/core/stats/parser.rs

//! The monitor stat parser.
//!
//! The automaton keeps a 64-bit bitmask of the currently matched key path
//! (bit 0 is always set) and a depth counter of object nesting. Folder
//! tables, one per depth, map a key name to a token bit, guarded by the
//! exact mask of the enclosing path; wildcard entries match any key and
//! negated entries match any key except one (used to skip the loopback
//! interface). Terminal integers and strings are routed through lookup
//! tables keyed by the full path mask, with Set/Sum/Max write actions.
//! Unknown keys never match a folder entry and are skipped wholesale.

use crate::core::FleetmonError;
use crate::core::entity::{BackendStat, NodeStat};
use serde_json::Value;

/// How a folder entry matches a key name.
enum KeyMatch {
    Exact(&'static str),
    Any,
    Not(&'static str),
}

struct FolderEntry {
    key: KeyMatch,
    keys: u64,
    token: u64,
}

enum Action {
    Set,
    Sum,
    Max,
}

struct UIntInfo {
    keys: u64,
    action: Action,
    write: fn(&mut StatsData) -> &mut u64,
}

struct StrInfo {
    keys: u64,
    write: fn(&mut StatsData) -> &mut String,
}

/// Destination of the walk: the node sample plus the backend struct being
/// accumulated for the current per-backend folder.
#[derive(Debug, Default, Clone)]
struct StatsData {
    node: NodeStat,
    backend: BackendStat,
}

// Path token bits. Bit 0 is reserved for the automaton root.
const BACKENDS: u64 = 1 << 1;
const BACKEND_FOLDER: u64 = 1 << 2;
const BACKEND: u64 = 1 << 3;
const BACKEND_ID: u64 = 1 << 4;
const STATUS: u64 = 1 << 5;
const DSTAT: u64 = 1 << 6;
const VFS: u64 = 1 << 7;
const READ_IOS: u64 = 1 << 8;
const WRITE_IOS: u64 = 1 << 9;
const ERROR: u64 = 1 << 10;
const BLOCKS: u64 = 1 << 11;
const BAVAIL: u64 = 1 << 12;
const BSIZE: u64 = 1 << 13;
const FSID: u64 = 1 << 14;
const SUMMARY_STATS: u64 = 1 << 15;
const RECORDS_TOTAL: u64 = 1 << 16;
const RECORDS_REMOVED: u64 = 1 << 17;
const RECORDS_REMOVED_SIZE: u64 = 1 << 18;
const WANT_DEFRAG: u64 = 1 << 19;
const BASE_SIZE: u64 = 1 << 20;
const CONFIG: u64 = 1 << 21;
const BLOB_SIZE_LIMIT: u64 = 1 << 22;
const BLOB_SIZE: u64 = 1 << 23;
const BASE_STATS: u64 = 1 << 24;
const BLOB_FILENAME: u64 = 1 << 25;
const BLOB_BASE_SIZE: u64 = 1 << 26;
const DEFRAG_STATE: u64 = 1 << 27;
const STATE: u64 = 1 << 28;
const GROUP: u64 = 1 << 29;
const DATA_PATH: u64 = 1 << 30;
const TIMESTAMP: u64 = 1 << 31;
const TV_SEC: u64 = 1 << 32;
const TV_USEC: u64 = 1 << 33;
const PROCFS: u64 = 1 << 34;
const VM: u64 = 1 << 35;
const LA: u64 = 1 << 36;
const NET: u64 = 1 << 37;
const NET_INTERFACES: u64 = 1 << 38;
const NET_INTERFACE_NAME: u64 = 1 << 39;
const RECEIVE: u64 = 1 << 40;
const TRANSMIT: u64 = 1 << 41;
const BYTES: u64 = 1 << 42;

const FOLDERS: &[&[FolderEntry]] = &[
    &[
        FolderEntry { key: KeyMatch::Exact("backends"), keys: 0, token: BACKENDS },
        FolderEntry { key: KeyMatch::Exact("timestamp"), keys: 0, token: TIMESTAMP },
        FolderEntry { key: KeyMatch::Exact("procfs"), keys: 0, token: PROCFS },
    ],
    &[
        FolderEntry { key: KeyMatch::Any, keys: BACKENDS, token: BACKEND_FOLDER },
        FolderEntry { key: KeyMatch::Exact("tv_sec"), keys: TIMESTAMP, token: TV_SEC },
        FolderEntry { key: KeyMatch::Exact("tv_usec"), keys: TIMESTAMP, token: TV_USEC },
        FolderEntry { key: KeyMatch::Exact("vm"), keys: PROCFS, token: VM },
        FolderEntry { key: KeyMatch::Exact("net"), keys: PROCFS, token: NET },
    ],
    &[
        FolderEntry { key: KeyMatch::Exact("backend"), keys: BACKENDS | BACKEND_FOLDER, token: BACKEND },
        FolderEntry { key: KeyMatch::Exact("backend_id"), keys: BACKENDS | BACKEND_FOLDER, token: BACKEND_ID },
        FolderEntry { key: KeyMatch::Exact("status"), keys: BACKENDS | BACKEND_FOLDER, token: STATUS },
        FolderEntry { key: KeyMatch::Exact("la"), keys: PROCFS | VM, token: LA },
        FolderEntry { key: KeyMatch::Exact("net_interfaces"), keys: PROCFS | NET, token: NET_INTERFACES },
    ],
    &[
        FolderEntry { key: KeyMatch::Exact("dstat"), keys: BACKENDS | BACKEND_FOLDER | BACKEND, token: DSTAT },
        FolderEntry { key: KeyMatch::Exact("vfs"), keys: BACKENDS | BACKEND_FOLDER | BACKEND, token: VFS },
        FolderEntry { key: KeyMatch::Exact("summary_stats"), keys: BACKENDS | BACKEND_FOLDER | BACKEND, token: SUMMARY_STATS },
        FolderEntry { key: KeyMatch::Exact("config"), keys: BACKENDS | BACKEND_FOLDER | BACKEND, token: CONFIG },
        FolderEntry { key: KeyMatch::Exact("base_stats"), keys: BACKENDS | BACKEND_FOLDER | BACKEND, token: BASE_STATS },
        FolderEntry { key: KeyMatch::Exact("defrag_state"), keys: BACKENDS | BACKEND_FOLDER | STATUS, token: DEFRAG_STATE },
        FolderEntry { key: KeyMatch::Exact("state"), keys: BACKENDS | BACKEND_FOLDER | STATUS, token: STATE },
        FolderEntry { key: KeyMatch::Not("lo"), keys: PROCFS | NET | NET_INTERFACES, token: NET_INTERFACE_NAME },
    ],
    &[
        FolderEntry { key: KeyMatch::Exact("read_ios"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | DSTAT, token: READ_IOS },
        FolderEntry { key: KeyMatch::Exact("write_ios"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | DSTAT, token: WRITE_IOS },
        FolderEntry { key: KeyMatch::Exact("error"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | DSTAT, token: ERROR },
        FolderEntry { key: KeyMatch::Exact("blocks"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS, token: BLOCKS },
        FolderEntry { key: KeyMatch::Exact("bavail"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS, token: BAVAIL },
        FolderEntry { key: KeyMatch::Exact("bsize"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS, token: BSIZE },
        FolderEntry { key: KeyMatch::Exact("fsid"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS, token: FSID },
        FolderEntry { key: KeyMatch::Exact("records_total"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS, token: RECORDS_TOTAL },
        FolderEntry { key: KeyMatch::Exact("records_removed"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS, token: RECORDS_REMOVED },
        FolderEntry { key: KeyMatch::Exact("records_removed_size"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS, token: RECORDS_REMOVED_SIZE },
        FolderEntry { key: KeyMatch::Exact("want_defrag"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS, token: WANT_DEFRAG },
        FolderEntry { key: KeyMatch::Exact("base_size"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS, token: BASE_SIZE },
        FolderEntry { key: KeyMatch::Exact("blob_size_limit"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG, token: BLOB_SIZE_LIMIT },
        FolderEntry { key: KeyMatch::Exact("blob_size"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG, token: BLOB_SIZE },
        FolderEntry { key: KeyMatch::Exact("group"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG, token: GROUP },
        FolderEntry { key: KeyMatch::Exact("data"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG, token: DATA_PATH },
        FolderEntry { key: KeyMatch::Any, keys: BACKENDS | BACKEND_FOLDER | BACKEND | BASE_STATS, token: BLOB_FILENAME },
        FolderEntry { key: KeyMatch::Exact("receive"), keys: PROCFS | NET | NET_INTERFACES | NET_INTERFACE_NAME, token: RECEIVE },
        FolderEntry { key: KeyMatch::Exact("transmit"), keys: PROCFS | NET | NET_INTERFACES | NET_INTERFACE_NAME, token: TRANSMIT },
    ],
    &[
        FolderEntry { key: KeyMatch::Exact("base_size"), keys: BACKENDS | BACKEND_FOLDER | BACKEND | BASE_STATS | BLOB_FILENAME, token: BLOB_BASE_SIZE },
        FolderEntry { key: KeyMatch::Exact("bytes"), keys: PROCFS | NET | NET_INTERFACES | NET_INTERFACE_NAME | RECEIVE, token: BYTES },
        FolderEntry { key: KeyMatch::Exact("bytes"), keys: PROCFS | NET | NET_INTERFACES | NET_INTERFACE_NAME | TRANSMIT, token: BYTES },
    ],
];

const UINT_INFO: &[UIntInfo] = &[
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND_ID, action: Action::Set, write: |d| &mut d.backend.backend_id },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | DSTAT | READ_IOS, action: Action::Set, write: |d| &mut d.backend.read_ios },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | DSTAT | WRITE_IOS, action: Action::Set, write: |d| &mut d.backend.write_ios },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | DSTAT | ERROR, action: Action::Set, write: |d| &mut d.backend.error },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS | BLOCKS, action: Action::Set, write: |d| &mut d.backend.vfs_blocks },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS | BAVAIL, action: Action::Set, write: |d| &mut d.backend.vfs_bavail },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS | BSIZE, action: Action::Set, write: |d| &mut d.backend.vfs_bsize },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | VFS | FSID, action: Action::Set, write: |d| &mut d.backend.fsid },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS | RECORDS_TOTAL, action: Action::Set, write: |d| &mut d.backend.records_total },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS | RECORDS_REMOVED, action: Action::Set, write: |d| &mut d.backend.records_removed },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS | RECORDS_REMOVED_SIZE, action: Action::Set, write: |d| &mut d.backend.records_removed_size },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS | WANT_DEFRAG, action: Action::Set, write: |d| &mut d.backend.want_defrag },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | SUMMARY_STATS | BASE_SIZE, action: Action::Set, write: |d| &mut d.backend.base_size },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG | BLOB_SIZE_LIMIT, action: Action::Set, write: |d| &mut d.backend.blob_size_limit },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG | BLOB_SIZE, action: Action::Set, write: |d| &mut d.backend.blob_size },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG | GROUP, action: Action::Set, write: |d| &mut d.backend.group },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | BACKEND | BASE_STATS | BLOB_FILENAME | BLOB_BASE_SIZE, action: Action::Max, write: |d| &mut d.backend.max_blob_base_size },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | STATUS | DEFRAG_STATE, action: Action::Set, write: |d| &mut d.backend.defrag_state },
    UIntInfo { keys: BACKENDS | BACKEND_FOLDER | STATUS | STATE, action: Action::Set, write: |d| &mut d.backend.state },
    UIntInfo { keys: TIMESTAMP | TV_SEC, action: Action::Set, write: |d| &mut d.node.ts_sec },
    UIntInfo { keys: TIMESTAMP | TV_USEC, action: Action::Set, write: |d| &mut d.node.ts_usec },
    UIntInfo { keys: PROCFS | VM | LA, action: Action::Set, write: |d| &mut d.node.la1 },
    UIntInfo { keys: PROCFS | NET | NET_INTERFACES | NET_INTERFACE_NAME | RECEIVE | BYTES, action: Action::Sum, write: |d| &mut d.node.rx_bytes },
    UIntInfo { keys: PROCFS | NET | NET_INTERFACES | NET_INTERFACE_NAME | TRANSMIT | BYTES, action: Action::Sum, write: |d| &mut d.node.tx_bytes },
];

const STR_INFO: &[StrInfo] = &[StrInfo {
    keys: BACKENDS | BACKEND_FOLDER | BACKEND | CONFIG | DATA_PATH,
    write: |d| &mut d.backend.base_path,
}];

/// The fully parsed monitor payload of one node.
#[derive(Debug, Default, Clone)]
pub struct ParsedStats {
    pub node: NodeStat,
    pub backends: Vec<BackendStat>,
}

pub struct StatsParser {
    keys: u64,
    depth: usize,
    bad: bool,
    data: StatsData,
    backends: Vec<BackendStat>,
}

impl StatsParser {
    fn new() -> Self {
        Self {
            keys: 1,
            depth: 0,
            bad: false,
            data: StatsData::default(),
            backends: Vec::new(),
        }
    }

    /// Parses one monitor payload. Both the procfs sample and every
    /// per-backend stat come out of a single walk; backend stats are stamped
    /// with the payload timestamp afterwards.
    pub fn parse(body: &[u8]) -> Result<ParsedStats, FleetmonError> {
        let document: Value = serde_json::from_slice(body)?;

        let mut parser = Self::new();
        parser.walk(&document);

        if !parser.good() {
            return Err(FleetmonError::ParseFailure(
                "monitor payload did not unwind cleanly".to_string(),
            ));
        }

        let mut stats = ParsedStats {
            node: parser.data.node,
            backends: parser.backends,
        };
        for backend in &mut stats.backends {
            backend.ts_sec = stats.node.ts_sec;
            backend.ts_usec = stats.node.ts_usec;
        }

        Ok(stats)
    }

    fn good(&self) -> bool {
        self.keys == 1 && self.depth == 0 && !self.bad
    }

    fn key_depth(&self) -> usize {
        self.keys.count_ones() as usize
    }

    fn clear_key(&mut self) {
        if self.keys != 1 {
            let msb = 63 - self.keys.leading_zeros();
            self.keys ^= 1 << msb;
        }
    }

    fn walk(&mut self, value: &Value) {
        match value {
            Value::Object(map) => {
                self.depth += 1;
                for (key, child) in map {
                    self.on_key(key);
                    self.walk(child);
                }
                self.on_end_object();
                if self.depth == self.key_depth() {
                    self.clear_key();
                }
                self.depth -= 1;
            }
            Value::Array(items) => {
                for item in items {
                    self.walk(item);
                }
            }
            Value::Number(n) => {
                if let Some(val) = n.as_u64() {
                    self.on_uint(val);
                }
            }
            Value::String(s) => self.on_str(s),
            _ => {}
        }
    }

    fn on_key(&mut self, name: &str) {
        let kdepth = self.key_depth();
        if self.depth != kdepth {
            return;
        }
        if kdepth > FOLDERS.len() {
            self.bad = true;
            return;
        }

        for entry in FOLDERS[self.depth - 1] {
            if entry.keys != self.keys & !1 {
                continue;
            }
            match entry.key {
                KeyMatch::Exact(key) => {
                    if key == name {
                        self.keys |= entry.token;
                        return;
                    }
                }
                KeyMatch::Any => {
                    self.keys |= entry.token;
                    return;
                }
                KeyMatch::Not(key) => {
                    if key != name {
                        self.keys |= entry.token;
                        return;
                    }
                }
            }
        }
    }

    fn on_uint(&mut self, val: u64) {
        if self.key_depth() != self.depth + 1 {
            return;
        }

        for info in UINT_INFO {
            if info.keys == self.keys & !1 {
                let dst = (info.write)(&mut self.data);
                match info.action {
                    Action::Set => *dst = val,
                    Action::Sum => *dst += val,
                    Action::Max => {
                        if *dst < val {
                            *dst = val;
                        }
                    }
                }
                self.clear_key();
                return;
            }
        }

        // A numeric leaf on a fully matched path with no destination means
        // the path tables and the payload disagree.
        self.bad = true;
    }

    fn on_str(&mut self, val: &str) {
        if self.key_depth() != self.depth + 1 {
            return;
        }

        for info in STR_INFO {
            if info.keys == self.keys & !1 {
                *(info.write)(&mut self.data) = val.to_string();
                self.clear_key();
                return;
            }
        }
    }

    /// Closing a per-backend folder object emits the accumulated backend
    /// stat and resets the scratch struct for the next folder.
    fn on_end_object(&mut self) {
        if self.keys == (BACKENDS | BACKEND_FOLDER | 1) && self.depth == 3 {
            self.backends.push(std::mem::take(&mut self.data.backend));
        }
    }
}
