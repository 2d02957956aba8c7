// src/core/entity/mod.rs

//! The entity model of the storage graph: nodes, backends, filesystems,
//! groups, couples, namespaces, jobs, group history, and hosts.
//!
//! Entities never hold references to each other. Every cross-link is an
//! index into the owning map of the `Storage` graph (a node key, a group id,
//! a couple key), resolved on access. This keeps every entity `Clone` and
//! makes the per-round shadow graph a plain clone of the live graph.

pub mod backend;
pub mod couple;
pub mod filesystem;
pub mod group;
pub mod history;
pub mod host;
pub mod job;
pub mod namespace;
pub mod node;

pub use backend::{Backend, BackendStat, BackendStatus};
pub use couple::{Couple, CoupleStatus};
pub use filesystem::{Filesystem, FsStat, FsStatus};
pub use group::{Group, GroupInternalStatus, GroupMetadata, GroupStatus, GroupType};
pub use history::GroupHistoryEntry;
pub use host::Host;
pub use job::{Job, JobStatus, JobType};
pub use namespace::{Namespace, NamespaceSettings};
pub use node::{Node, NodeStat};

/// Nanoseconds since the UNIX epoch, used to stamp freshly ingested state.
pub(crate) fn wall_clock_ns() -> u64 {
    use std::time::{SystemTime, UNIX_EPOCH};
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_nanos() as u64)
        .unwrap_or(0)
}
