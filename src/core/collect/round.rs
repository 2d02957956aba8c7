// src/core/collect/round.rs

//! One collection round: a staged pipeline from node discovery through the
//! stat fanout, external DB ingestion, metakey reads, and the status-update
//! cascade. The round owns a shadow graph cloned from the live one; the
//! collector merges the result back when the round completes.

use super::discovery::Discovery;
use super::fanout::StatsFanout;
use super::metadb::{self, MetaDb};
use super::metakey::{self, MetakeyClient};
use crate::config::Config;
use crate::core::entity::{GroupHistoryEntry, Job, wall_clock_ns};
use crate::core::filter::Filter;
use crate::core::inventory::Inventory;
use crate::core::metrics::METAKEY_FAILURES_TOTAL;
use crate::core::stats::StatsParser;
use crate::core::storage::{Entries, Storage};
use futures::StreamExt;
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Instant;
use tracing::{debug, info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RoundKind {
    Regular,
    ForcedFull,
    ForcedPartial,
}

impl RoundKind {
    fn label(self) -> &'static str {
        match self {
            Self::Regular => "regular",
            Self::ForcedFull => "forced full",
            Self::ForcedPartial => "forced partial",
        }
    }
}

/// Per-phase timings of one round, in microseconds. Retained by the
/// collector for the summary report.
#[derive(Debug, Clone, Copy, Default)]
pub struct RoundClock {
    pub total: u64,
    pub perform_download: u64,
    pub finish_monitor_stats: u64,
    pub metadata_download: u64,
    pub storage_update: u64,
    pub merge_time: u64,
}

/// Everything a round needs from the outside world.
pub struct RoundContext {
    pub config: Arc<Config>,
    pub fanout: StatsFanout,
    pub discovery: Arc<dyn Discovery>,
    pub metakey: Arc<dyn MetakeyClient>,
    pub metadb: Arc<dyn MetaDb>,
    pub inventory: Arc<Inventory>,
}

pub struct Round {
    kind: RoundKind,
    filter: Option<Filter>,
    shadow: Storage,
    entries: Entries,
    clock: RoundClock,
}

impl Round {
    /// A round starts from a clone of the live graph.
    pub fn new(kind: RoundKind, filter: Option<Filter>, shadow: Storage) -> Self {
        Self {
            kind,
            filter,
            shadow,
            entries: Entries::default(),
            clock: RoundClock::default(),
        }
    }

    /// Drives the round to completion and hands the updated shadow back for
    /// the merge.
    pub async fn execute(mut self, ctx: &RoundContext) -> (Storage, RoundClock) {
        let total_start = Instant::now();

        self.start(ctx).await;

        info!(
            "Starting {} round with {} nodes",
            self.kind.label(),
            if self.kind == RoundKind::ForcedPartial {
                self.entries.nodes.len()
            } else {
                self.shadow.nodes().len()
            }
        );

        // Stat downloads and the DB ingest fan out in parallel; both have
        // completed before processing starts.
        let download_start = Instant::now();
        let targets = self.download_targets();
        let (downloads, db_input) = tokio::join!(
            ctx.fanout.download_all(targets),
            fetch_db_input(ctx, self.shadow.group_history_ts())
        );
        self.clock.perform_download = download_start.elapsed().as_micros() as u64;

        let process_start = Instant::now();
        self.process(ctx, downloads, db_input).await;
        self.clock.finish_monitor_stats = process_start.elapsed().as_micros() as u64;

        let metadata_start = Instant::now();
        self.download_metadata(ctx).await;
        self.clock.metadata_download = metadata_start.elapsed().as_micros() as u64;

        let update_start = Instant::now();
        self.shadow.update(&ctx.config);
        self.clock.storage_update = update_start.elapsed().as_micros() as u64;

        self.clock.total = total_start.elapsed().as_micros() as u64;
        (self.shadow, self.clock)
    }

    /// Stage 1: resolve the node set. Full rounds take the routing table;
    /// partial rounds project the filter against the shadow.
    async fn start(&mut self, ctx: &RoundContext) {
        match self.kind {
            RoundKind::Regular | RoundKind::ForcedFull => {
                match ctx.discovery.resolve_nodes().await {
                    Ok(nodes) => {
                        for node in nodes {
                            self.shadow.add_node(node.host(), node.port(), node.family());
                        }
                    }
                    Err(e) => warn!("Node discovery failed: {}", e),
                }
            }
            RoundKind::ForcedPartial => {
                if let Some(filter) = &self.filter {
                    self.entries = self.shadow.select(filter);
                }
            }
        }
    }

    fn download_targets(&self) -> Vec<(String, String)> {
        self.shadow
            .nodes()
            .values()
            .filter(|node| {
                self.kind != RoundKind::ForcedPartial || self.entries.nodes.contains(node.key())
            })
            .map(|node| (node.key().to_string(), node.host().to_string()))
            .collect()
    }

    /// Stage 3: parse and integrate arrived monitor payloads, fold in the
    /// staged jobs and history, and resolve host DCs.
    async fn process(
        &mut self,
        ctx: &RoundContext,
        downloads: Vec<(String, Result<bytes::Bytes, crate::core::FleetmonError>)>,
        db_input: DbInput,
    ) {
        let bodies: Vec<(String, bytes::Bytes)> = downloads
            .into_iter()
            .filter_map(|(key, result)| result.ok().map(|body| (key, body)))
            .collect();

        // Parsing runs on the blocking pool, bounded like the downloads;
        // integration into the shadow is serial.
        let parsed: Vec<_> = futures::stream::iter(bodies.into_iter().map(|(key, body)| {
            async move {
                let started = Instant::now();
                let result = tokio::task::spawn_blocking(move || StatsParser::parse(&body)).await;
                (key, result, started.elapsed().as_micros() as u64)
            }
        }))
        .buffer_unordered(ctx.config.worker_pool_size)
        .collect()
        .await;

        for (node_key, result, parse_micros) in parsed {
            match result {
                Ok(Ok(stats)) => {
                    self.shadow.ingest_node_stats(&node_key, stats, &ctx.config);
                    if let Some(node) = self.shadow.node_mut(&node_key) {
                        node.clock.stats_parse = parse_micros;
                    }
                }
                Ok(Err(e)) => warn!("Error parsing statistics of node {}: {}", node_key, e),
                Err(e) => warn!("Stat parse task for node {} failed: {}", node_key, e),
            }
        }

        if let Some((jobs, timestamp_ns)) = db_input.jobs {
            self.shadow.save_new_jobs(jobs, timestamp_ns);
        }
        if let Some((history, timestamp)) = db_input.history {
            self.shadow.save_group_history(history, timestamp);
        }

        self.shadow.update_group_structure();
        self.shadow.process_new_jobs();

        let hosts: BTreeSet<String> = self
            .shadow
            .nodes()
            .values()
            .map(|node| node.host().to_string())
            .collect();
        for host in hosts {
            let dc = ctx.inventory.get_dc(&host).await;
            self.shadow.set_host_dc(&host, &dc);
        }
    }

    /// Stage 4: concurrent metakey reads for every selected group. A failed
    /// read marks only the offending group.
    async fn download_metadata(&mut self, ctx: &RoundContext) {
        let group_ids: Vec<u64> = if self.kind == RoundKind::ForcedPartial {
            self.entries.groups.iter().copied().collect()
        } else {
            self.shadow.groups().keys().copied().collect()
        };

        if group_ids.is_empty() {
            info!("No groups to download metadata");
            return;
        }
        info!("Scheduling metadata download for {} groups", group_ids.len());

        let replies = metakey::read_all(
            ctx.metakey.clone(),
            group_ids,
            ctx.config.worker_pool_size,
        )
        .await;

        for (group_id, reply) in replies {
            let Some(group) = self.shadow.group_mut(group_id) else {
                continue;
            };
            match reply {
                Ok(reply) => {
                    debug!("Successfully downloaded metadata for group {}", group_id);
                    group.save_metadata(&reply.data, reply.timestamp_ns);
                }
                Err(e) => {
                    METAKEY_FAILURES_TOTAL.inc();
                    group.handle_metadata_download_failed(&e.to_string());
                }
            }
        }

        info!("Group metadata download completed");
    }
}

struct DbInput {
    jobs: Option<(Vec<Job>, u64)>,
    history: Option<(Vec<GroupHistoryEntry>, f64)>,
}

/// The external-DB leg of the fanout: active jobs plus group history. A
/// missing database never blocks the round.
async fn fetch_db_input(ctx: &RoundContext, history_since: f64) -> DbInput {
    let mut input = DbInput {
        jobs: None,
        history: None,
    };

    match ctx.metadb.active_jobs().await {
        Ok(records) => {
            let timestamp_ns = wall_clock_ns();
            input.jobs = Some((metadb::parse_jobs(&records, timestamp_ns), timestamp_ns));
        }
        Err(e) => warn!("Skipping jobs ingest: {}", e),
    }

    match ctx.metadb.group_history_since(history_since).await {
        Ok(records) => {
            let now_secs = wall_clock_ns() as f64 / 1e9;
            input.history = Some((metadb::parse_group_history(&records), now_secs));
        }
        Err(e) => warn!("Skipping group history ingest: {}", e),
    }

    input
}
