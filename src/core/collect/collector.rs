// src/core/collect/collector.rs

//! The collector: owner of the live graph and of the round schedule.
//!
//! Rounds execute serially off one command loop. The regular timer fires a
//! round every `round_interval_secs`; forced rounds arrive over the command
//! channel and pending requests of the same kind collapse into one round.
//! The merge into the live graph is the only write access to it; read-only
//! consumers take the read half of the lock.

use super::round::{Round, RoundClock, RoundContext, RoundKind};
use crate::core::FleetmonError;
use crate::core::filter::Filter;
use crate::core::metrics::{
    COUPLES_TRACKED, GROUPS_TRACKED, NODES_TRACKED, ROUND_DURATION_SECONDS, ROUNDS_TOTAL,
};
use crate::core::storage::Storage;
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::sync::{RwLock, mpsc, oneshot};
use tokio::time;
use tracing::{debug, info};

enum Command {
    ForceUpdate(oneshot::Sender<String>),
    Refresh(Filter, oneshot::Sender<String>),
}

/// Cheap handle given to the RPC layer: snapshot reads and forced rounds.
#[derive(Clone)]
pub struct CollectorHandle {
    live: Arc<RwLock<Storage>>,
    round_clock: Arc<parking_lot::Mutex<RoundClock>>,
    tx: mpsc::Sender<Command>,
}

impl CollectorHandle {
    pub fn live(&self) -> &Arc<RwLock<Storage>> {
        &self.live
    }

    pub fn last_round_clock(&self) -> RoundClock {
        *self.round_clock.lock()
    }

    /// Runs a FORCED_FULL round; resolves with the completion report line.
    pub async fn force_update(&self) -> Result<String, FleetmonError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::ForceUpdate(reply_tx))
            .await
            .map_err(|_| FleetmonError::Internal("collector loop is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| FleetmonError::Internal("collector dropped the reply".into()))
    }

    /// Runs a FORCED_PARTIAL round limited to the filter.
    pub async fn refresh(&self, filter: Filter) -> Result<String, FleetmonError> {
        let (reply_tx, reply_rx) = oneshot::channel();
        self.tx
            .send(Command::Refresh(filter, reply_tx))
            .await
            .map_err(|_| FleetmonError::Internal("collector loop is gone".into()))?;
        reply_rx
            .await
            .map_err(|_| FleetmonError::Internal("collector dropped the reply".into()))
    }
}

pub struct Collector {
    ctx: Arc<RoundContext>,
    live: Arc<RwLock<Storage>>,
    round_clock: Arc<parking_lot::Mutex<RoundClock>>,
    rx: mpsc::Receiver<Command>,
}

impl Collector {
    pub fn new(ctx: RoundContext) -> (Self, CollectorHandle) {
        let (tx, rx) = mpsc::channel(64);
        let live = Arc::new(RwLock::new(Storage::new()));
        let round_clock = Arc::new(parking_lot::Mutex::new(RoundClock::default()));

        let handle = CollectorHandle {
            live: live.clone(),
            round_clock: round_clock.clone(),
            tx,
        };
        let collector = Self {
            ctx: Arc::new(ctx),
            live,
            round_clock,
            rx,
        };
        (collector, handle)
    }

    /// The command loop: regular timer rounds interleaved with forced ones.
    pub async fn run(mut self) {
        info!("Collector: starting");

        let interval = Duration::from_secs(self.ctx.config.round_interval_secs);
        let mut timer = time::interval(interval);
        timer.set_missed_tick_behavior(time::MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = timer.tick() => {
                    self.run_round(RoundKind::Regular, None, vec![]).await;
                }
                command = self.rx.recv() => {
                    let Some(command) = command else { break };
                    self.run_forced(command).await;
                }
            }
        }

        info!("Collector: command channel closed, stopping");
    }

    /// Executes a forced round, first draining the queue so that pending
    /// requests of the same kind collapse into this round.
    async fn run_forced(&mut self, first: Command) {
        let mut force_replies = Vec::new();
        let mut refreshes = Vec::new();

        let mut enqueue = |command: Command| match command {
            Command::ForceUpdate(reply) => force_replies.push(reply),
            Command::Refresh(filter, reply) => refreshes.push((filter, reply)),
        };
        enqueue(first);
        while let Ok(command) = self.rx.try_recv() {
            enqueue(command);
        }

        if !force_replies.is_empty() {
            debug!(
                "Running forced full round for {} collapsed request(s)",
                force_replies.len()
            );
            self.run_round(RoundKind::ForcedFull, None, force_replies).await;
        }

        for (filter, reply) in refreshes {
            self.run_round(RoundKind::ForcedPartial, Some(filter), vec![reply])
                .await;
        }
    }

    async fn run_round(
        &self,
        kind: RoundKind,
        filter: Option<Filter>,
        replies: Vec<oneshot::Sender<String>>,
    ) {
        let total_start = Instant::now();

        let shadow = self.live.read().await.clone();
        let round = Round::new(kind, filter, shadow);
        let (result, mut clock) = round.execute(&self.ctx).await;

        let merge_start = Instant::now();
        let have_newer = {
            let mut live = self.live.write().await;
            let have_newer = live.merge(&result);

            NODES_TRACKED.set(live.nodes().len() as f64);
            GROUPS_TRACKED.set(live.groups().len() as f64);
            COUPLES_TRACKED.set(live.couples().len() as f64);

            have_newer
        };
        clock.merge_time = merge_start.elapsed().as_micros() as u64;
        clock.total = total_start.elapsed().as_micros() as u64;

        if have_newer {
            debug!("Live graph held state newer than the round shadow");
        }

        ROUNDS_TOTAL.inc();
        ROUND_DURATION_SECONDS.observe(clock.total as f64 / 1e6);
        *self.round_clock.lock() = clock;

        let seconds = clock.total as f64 / 1e6;
        for reply in replies {
            let _ = reply.send(format!("Update completed in {seconds:.3} seconds"));
        }
    }
}
