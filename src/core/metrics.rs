// src/core/metrics.rs

//! Defines and registers Prometheus metrics for collector monitoring, plus
//! the sample distributions rendered by the summary report.
//!
//! This module uses `lazy_static` to ensure that metrics are registered only
//! once globally for the entire application lifecycle.

use chrono::{Local, TimeZone};
use lazy_static::lazy_static;
use prometheus::{
    Counter, Gauge, Histogram, TextEncoder, register_counter, register_gauge, register_histogram,
};
use std::fmt::Write as _;

lazy_static! {
    // --- Collector-wide Gauges ---
    /// The number of storage nodes known to the live graph.
    pub static ref NODES_TRACKED: Gauge =
        register_gauge!("fleetmon_nodes_tracked", "Number of storage nodes in the live graph.").unwrap();
    /// The number of groups known to the live graph.
    pub static ref GROUPS_TRACKED: Gauge =
        register_gauge!("fleetmon_groups_tracked", "Number of groups in the live graph.").unwrap();
    /// The number of couples known to the live graph.
    pub static ref COUPLES_TRACKED: Gauge =
        register_gauge!("fleetmon_couples_tracked", "Number of couples in the live graph.").unwrap();

    // --- Collector-wide Counters ---
    /// The total number of collection rounds completed since startup.
    pub static ref ROUNDS_TOTAL: Counter =
        register_counter!("fleetmon_rounds_total", "Total number of collection rounds completed.").unwrap();
    /// The total number of per-node stat downloads that failed.
    pub static ref NODE_DOWNLOAD_FAILURES_TOTAL: Counter =
        register_counter!("fleetmon_node_download_failures_total", "Total number of failed per-node stat downloads.").unwrap();
    /// The total number of per-group metakey reads that failed.
    pub static ref METAKEY_FAILURES_TOTAL: Counter =
        register_counter!("fleetmon_metakey_failures_total", "Total number of failed per-group metakey reads.").unwrap();

    // --- Histograms ---
    /// End-to-end duration of a collection round in seconds.
    pub static ref ROUND_DURATION_SECONDS: Histogram =
        register_histogram!("fleetmon_round_duration_seconds", "End-to-end duration of a collection round.").unwrap();
}

/// Gathers all registered metrics and encodes them into the Prometheus text
/// exposition format.
pub fn gather_metrics() -> String {
    let metric_families = prometheus::gather();
    TextEncoder::new()
        .encode_to_string(&metric_families)
        .unwrap_or_default()
}

/// A binned distribution of timing samples, rendered into the text summary.
#[derive(Debug, Clone, Default)]
pub struct Distribution {
    samples: Vec<u64>,
}

impl Distribution {
    const NR_BINS: usize = 10;

    pub fn add_sample(&mut self, sample: u64) {
        self.samples.push(sample);
    }

    pub fn empty(&self) -> bool {
        self.samples.is_empty()
    }

    /// Renders min/median/mean/max in microseconds followed by a fixed-width
    /// histogram over `NR_BINS` equal value ranges.
    pub fn render(&self) -> String {
        if self.samples.is_empty() {
            return "  (no samples)".to_string();
        }

        let mut sorted = self.samples.clone();
        sorted.sort_unstable();

        let min = sorted[0];
        let max = sorted[sorted.len() - 1];
        let median = sorted[sorted.len() / 2];
        let mean = sorted.iter().sum::<u64>() / sorted.len() as u64;

        let mut out = String::new();
        let _ = writeln!(
            out,
            "  samples: {}  min: {} us  median: {} us  mean: {} us  max: {} us",
            sorted.len(),
            min,
            median,
            mean,
            max
        );

        let span = (max - min).max(1);
        let mut bins = [0u64; Self::NR_BINS];
        for sample in &sorted {
            let idx = (((sample - min) as u128 * Self::NR_BINS as u128) / (span as u128 + 1))
                as usize;
            bins[idx.min(Self::NR_BINS - 1)] += 1;
        }

        for (i, count) in bins.iter().enumerate() {
            let lo = min + span * i as u64 / Self::NR_BINS as u64;
            let hi = min + span * (i + 1) as u64 / Self::NR_BINS as u64;
            let _ = writeln!(out, "  [{lo:>10} .. {hi:>10}] {count}");
        }

        out
    }
}

/// Formats a `(tv_sec, tv_usec)` pair into a local human-readable timestamp.
pub fn timeval_user_friendly(sec: u64, usec: u64) -> String {
    match Local.timestamp_opt(sec as i64, (usec * 1000) as u32) {
        chrono::LocalResult::Single(dt) => dt.format("%Y-%m-%d %H:%M:%S%.6f").to_string(),
        _ => String::new(),
    }
}
