// src/core/collect/fanout.rs

//! Parallel stat download from every node of a round. One shared HTTP
//! client issues a GET against each node's monitor port with a fixed
//! category bitmask; concurrency is bounded and every request carries its
//! own timeout. A failed download drops that node's buffer and never aborts
//! the round.

use crate::core::FleetmonError;
use crate::core::metrics::NODE_DOWNLOAD_FAILURES_TOTAL;
use bytes::Bytes;
use futures::StreamExt;
use std::time::Duration;
use tracing::{debug, warn};

/// Monitor stat categories requested from every node.
const CATEGORY_PROCFS: u32 = 1;
const CATEGORY_BACKEND: u32 = 2;
const CATEGORY_STATS: u32 = 8;
const CATEGORY_COMMANDS: u32 = 32;

const CATEGORIES: u32 =
    CATEGORY_PROCFS | CATEGORY_BACKEND | CATEGORY_STATS | CATEGORY_COMMANDS;

pub struct StatsFanout {
    client: reqwest::Client,
    monitor_port: u16,
    wait_timeout: Duration,
    concurrency: usize,
}

impl StatsFanout {
    pub fn new(monitor_port: u16, wait_timeout_secs: u64, concurrency: usize) -> Self {
        Self {
            client: reqwest::Client::new(),
            monitor_port,
            wait_timeout: Duration::from_secs(wait_timeout_secs),
            concurrency: concurrency.max(1),
        }
    }

    /// Downloads the monitor payload of every node. The result carries one
    /// entry per node, failures included, keyed by the node key.
    pub async fn download_all(
        &self,
        targets: Vec<(String, String)>,
    ) -> Vec<(String, Result<Bytes, FleetmonError>)> {
        futures::stream::iter(targets.into_iter().map(|(node_key, host)| {
            let url = format!(
                "http://{}:{}/?categories={}",
                host, self.monitor_port, CATEGORIES
            );
            async move {
                debug!("Scheduling stat download for node {}", node_key);
                let result = self.download_one(&url).await;
                match &result {
                    Ok(body) => {
                        debug!(
                            "Node {} stat download completed ({} bytes)",
                            node_key,
                            body.len()
                        );
                    }
                    Err(e) => {
                        NODE_DOWNLOAD_FAILURES_TOTAL.inc();
                        warn!("Node {} stat download failed: {}", node_key, e);
                    }
                }
                (node_key, result)
            }
        }))
        .buffer_unordered(self.concurrency)
        .collect()
        .await
    }

    async fn download_one(&self, url: &str) -> Result<Bytes, FleetmonError> {
        let response = self
            .client
            .get(url)
            .timeout(self.wait_timeout)
            .send()
            .await?
            .error_for_status()?;
        Ok(response.bytes().await?)
    }
}
