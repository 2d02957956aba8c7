// src/core/collect/metakey.rs

//! Per-group metakey reads. The wire-protocol client is an external
//! collaborator; this module names its interface and fans the reads of a
//! round out concurrently.

use crate::core::FleetmonError;
use async_trait::async_trait;
use bytes::Bytes;
use futures::StreamExt;
use std::sync::Arc;

/// One successfully read metakey: the raw payload and the write timestamp
/// the storage reported for it.
#[derive(Debug, Clone)]
pub struct MetakeyReply {
    pub data: Bytes,
    pub timestamp_ns: u64,
}

#[async_trait]
pub trait MetakeyClient: Send + Sync {
    /// Reads the metakey of one group from a reserved namespace with
    /// `groups = [group_id]`.
    async fn read_group_metakey(&self, group_id: u64) -> Result<MetakeyReply, FleetmonError>;
}

/// Stand-in client used when no wire-protocol session is wired up. Every
/// read fails, which marks the affected groups instead of aborting rounds.
pub struct UnavailableMetakeyClient;

#[async_trait]
impl MetakeyClient for UnavailableMetakeyClient {
    async fn read_group_metakey(&self, _group_id: u64) -> Result<MetakeyReply, FleetmonError> {
        Err(FleetmonError::TransportFailure(
            "metakey session is not configured".to_string(),
        ))
    }
}

/// Fires the metakey reads of a round concurrently, bounded by
/// `concurrency`, and collects every completion.
pub async fn read_all(
    client: Arc<dyn MetakeyClient>,
    group_ids: Vec<u64>,
    concurrency: usize,
) -> Vec<(u64, Result<MetakeyReply, FleetmonError>)> {
    futures::stream::iter(group_ids.into_iter().map(|group_id| {
        let client = client.clone();
        async move {
            let result = client.read_group_metakey(group_id).await;
            (group_id, result)
        }
    }))
    .buffer_unordered(concurrency.max(1))
    .collect()
    .await
}
