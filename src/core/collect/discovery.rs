// src/core/collect/discovery.rs

//! Node discovery. The cluster routing table is an external collaborator;
//! the default implementation resolves the node set from the configured
//! seed list.

use crate::config::NodeInfo;
use crate::core::FleetmonError;
use async_trait::async_trait;

#[async_trait]
pub trait Discovery: Send + Sync {
    /// Resolves the set of storage nodes a full round should poll.
    async fn resolve_nodes(&self) -> Result<Vec<NodeInfo>, FleetmonError>;
}

/// Discovery backed by the static node list of the configuration file.
pub struct StaticDiscovery {
    nodes: Vec<NodeInfo>,
}

impl StaticDiscovery {
    pub fn new(nodes: Vec<NodeInfo>) -> Self {
        Self { nodes }
    }
}

#[async_trait]
impl Discovery for StaticDiscovery {
    async fn resolve_nodes(&self) -> Result<Vec<NodeInfo>, FleetmonError> {
        Ok(self.nodes.clone())
    }
}
