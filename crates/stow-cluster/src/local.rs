//! In-process coordinator backed by a static node registry.

use std::collections::HashMap;
use std::sync::Arc;

use stow_types::events::EventBus;
use stow_types::{NodeAddr, NodeId, ShardId, UploadStats};
use tokio::sync::{Mutex, RwLock};
use tracing::{debug, info};

use crate::Coordinator;
use crate::error::ClusterError;

/// Coordinator that keeps its registry and accounting in memory.
///
/// Capacity accounting is optimistic: a charge is recorded when an upload
/// starts and is never released, whatever the upload's outcome.
pub struct LocalCoordinator {
    /// Known storage nodes.
    nodes: RwLock<HashMap<NodeId, NodeAddr>>,
    /// Bytes charged per shard.
    usage: Mutex<HashMap<ShardId, u64>>,
    /// Optional per-shard capacity limits.
    limits: HashMap<ShardId, u64>,
    events: EventBus,
    stats: UploadStats,
}

impl LocalCoordinator {
    /// Create a coordinator with the given node registry and no capacity limits.
    pub fn new(nodes: impl IntoIterator<Item = (NodeId, NodeAddr)>) -> Arc<Self> {
        Self::with_limits(nodes, HashMap::new())
    }

    /// Create a coordinator with per-shard capacity limits in bytes.
    pub fn with_limits(
        nodes: impl IntoIterator<Item = (NodeId, NodeAddr)>,
        limits: HashMap<ShardId, u64>,
    ) -> Arc<Self> {
        Arc::new(Self {
            nodes: RwLock::new(nodes.into_iter().collect()),
            usage: Mutex::new(HashMap::new()),
            limits,
            events: EventBus::new(),
            stats: UploadStats::new(),
        })
    }

    /// Add or replace a node in the registry.
    pub async fn register_node(&self, node: NodeId, addr: NodeAddr) {
        info!(%node, %addr, "node registered");
        self.nodes.write().await.insert(node, addr);
    }

    /// Remove a node from the registry. Returns its last known address.
    pub async fn remove_node(&self, node: &NodeId) -> Option<NodeAddr> {
        let removed = self.nodes.write().await.remove(node);
        if removed.is_some() {
            info!(%node, "node removed from registry");
        }
        removed
    }

    /// Number of registered nodes.
    pub async fn node_count(&self) -> usize {
        self.nodes.read().await.len()
    }

    /// Bytes charged so far against `shard`.
    pub async fn shard_usage(&self, shard: ShardId) -> u64 {
        self.usage.lock().await.get(&shard).copied().unwrap_or(0)
    }
}

#[async_trait::async_trait]
impl Coordinator for LocalCoordinator {
    async fn resolve_node(&self, node: &NodeId) -> Result<NodeAddr, ClusterError> {
        self.nodes
            .read()
            .await
            .get(node)
            .cloned()
            .ok_or_else(|| ClusterError::UnknownNode(node.clone()))
    }

    async fn charge_capacity(&self, shard: ShardId, bytes: u64) -> Result<(), ClusterError> {
        let mut usage = self.usage.lock().await;
        let used = usage.entry(shard).or_insert(0);

        let Some(charged) = used.checked_add(bytes) else {
            return Err(ClusterError::UsageOverflow {
                shard,
                used: *used,
                requested: bytes,
            });
        };
        if let Some(&limit) = self.limits.get(&shard)
            && charged > limit
        {
            return Err(ClusterError::CapacityExceeded {
                shard,
                used: *used,
                limit,
                requested: bytes,
            });
        }

        *used = charged;
        debug!(%shard, bytes, used = *used, "charged shard capacity");
        Ok(())
    }

    fn events(&self) -> &EventBus {
        &self.events
    }

    fn stats(&self) -> &UploadStats {
        &self.stats
    }
}
