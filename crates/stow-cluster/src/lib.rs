//! Coordinator interface for Stow shards.
//!
//! A shard depends on a coordinator for four things: resolving node
//! identifiers to addresses, capacity accounting, an event sink and the
//! shard-level upload counters. The [`Coordinator`] trait captures those; the
//! [`LocalCoordinator`] is an in-process implementation backed by a static
//! node registry.

mod error;
mod local;

pub use error::ClusterError;
pub use local::LocalCoordinator;

use stow_types::events::EventBus;
use stow_types::{NodeAddr, NodeId, ShardId, UploadStats};

/// Cluster authority consulted by the ingest pipeline.
///
/// Implementations must be safe to share across concurrently running
/// requests.
#[async_trait::async_trait]
pub trait Coordinator: Send + Sync {
    /// Resolve a node identifier to its current network address.
    async fn resolve_node(&self, node: &NodeId) -> Result<NodeAddr, ClusterError>;

    /// Charge `bytes` against the capacity of `shard`.
    async fn charge_capacity(&self, shard: ShardId, bytes: u64) -> Result<(), ClusterError>;

    /// The event sink shared by all shards of this coordinator.
    fn events(&self) -> &EventBus;

    /// Upload counters.
    fn stats(&self) -> &UploadStats;
}
