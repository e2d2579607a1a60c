//! Error types for coordinator operations.

use stow_types::{NodeId, ShardId};

/// Errors returned by a [`Coordinator`](crate::Coordinator).
#[derive(Debug, thiserror::Error)]
pub enum ClusterError {
    /// The node is not in the registry.
    #[error("unknown node: {0}")]
    UnknownNode(NodeId),

    /// Charging would push the shard over its configured capacity.
    #[error("capacity exceeded on {shard}: used {used} of {limit} bytes, requested {requested}")]
    CapacityExceeded {
        /// Shard being charged.
        shard: ShardId,
        /// Bytes already charged.
        used: u64,
        /// Configured limit.
        limit: u64,
        /// Bytes requested by this charge.
        requested: u64,
    },

    /// The charge does not fit the shard's usage counter.
    #[error("usage counter overflow on {shard}: used {used} bytes, requested {requested}")]
    UsageOverflow {
        /// Shard being charged.
        shard: ShardId,
        /// Bytes already charged.
        used: u64,
        /// Bytes requested by this charge.
        requested: u64,
    },
}
