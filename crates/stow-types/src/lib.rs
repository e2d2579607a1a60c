//! Shared types and identifiers for Stow.
//!
//! This crate defines the core types used across the Stow workspace:
//! identifiers ([`NodeId`], [`ShardId`]), node addressing ([`NodeAddr`]),
//! replication work items ([`ReplicationJob`]) and the shard-level upload
//! counters ([`UploadStats`]).

pub mod events;

use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

// ---------------------------------------------------------------------------
// ID types
// ---------------------------------------------------------------------------

/// Opaque identifier of a storage node.
///
/// Resolved to a [`NodeAddr`] by the coordinator on every request; the
/// ingest path never caches the resolution.
#[derive(Clone, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(String);

impl NodeId {
    /// Create a node identifier from any string-like value.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the identifier as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<&str> for NodeId {
    fn from(id: &str) -> Self {
        Self(id.to_string())
    }
}

impl From<String> for NodeId {
    fn from(id: String) -> Self {
        Self(id)
    }
}

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({})", self.0)
    }
}

/// Identifier of a write-ingest shard.
#[derive(
    Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Ord, PartialOrd, Serialize, Deserialize,
)]
#[serde(transparent)]
pub struct ShardId(u32);

impl ShardId {
    /// Create a shard identifier.
    pub const fn new(id: u32) -> Self {
        Self(id)
    }

    /// Return the raw numeric identifier.
    pub fn get(&self) -> u32 {
        self.0
    }
}

impl From<u32> for ShardId {
    fn from(id: u32) -> Self {
        Self(id)
    }
}

impl fmt::Display for ShardId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "shard-{}", self.0)
    }
}

/// Render a node list as `[a, b, c]`.
///
/// Used in error messages that must name a whole node set.
pub fn display_nodes(nodes: &[NodeId]) -> String {
    let mut out = String::from("[");
    for (i, node) in nodes.iter().enumerate() {
        if i > 0 {
            out.push_str(", ");
        }
        out.push_str(node.as_str());
    }
    out.push(']');
    out
}

// ---------------------------------------------------------------------------
// Addressing
// ---------------------------------------------------------------------------

/// Network address of a storage node.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct NodeAddr {
    /// Hostname or IP literal.
    pub host: String,
    /// TCP port of the node's object API.
    pub port: u16,
}

impl NodeAddr {
    /// Create a new address.
    pub fn new(host: impl Into<String>, port: u16) -> Self {
        Self {
            host: host.into(),
            port,
        }
    }
}

impl fmt::Display for NodeAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.host, self.port)
    }
}

// ---------------------------------------------------------------------------
// Replication
// ---------------------------------------------------------------------------

/// A request to copy an object onto `target` from any node in `sources`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ReplicationJob {
    /// Nodes already holding a durable copy. Never empty.
    pub sources: Vec<NodeId>,
    /// Node that should receive a copy.
    pub target: NodeId,
    /// Logical object key.
    pub path: String,
}

// ---------------------------------------------------------------------------
// Counters
// ---------------------------------------------------------------------------

/// Shard-level upload counters.
///
/// Every request is recorded exactly once, whichever stage it ended in.
/// Counters are atomics so concurrent requests can record without locking.
#[derive(Debug, Default)]
pub struct UploadStats {
    processed_uploads: AtomicU64,
    failed_uploads: AtomicU64,
    processed_bytes: AtomicU64,
}

impl UploadStats {
    /// Create zeroed counters.
    pub fn new() -> Self {
        Self::default()
    }

    /// Record one finished request of `size` declared bytes.
    pub fn record(&self, size: u64, failed: bool) {
        if failed {
            self.failed_uploads.fetch_add(1, Ordering::Relaxed);
        }
        self.processed_uploads.fetch_add(1, Ordering::Relaxed);
        self.processed_bytes.fetch_add(size, Ordering::Relaxed);
    }

    /// Take a point-in-time copy of the counters.
    pub fn snapshot(&self) -> StatsSnapshot {
        StatsSnapshot {
            processed_uploads: self.processed_uploads.load(Ordering::Relaxed),
            failed_uploads: self.failed_uploads.load(Ordering::Relaxed),
            processed_bytes: self.processed_bytes.load(Ordering::Relaxed),
        }
    }
}

/// Serializable copy of [`UploadStats`].
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatsSnapshot {
    /// Requests that reached a terminal outcome.
    pub processed_uploads: u64,
    /// Requests whose terminal outcome was a failure.
    pub failed_uploads: u64,
    /// Sum of declared lengths of all processed requests.
    pub processed_bytes: u64,
}
