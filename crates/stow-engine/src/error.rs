//! Error types for the ingest pipeline.

use stow_cluster::ClusterError;
use stow_net::NetError;
use stow_store::StoreError;
use stow_types::{NodeId, ShardId, display_nodes};

/// Errors that end an upload.
#[derive(Debug, thiserror::Error)]
pub enum IngestError {
    /// The object key is not an absolute path.
    #[error("invalid object path {path:?}: must start with '/'")]
    InvalidPath {
        /// Rejected key.
        path: String,
    },

    /// A shard was configured without nodes.
    #[error("{shard} has no assigned nodes")]
    EmptyNodeSet {
        /// Misconfigured shard.
        shard: ShardId,
    },

    /// A node appears twice in a shard's node set.
    #[error("{shard} lists node {node} more than once")]
    DuplicateNode {
        /// Misconfigured shard.
        shard: ShardId,
        /// Repeated node.
        node: NodeId,
    },

    /// Reading the inbound body failed.
    #[error("receiving {path} failed: {source}")]
    Ingress {
        /// Object key.
        path: String,
        /// Error reported by the body stream.
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    /// The inbound body did not match its declared length.
    #[error("body of {path} does not match its declared length: declared {declared}, received {received}")]
    LengthMismatch {
        /// Object key.
        path: String,
        /// Declared size.
        declared: u64,
        /// Bytes received before the mismatch was detected.
        received: u64,
    },

    /// Buffering to the spool failed.
    #[error("spool error: {0}")]
    Spool(#[from] StoreError),

    /// Capacity accounting rejected or failed to record the charge.
    #[error("capacity accounting failed for {shard} ({bytes} bytes): {source}")]
    Accounting {
        /// Shard that was charged.
        shard: ShardId,
        /// Declared size.
        bytes: u64,
        /// Coordinator error.
        #[source]
        source: ClusterError,
    },

    /// Every assigned node failed the initial write.
    #[error("could not upload {path} to any node: {}", display_nodes(.nodes))]
    NoNodeAccepted {
        /// Object key.
        path: String,
        /// The shard's full node set.
        nodes: Vec<NodeId>,
    },

    /// A replication job failed.
    #[error("replicating {path} to {target} failed: {source}")]
    Replication {
        /// Object key.
        path: String,
        /// Node the job was copying to.
        target: NodeId,
        /// Replicator error.
        #[source]
        source: NetError,
    },

    /// A replication task panicked or was cancelled.
    #[error("replication of {path} aborted: {reason}")]
    ReplicationAborted {
        /// Object key.
        path: String,
        /// Rendered join error.
        reason: String,
    },
}

impl IngestError {
    /// Whether this failure points at the shard's own bookkeeping rather than
    /// at the upload or the nodes.
    pub fn is_fatal(&self) -> bool {
        matches!(self, Self::Accounting { .. })
    }
}

/// Errors from a single initial-write attempt.
///
/// These never end an upload on their own; the attempt loop moves on to the
/// next candidate node.
#[derive(Debug, thiserror::Error)]
pub enum NodeWriteError {
    /// The node's address could not be resolved.
    #[error("cannot resolve node: {0}")]
    Resolve(#[from] ClusterError),

    /// A read view of the spool file could not be opened.
    #[error("cannot open buffered object: {0}")]
    Open(#[from] StoreError),

    /// Reading the spool file failed while streaming it out.
    #[error("reading buffered {path} failed: {source}")]
    ArtifactRead {
        /// Object key.
        path: String,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The node rejected the write or could not be reached.
    #[error(transparent)]
    Net(#[from] NetError),

    /// The attempt finished without reporting an outcome.
    #[error("write of {path} to {node} ended without an outcome")]
    Unsettled {
        /// Object key.
        path: String,
        /// Node being written.
        node: NodeId,
    },
}
