//! Error types for network operations.

use stow_types::{NodeId, display_nodes};

/// Errors that can occur talking to storage nodes.
#[derive(Debug, thiserror::Error)]
pub enum NetError {
    /// The request could not be sent or its response could not be read.
    #[error("request to {url} failed: {source}")]
    Request {
        /// Target URL.
        url: String,
        /// Underlying client error.
        #[source]
        source: reqwest::Error,
    },

    /// No valid object URL could be built for the node.
    #[error("invalid node address {addr}: {reason}")]
    InvalidUrl {
        /// Node address as configured.
        addr: String,
        /// Why the URL was rejected.
        reason: String,
    },

    /// The node answered with a status outside the accepted set.
    #[error("HTTP {method} failed with code {status} for {path} on {node}")]
    Status {
        /// Request method.
        method: &'static str,
        /// Object key.
        path: String,
        /// Node that answered.
        node: NodeId,
        /// Response status code.
        status: u16,
    },

    /// A source node served an object without a length.
    #[error("node {node} served {path} without a content length")]
    MissingLength {
        /// Object key.
        path: String,
        /// Node that answered.
        node: NodeId,
    },

    /// None of the replication sources could serve the object.
    #[error("no source could serve {path}: {}", display_nodes(.sources))]
    NoSource {
        /// Object key.
        path: String,
        /// Sources that were tried.
        sources: Vec<NodeId>,
    },

    /// The HTTP client could not be built.
    #[error("http client setup failed: {0}")]
    Client(#[source] reqwest::Error),

    /// Resolving a node address failed.
    #[error("cluster error: {0}")]
    Cluster(#[from] stow_cluster::ClusterError),

    /// The transfer limiter was shut down.
    #[error("replicator closed")]
    Closed,
}
