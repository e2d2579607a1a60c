//! Network layer between a shard and its storage nodes.
//!
//! Storage nodes speak plain HTTP: an object is written with a `PUT` carrying
//! an explicit `Content-Length` and read back with a `GET`. This crate
//! provides:
//!
//! - [`HttpTransport`]: streaming object writes and reads against one node,
//!   including the status policy and response draining.
//! - [`Replicator`]: the interface for copying an object between nodes, and
//!   [`HttpReplicator`], which copies by streaming a `GET` from a source node
//!   into a `PUT` on the target.

mod error;
mod replicator;
mod transport;

pub use error::NetError;
pub use replicator::HttpReplicator;
pub use transport::HttpTransport;

use stow_types::ReplicationJob;

/// Copies an object onto a node that does not hold it yet.
///
/// Implementations must accept concurrent pushes for distinct targets of the
/// same source set.
#[async_trait::async_trait]
pub trait Replicator: Send + Sync {
    /// Copy `job.path` from any of `job.sources` onto `job.target`.
    async fn push(&self, job: &ReplicationJob) -> Result<(), NetError>;
}
