//! Write-ingest pipeline of a Stow shard.
//!
//! A [`Shard`] accepts an uploaded object, buffers it to a spool file, writes
//! one durable copy to the first assigned node that accepts it (candidates
//! tried one at a time in random order), then replicates the object to every
//! other assigned node in parallel. The upload succeeds only once every
//! assigned node holds a copy.
//!
//! The pipeline's seams are traits so tests can substitute them:
//! [`NodeWriter`] for the single-node write, [`stow_net::Replicator`] for
//! replication and [`stow_cluster::Coordinator`] for node resolution,
//! accounting, events and counters.

pub mod attempt;
pub mod dispatch;
pub mod error;
pub mod selector;
mod settle;
pub mod shard;
pub mod writer;

pub use attempt::{BufferedObject, InitialWrite};
pub use dispatch::ReplicationDispatcher;
pub use error::{IngestError, NodeWriteError};
pub use shard::{Shard, ShardConfig, UploadReceipt, UploadRequest};
pub use writer::{HttpNodeWriter, NodeWriter};

#[cfg(test)]
mod tests;
