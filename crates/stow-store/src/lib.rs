//! Transient object spool.
//!
//! Inbound objects are buffered to disk before being written to a storage
//! node. This crate provides:
//!
//! - [`Spool`]: a directory holding in-flight spool files.
//! - [`ArtifactWriter`]: appends an inbound body to a new spool file.
//! - [`TransientArtifact`]: a fully buffered object that can be re-read any
//!   number of times through independent read views and removed once.

mod error;
mod spool;

pub use error::StoreError;
pub use spool::{ArtifactWriter, Spool, TransientArtifact};
