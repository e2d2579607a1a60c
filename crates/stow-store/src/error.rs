//! Error types for spool operations.

use std::path::PathBuf;

/// Errors that can occur while buffering or reading spool files.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// An I/O error occurred on a spool file.
    #[error("spool io error on {location}: {source}")]
    Io {
        /// Spool file or directory involved.
        location: PathBuf,
        /// Underlying error.
        #[source]
        source: std::io::Error,
    },

    /// The spool directory could not be prepared.
    #[error("spool directory unavailable: {0}")]
    Directory(#[from] std::io::Error),
}

impl StoreError {
    pub(crate) fn io(location: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            location: location.into(),
            source,
        }
    }
}
