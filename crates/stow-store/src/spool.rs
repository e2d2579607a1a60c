//! Directory-backed spool for inbound objects.
//!
//! Each in-flight object is one file named `b-{16 hex}` directly under the
//! spool directory. A spool file is written once by an [`ArtifactWriter`],
//! then read any number of times through [`TransientArtifact::open`], and
//! finally removed with [`TransientArtifact::remove`].

use std::path::{Path, PathBuf};

use rand::RngCore;
use tokio::fs::{File, OpenOptions};
use tokio::io::AsyncWriteExt;
use tracing::{debug, warn};

use crate::error::StoreError;

/// A directory of transient spool files.
#[derive(Debug, Clone)]
pub struct Spool {
    dir: PathBuf,
}

impl Spool {
    /// Create a spool rooted at `dir`.
    ///
    /// The directory is created if it does not exist.
    pub fn new(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        std::fs::create_dir_all(&dir)?;
        Ok(Self { dir })
    }

    /// Return the spool directory.
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Create a new, empty spool file and return a writer for it.
    pub async fn create(&self) -> Result<ArtifactWriter, StoreError> {
        let location = self.dir.join(format!("b-{:016x}", rand::rng().next_u64()));

        let file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&location)
            .await
            .map_err(|e| StoreError::io(&location, e))?;

        debug!(location = %location.display(), "created spool file");

        Ok(ArtifactWriter {
            file,
            artifact: TransientArtifact {
                location,
                len: 0,
                removed: false,
            },
        })
    }
}

/// Appends an inbound body to a spool file.
///
/// Call [`finish`](Self::finish) once the body is complete, then
/// [`into_artifact`](Self::into_artifact) to release the write handle.
/// `into_artifact` must be called on error paths too, so the caller owns the
/// file's removal.
pub struct ArtifactWriter {
    file: File,
    artifact: TransientArtifact,
}

impl ArtifactWriter {
    /// Location of the spool file being written.
    pub fn location(&self) -> &Path {
        &self.artifact.location
    }

    /// Bytes written so far.
    pub fn written(&self) -> u64 {
        self.artifact.len
    }

    /// Append a chunk of the body.
    pub async fn write(&mut self, chunk: &[u8]) -> Result<(), StoreError> {
        self.file
            .write_all(chunk)
            .await
            .map_err(|e| StoreError::io(&self.artifact.location, e))?;
        self.artifact.len += chunk.len() as u64;
        Ok(())
    }

    /// Flush all buffered writes to the file.
    pub async fn finish(&mut self) -> Result<(), StoreError> {
        self.file
            .flush()
            .await
            .map_err(|e| StoreError::io(&self.artifact.location, e))
    }

    /// Close the write handle and hand over the spool file.
    pub fn into_artifact(self) -> TransientArtifact {
        self.artifact
    }
}

/// A fully buffered object on disk.
///
/// Supports any number of sequential, independent read views. Removal
/// consumes the artifact, so it can be requested only once. An artifact
/// dropped without [`remove`](Self::remove) (e.g. a cancelled request)
/// deletes its file on drop.
#[derive(Debug)]
pub struct TransientArtifact {
    location: PathBuf,
    len: u64,
    removed: bool,
}

impl TransientArtifact {
    /// Location of the spool file.
    pub fn location(&self) -> &Path {
        &self.location
    }

    /// Number of bytes written to the spool file.
    pub fn len(&self) -> u64 {
        self.len
    }

    /// Whether the spool file holds no bytes.
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Open a fresh read view positioned at the start of the object.
    ///
    /// Each view has its own file handle and cursor.
    pub async fn open(&self) -> Result<File, StoreError> {
        File::open(&self.location)
            .await
            .map_err(|e| StoreError::io(&self.location, e))
    }

    /// Delete the spool file.
    pub async fn remove(mut self) -> Result<(), StoreError> {
        self.removed = true;
        tokio::fs::remove_file(&self.location)
            .await
            .map_err(|e| StoreError::io(&self.location, e))?;
        debug!(location = %self.location.display(), "removed spool file");
        Ok(())
    }
}

impl Drop for TransientArtifact {
    fn drop(&mut self) {
        if self.removed {
            return;
        }
        match std::fs::remove_file(&self.location) {
            Ok(()) => debug!(location = %self.location.display(), "removed abandoned spool file"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => {
                warn!(location = %self.location.display(), error = %e, "failed to remove abandoned spool file")
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;
    use tokio::io::AsyncReadExt;

    fn make_spool() -> (Spool, TempDir) {
        let dir = TempDir::new().unwrap();
        let spool = Spool::new(dir.path().join("spool")).unwrap();
        (spool, dir)
    }

    async fn read_all(artifact: &TransientArtifact) -> Vec<u8> {
        let mut buf = Vec::new();
        artifact
            .open()
            .await
            .unwrap()
            .read_to_end(&mut buf)
            .await
            .unwrap();
        buf
    }

    #[tokio::test]
    async fn test_new_creates_directory() {
        let (spool, _dir) = make_spool();
        assert!(spool.dir().is_dir());
    }

    #[tokio::test]
    async fn test_write_then_read_back() {
        let (spool, _dir) = make_spool();
        let mut writer = spool.create().await.unwrap();
        writer.write(b"hello ").await.unwrap();
        writer.write(b"spool").await.unwrap();
        writer.finish().await.unwrap();
        assert_eq!(writer.written(), 11);

        let artifact = writer.into_artifact();
        assert_eq!(artifact.len(), 11);
        assert_eq!(read_all(&artifact).await, b"hello spool");
    }

    #[tokio::test]
    async fn test_read_views_are_independent() {
        let (spool, _dir) = make_spool();
        let mut writer = spool.create().await.unwrap();
        writer.write(b"0123456789").await.unwrap();
        writer.finish().await.unwrap();
        let artifact = writer.into_artifact();

        // Partially consume one view; a second view still starts at zero.
        let mut first = artifact.open().await.unwrap();
        let mut head = [0u8; 4];
        first.read_exact(&mut head).await.unwrap();
        assert_eq!(&head, b"0123");

        assert_eq!(read_all(&artifact).await, b"0123456789");
    }

    #[tokio::test]
    async fn test_remove_deletes_file() {
        let (spool, _dir) = make_spool();
        let mut writer = spool.create().await.unwrap();
        writer.write(b"gone soon").await.unwrap();
        writer.finish().await.unwrap();
        let artifact = writer.into_artifact();
        let location = artifact.location().to_path_buf();

        assert!(location.exists());
        artifact.remove().await.unwrap();
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_remove_missing_file_reports_error() {
        let (spool, _dir) = make_spool();
        let artifact = spool.create().await.unwrap().into_artifact();
        std::fs::remove_file(artifact.location()).unwrap();

        let result = artifact.remove().await;
        assert!(matches!(result, Err(StoreError::Io { .. })));
    }

    #[tokio::test]
    async fn test_dropped_artifact_is_cleaned_up() {
        let (spool, _dir) = make_spool();
        let mut writer = spool.create().await.unwrap();
        writer.write(b"abandoned").await.unwrap();
        let location = writer.location().to_path_buf();

        drop(writer);
        assert!(!location.exists());
    }

    #[tokio::test]
    async fn test_spool_files_have_unique_names() {
        let (spool, _dir) = make_spool();
        let a = spool.create().await.unwrap().into_artifact();
        let b = spool.create().await.unwrap().into_artifact();
        assert_ne!(a.location(), b.location());
        assert!(
            a.location()
                .file_name()
                .and_then(|n| n.to_str())
                .is_some_and(|n| n.starts_with("b-"))
        );
    }
}
