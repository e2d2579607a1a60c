//! Shard ingest: buffering, capacity accounting, artifact lifecycle.
//!
//! [`Shard::accept_write`] runs one upload end to end:
//!
//! 1. Create a spool file and charge the declared size against the shard.
//! 2. Stream the body into the spool file.
//! 3. Write the object to the first node that accepts it.
//! 4. Replicate it to every other assigned node.
//! 5. Remove the spool file, record the counters and publish the outcome.
//!
//! Step 5 runs on every path that got as far as creating the spool file.

use std::collections::HashSet;
use std::pin::pin;
use std::sync::Arc;

use bytes::Bytes;
use futures_lite::{Stream, StreamExt};
use serde::Serialize;
use stow_cluster::Coordinator;
use stow_net::Replicator;
use stow_store::{ArtifactWriter, Spool, TransientArtifact};
use stow_types::events::{ArtifactCleanupFailed, CapacityChargeFailed, UploadCompleted, UploadFailed};
use stow_types::{NodeId, ShardId};
use tracing::{error, info, warn};

use crate::attempt::{self, BufferedObject};
use crate::dispatch::ReplicationDispatcher;
use crate::error::IngestError;
use crate::writer::NodeWriter;

/// Static configuration of a shard.
#[derive(Debug, Clone)]
pub struct ShardConfig {
    /// Shard identity, used for capacity accounting.
    pub id: ShardId,
    /// Nodes every object of this shard is stored on.
    pub nodes: Vec<NodeId>,
}

/// One inbound upload.
pub struct UploadRequest<S> {
    /// Object key; must start with `/`.
    pub path: String,
    /// Declared length of the body.
    pub size: u64,
    /// The body.
    pub body: S,
}

/// Result of a fully replicated upload.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct UploadReceipt {
    /// Object key.
    pub path: String,
    /// Size in bytes.
    pub size: u64,
    /// Node that accepted the initial write.
    pub uploaded: NodeId,
    /// Nodes that received the object through replication.
    pub replicas: Vec<NodeId>,
}

/// The ingest side of one shard.
pub struct Shard {
    id: ShardId,
    nodes: Vec<NodeId>,
    coordinator: Arc<dyn Coordinator>,
    writer: Arc<dyn NodeWriter>,
    dispatcher: ReplicationDispatcher,
    spool: Spool,
}

impl Shard {
    /// Create a shard.
    ///
    /// Fails if the node set is empty or names a node twice.
    pub fn new(
        config: ShardConfig,
        coordinator: Arc<dyn Coordinator>,
        writer: Arc<dyn NodeWriter>,
        replicator: Arc<dyn Replicator>,
        spool: Spool,
    ) -> Result<Self, IngestError> {
        let ShardConfig { id, nodes } = config;

        if nodes.is_empty() {
            return Err(IngestError::EmptyNodeSet { shard: id });
        }
        let duplicate = {
            let mut seen = HashSet::new();
            nodes.iter().find(|n| !seen.insert(*n)).cloned()
        };
        if let Some(node) = duplicate {
            return Err(IngestError::DuplicateNode { shard: id, node });
        }

        let dispatcher = ReplicationDispatcher::new(replicator, coordinator.events().clone());

        Ok(Self {
            id,
            nodes,
            coordinator,
            writer,
            dispatcher,
            spool,
        })
    }

    /// Shard identity.
    pub fn id(&self) -> ShardId {
        self.id
    }

    /// Assigned nodes, in configuration order.
    pub fn nodes(&self) -> &[NodeId] {
        &self.nodes
    }

    /// The coordinator this shard reports to.
    pub fn coordinator(&self) -> &Arc<dyn Coordinator> {
        &self.coordinator
    }

    /// Accept an upload and store it on every assigned node.
    ///
    /// Succeeds only once the object is on all nodes. Exactly one of
    /// [`UploadCompleted`] and [`UploadFailed`] is published per call, and
    /// the shard counters are updated once.
    #[tracing::instrument(skip(self, request), fields(shard = %self.id, path = %request.path, size = request.size))]
    pub async fn accept_write<S, E>(
        &self,
        request: UploadRequest<S>,
    ) -> Result<UploadReceipt, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        let UploadRequest { path, size, body } = request;

        let outcome = self.ingest(&path, size, body).await;

        self.coordinator.stats().record(size, outcome.is_err());
        let events = self.coordinator.events();
        match &outcome {
            Ok(receipt) => {
                info!(uploaded = %receipt.uploaded, replicas = receipt.replicas.len(), "upload complete");
                events.emit(UploadCompleted {
                    path: receipt.path.clone(),
                    size,
                    uploaded: receipt.uploaded.clone(),
                    replicas: receipt.replicas.clone(),
                });
            }
            Err(e) => {
                if e.is_fatal() {
                    error!(error = %e, "upload failed");
                } else {
                    warn!(error = %e, "upload failed");
                }
                events.emit(UploadFailed {
                    path: path.clone(),
                    error: e.to_string(),
                });
            }
        }

        outcome
    }

    /// Write an already buffered object to the shard's nodes.
    ///
    /// The artifact is only read; removing it stays with the caller.
    pub async fn write_buffered(
        &self,
        object: BufferedObject<'_>,
    ) -> Result<UploadReceipt, IngestError> {
        let initial = attempt::write_first(
            self.writer.as_ref(),
            self.coordinator.events(),
            &self.nodes,
            object,
        )
        .await?;

        if !initial.missing.is_empty() {
            self.dispatcher
                .replicate(
                    std::slice::from_ref(&initial.uploaded),
                    &initial.missing,
                    object.path,
                )
                .await?;
        }

        Ok(UploadReceipt {
            path: object.path.to_string(),
            size: object.size,
            uploaded: initial.uploaded,
            replicas: initial.missing,
        })
    }

    async fn ingest<S, E>(&self, path: &str, size: u64, body: S) -> Result<UploadReceipt, IngestError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        if !path.starts_with('/') {
            return Err(IngestError::InvalidPath {
                path: path.to_string(),
            });
        }

        let mut spooled = self.spool.create().await?;
        let buffered = self.buffer(&mut spooled, path, size, body).await;
        let artifact = spooled.into_artifact();

        let outcome = match buffered {
            Ok(()) => {
                self.write_buffered(BufferedObject {
                    path,
                    size,
                    artifact: &artifact,
                })
                .await
            }
            Err(e) => Err(e),
        };

        self.release(artifact).await;
        outcome
    }

    async fn buffer<S, E>(
        &self,
        spooled: &mut ArtifactWriter,
        path: &str,
        size: u64,
        body: S,
    ) -> Result<(), IngestError>
    where
        S: Stream<Item = Result<Bytes, E>> + Send,
        E: Into<Box<dyn std::error::Error + Send + Sync>>,
    {
        self.charge(size).await?;

        let mut body = pin!(body);
        while let Some(chunk) = body.next().await {
            let chunk = chunk.map_err(|e| IngestError::Ingress {
                path: path.to_string(),
                source: e.into(),
            })?;
            let received = spooled.written() + chunk.len() as u64;
            if received > size {
                return Err(IngestError::LengthMismatch {
                    path: path.to_string(),
                    declared: size,
                    received,
                });
            }
            spooled.write(&chunk).await?;
        }
        spooled.finish().await?;

        if spooled.written() != size {
            return Err(IngestError::LengthMismatch {
                path: path.to_string(),
                declared: size,
                received: spooled.written(),
            });
        }
        Ok(())
    }

    async fn charge(&self, size: u64) -> Result<(), IngestError> {
        if let Err(source) = self.coordinator.charge_capacity(self.id, size).await {
            error!(bytes = size, error = %source, "capacity charge failed");
            self.coordinator.events().emit(CapacityChargeFailed {
                shard: self.id,
                bytes: size,
                error: source.to_string(),
            });
            return Err(IngestError::Accounting {
                shard: self.id,
                bytes: size,
                source,
            });
        }
        Ok(())
    }

    async fn release(&self, artifact: TransientArtifact) {
        let location = artifact.location().to_path_buf();
        if let Err(e) = artifact.remove().await {
            warn!(location = %location.display(), error = %e, "failed to remove spool file");
            self.coordinator.events().emit(ArtifactCleanupFailed {
                location,
                error: e.to_string(),
            });
        }
    }
}
