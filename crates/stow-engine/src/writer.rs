//! Single-node initial write.
//!
//! [`HttpNodeWriter`] streams the spool file to one node in a single `PUT`.
//! Two things can decide the attempt: a read failure on the spool file while
//! the request body is being produced, and the node's response. The first of
//! the two settles the attempt; the other is discarded.

use std::sync::Arc;

use bytes::{Bytes, BytesMut};
use futures_lite::Stream;
use stow_cluster::Coordinator;
use stow_net::HttpTransport;
use stow_store::TransientArtifact;
use stow_types::NodeId;
use tokio::io::{AsyncRead, AsyncReadExt};
use tracing::{debug, info};

use crate::error::NodeWriteError;
use crate::settle::{Settler, settlement};

/// Spool read size per request body chunk.
const READ_CHUNK: usize = 64 * 1024;

/// Writes a buffered object to one node.
#[async_trait::async_trait]
pub trait NodeWriter: Send + Sync {
    /// Write the `size`-byte object held by `artifact` to `node` under `path`.
    ///
    /// Every call reads the artifact through its own read view.
    async fn write(
        &self,
        node: &NodeId,
        path: &str,
        size: u64,
        artifact: &TransientArtifact,
    ) -> Result<(), NodeWriteError>;
}

/// [`NodeWriter`] that `PUT`s the object over HTTP.
pub struct HttpNodeWriter {
    coordinator: Arc<dyn Coordinator>,
    transport: HttpTransport,
}

impl HttpNodeWriter {
    /// Create a writer that resolves node addresses through `coordinator`.
    pub fn new(coordinator: Arc<dyn Coordinator>, transport: HttpTransport) -> Self {
        Self {
            coordinator,
            transport,
        }
    }
}

#[async_trait::async_trait]
impl NodeWriter for HttpNodeWriter {
    #[tracing::instrument(skip(self, artifact), fields(%node))]
    async fn write(
        &self,
        node: &NodeId,
        path: &str,
        size: u64,
        artifact: &TransientArtifact,
    ) -> Result<(), NodeWriteError> {
        let addr = self.coordinator.resolve_node(node).await?;
        let view = artifact.open().await?;
        info!(%addr, size, "uploading object to node");

        let (settler, outcome) = settlement();
        let body = read_view_stream(view, path.to_string(), settler.clone());

        let response = self
            .transport
            .put_stream(node, &addr, path, size, body)
            .await;
        if !settler.settle(response.map(drop).map_err(NodeWriteError::from)) {
            debug!("write already settled by a spool read failure");
        }

        outcome.await.unwrap_or_else(|_| {
            Err(NodeWriteError::Unsettled {
                path: path.to_string(),
                node: node.clone(),
            })
        })
    }
}

/// Turn a read view into a request body stream.
///
/// A read error settles the attempt with [`NodeWriteError::ArtifactRead`]
/// and then ends the body with the same error, aborting the request.
pub(crate) fn read_view_stream<R>(
    reader: R,
    path: String,
    settler: Settler<Result<(), NodeWriteError>>,
) -> impl Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static
where
    R: AsyncRead + Unpin + Send + 'static,
{
    futures_lite::stream::unfold(Some(reader), move |state| {
        let settler = settler.clone();
        let path = path.clone();
        async move {
            let mut reader = state?;
            let mut buf = BytesMut::with_capacity(READ_CHUNK);
            match reader.read_buf(&mut buf).await {
                Ok(0) => None,
                Ok(_) => Some((Ok(buf.freeze()), Some(reader))),
                Err(e) => {
                    settler.settle(Err(NodeWriteError::ArtifactRead {
                        path,
                        source: std::io::Error::new(e.kind(), e.to_string()),
                    }));
                    Some((Err(e), None))
                }
            }
        }
    })
}
