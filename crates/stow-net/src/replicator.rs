//! Node-to-node replication over HTTP.

use std::sync::Arc;

use stow_cluster::Coordinator;
use stow_types::ReplicationJob;
use tokio::sync::Semaphore;
use tracing::{debug, info};

use crate::Replicator;
use crate::error::NetError;
use crate::transport::HttpTransport;

/// Replicates objects by relaying them through this process.
///
/// For each job the sources are tried in order; the first one that serves
/// the object has its `GET` response streamed straight into a `PUT` on the
/// target. At most `max_concurrent_transfers` jobs run at once.
pub struct HttpReplicator {
    coordinator: Arc<dyn Coordinator>,
    transport: HttpTransport,
    /// Limits concurrent transfers.
    permits: Semaphore,
}

impl HttpReplicator {
    /// Create a replicator that resolves nodes through `coordinator`.
    pub fn new(
        coordinator: Arc<dyn Coordinator>,
        transport: HttpTransport,
        max_concurrent_transfers: u16,
    ) -> Self {
        Self {
            coordinator,
            transport,
            permits: Semaphore::new(usize::from(max_concurrent_transfers.max(1))),
        }
    }
}

#[async_trait::async_trait]
impl Replicator for HttpReplicator {
    #[tracing::instrument(skip(self, job), fields(path = %job.path, target = %job.target))]
    async fn push(&self, job: &ReplicationJob) -> Result<(), NetError> {
        let _permit = self.permits.acquire().await.map_err(|_| NetError::Closed)?;

        let target_addr = self.coordinator.resolve_node(&job.target).await?;

        for source in &job.sources {
            let addr = match self.coordinator.resolve_node(source).await {
                Ok(addr) => addr,
                Err(e) => {
                    debug!(%source, error = %e, "cannot resolve replication source");
                    continue;
                }
            };

            match self.transport.get_object(source, &addr, &job.path).await {
                Ok(Some((len, response))) => {
                    self.transport
                        .put_stream(
                            &job.target,
                            &target_addr,
                            &job.path,
                            len,
                            response.bytes_stream(),
                        )
                        .await?;
                    info!(%source, size = len, "replicated object");
                    return Ok(());
                }
                Ok(None) => debug!(%source, "source does not hold object"),
                Err(e) => debug!(%source, error = %e, "failed to read from source"),
            }
        }

        Err(NetError::NoSource {
            path: job.path.clone(),
            sources: job.sources.clone(),
        })
    }
}
