//! Parallel replication fan-out.

use std::sync::Arc;

use stow_net::Replicator;
use stow_types::events::{EventBus, ReplicationRequested};
use stow_types::{NodeId, ReplicationJob};
use tokio::task::JoinSet;
use tracing::{debug, warn};

use crate::error::IngestError;

/// Submits one replication job per missing node and joins them.
///
/// The join is coarse: the first job to fail decides the result, and the
/// remaining jobs are detached rather than cancelled. Their outcomes are
/// still logged.
pub struct ReplicationDispatcher {
    replicator: Arc<dyn Replicator>,
    events: EventBus,
}

impl ReplicationDispatcher {
    /// Create a dispatcher that submits jobs to `replicator`.
    pub fn new(replicator: Arc<dyn Replicator>, events: EventBus) -> Self {
        Self { replicator, events }
    }

    /// Copy `path` from `sources` onto every node in `targets`.
    ///
    /// All jobs are started before any is awaited.
    pub async fn replicate(
        &self,
        sources: &[NodeId],
        targets: &[NodeId],
        path: &str,
    ) -> Result<(), IngestError> {
        let mut jobs = JoinSet::new();

        for target in targets {
            let job = ReplicationJob {
                sources: sources.to_vec(),
                target: target.clone(),
                path: path.to_string(),
            };
            debug!(path, %target, "submitting replication job");
            self.events.emit(ReplicationRequested { job: job.clone() });

            let replicator = Arc::clone(&self.replicator);
            jobs.spawn(async move {
                let result = replicator.push(&job).await;
                if let Err(e) = &result {
                    warn!(path = %job.path, target = %job.target, error = %e, "replication job failed");
                }
                (job.target, result)
            });
        }

        while let Some(joined) = jobs.join_next().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((target, Err(source))) => {
                    jobs.detach_all();
                    return Err(IngestError::Replication {
                        path: path.to_string(),
                        target,
                        source,
                    });
                }
                Err(e) => {
                    jobs.detach_all();
                    return Err(IngestError::ReplicationAborted {
                        path: path.to_string(),
                        reason: e.to_string(),
                    });
                }
            }
        }

        Ok(())
    }
}
