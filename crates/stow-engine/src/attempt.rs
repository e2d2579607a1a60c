//! Sequential initial-write attempts with failover.
//!
//! Candidates are tried one at a time; the first node to accept the object
//! ends the loop. A failed attempt is logged and published as
//! [`NodeWriteFailed`] before moving on.

use stow_store::TransientArtifact;
use stow_types::NodeId;
use stow_types::events::{EventBus, NodeWriteFailed};
use tracing::{info, warn};

use crate::error::IngestError;
use crate::selector;
use crate::writer::NodeWriter;

/// An object that has been fully buffered and is ready to be written out.
#[derive(Clone, Copy)]
pub struct BufferedObject<'a> {
    /// Object key.
    pub path: &'a str,
    /// Declared size in bytes.
    pub size: u64,
    /// The spool file holding the object.
    pub artifact: &'a TransientArtifact,
}

/// Outcome of a successful attempt loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InitialWrite {
    /// Node holding the first durable copy.
    pub uploaded: NodeId,
    /// Assigned nodes other than `uploaded`, in assignment order.
    pub missing: Vec<NodeId>,
    /// Number of nodes tried, including the one that accepted.
    pub attempts: usize,
}

/// Write `object` to one node of `assigned`, trying them in random order.
pub async fn write_first(
    writer: &dyn NodeWriter,
    events: &EventBus,
    assigned: &[NodeId],
    object: BufferedObject<'_>,
) -> Result<InitialWrite, IngestError> {
    let order = selector::attempt_order(assigned);
    write_in_order(writer, events, assigned, &order, object).await
}

/// Write `object` to the first node of `order` that accepts it.
///
/// On exhaustion the error names the full `assigned` set.
pub async fn write_in_order(
    writer: &dyn NodeWriter,
    events: &EventBus,
    assigned: &[NodeId],
    order: &[NodeId],
    object: BufferedObject<'_>,
) -> Result<InitialWrite, IngestError> {
    let path = object.path;

    for (index, node) in order.iter().enumerate() {
        match writer
            .write(node, path, object.size, object.artifact)
            .await
        {
            Ok(()) => {
                info!(path, %node, attempts = index + 1, "initial write accepted");
                return Ok(InitialWrite {
                    uploaded: node.clone(),
                    missing: assigned.iter().filter(|n| *n != node).cloned().collect(),
                    attempts: index + 1,
                });
            }
            Err(e) => {
                warn!(path, %node, error = %e, "initial write failed");
                events.emit(NodeWriteFailed {
                    path: path.to_string(),
                    node: node.clone(),
                    error: e.to_string(),
                });
            }
        }
    }

    Err(IngestError::NoNodeAccepted {
        path: path.to_string(),
        nodes: assigned.to_vec(),
    })
}
