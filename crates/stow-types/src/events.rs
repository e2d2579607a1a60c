//! Type-safe event bus for the ingest pipeline.
//!
//! The [`EventBus`] is the shared error/observability sink of a shard: the
//! pipeline emits typed events (failed node attempts, cleanup failures,
//! terminal outcomes) and any component may subscribe to a specific event
//! type without direct coupling.
//!
//! Internally the bus keeps a `HashMap<TypeId, Box<dyn Any>>` where each value
//! is a `tokio::sync::broadcast::Sender<E>`. Channels are created lazily on
//! the first `subscribe()` for a given type. Emitting is fire-and-forget: an
//! event nobody subscribed to is dropped.
//!
//! ```rust
//! use stow_types::NodeId;
//! use stow_types::events::{EventBus, NodeWriteFailed};
//!
//! # tokio::runtime::Runtime::new().unwrap().block_on(async {
//! let bus = EventBus::new();
//! let mut rx = bus.subscribe::<NodeWriteFailed>();
//!
//! bus.emit(NodeWriteFailed {
//!     path: "/x".to_string(),
//!     node: NodeId::from("a"),
//!     error: "connection refused".to_string(),
//! });
//!
//! let event = rx.recv().await.unwrap();
//! assert_eq!(event.node, NodeId::from("a"));
//! # });
//! ```

use std::any::{Any, TypeId};
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use tokio::sync::broadcast;
use tracing::warn;

use crate::{NodeId, ReplicationJob, ShardId};

// ---------------------------------------------------------------------------
// Event trait
// ---------------------------------------------------------------------------

/// Marker trait for all events that can travel through the [`EventBus`].
pub trait Event: Any + Send + Sync + Clone + std::fmt::Debug + 'static {}

// ---------------------------------------------------------------------------
// Event types
// ---------------------------------------------------------------------------

/// One initial-write attempt against a node failed.
///
/// Non-fatal: the attempt loop moves on to the next candidate.
#[derive(Clone, Debug)]
pub struct NodeWriteFailed {
    /// Object key being written.
    pub path: String,
    /// Node that rejected or failed the write.
    pub node: NodeId,
    /// Rendered error.
    pub error: String,
}
impl Event for NodeWriteFailed {}

/// Charging the declared size against a shard's capacity failed.
#[derive(Clone, Debug)]
pub struct CapacityChargeFailed {
    /// Shard that was charged.
    pub shard: ShardId,
    /// Bytes that were to be charged.
    pub bytes: u64,
    /// Rendered error.
    pub error: String,
}
impl Event for CapacityChargeFailed {}

/// A transient spool file could not be deleted.
#[derive(Clone, Debug)]
pub struct ArtifactCleanupFailed {
    /// Location of the spool file.
    pub location: PathBuf,
    /// Rendered error.
    pub error: String,
}
impl Event for ArtifactCleanupFailed {}

/// A replication job was handed to the replicator.
#[derive(Clone, Debug)]
pub struct ReplicationRequested {
    /// The submitted job.
    pub job: ReplicationJob,
}
impl Event for ReplicationRequested {}

/// An upload reached full replication.
#[derive(Clone, Debug)]
pub struct UploadCompleted {
    /// Object key.
    pub path: String,
    /// Declared size in bytes.
    pub size: u64,
    /// Node that accepted the initial write.
    pub uploaded: NodeId,
    /// Nodes that received a copy through replication.
    pub replicas: Vec<NodeId>,
}
impl Event for UploadCompleted {}

/// An upload ended in failure.
#[derive(Clone, Debug)]
pub struct UploadFailed {
    /// Object key.
    pub path: String,
    /// Rendered error of the first failure encountered.
    pub error: String,
}
impl Event for UploadFailed {}

// ---------------------------------------------------------------------------
// EventBus
// ---------------------------------------------------------------------------

/// Default broadcast channel capacity.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

type Channels = HashMap<TypeId, Box<dyn Any + Send + Sync>>;

/// A type-safe event bus.
///
/// Clonable (`Arc` inside). Thread-safe. Non-blocking emits.
#[derive(Clone)]
pub struct EventBus {
    inner: Arc<Mutex<Channels>>,
}

impl EventBus {
    /// Create a new empty event bus.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(HashMap::new())),
        }
    }

    /// Emit an event to all current subscribers of type `E`.
    ///
    /// If no subscriber exists the event is dropped.
    pub fn emit<E: Event>(&self, event: E) {
        let channels = self.channels();
        if let Some(sender) = sender_for::<E>(&channels) {
            // Err only means there are no live receivers.
            let _ = sender.send(event);
        }
    }

    /// Subscribe to events of type `E`.
    pub fn subscribe<E: Event>(&self) -> EventReceiver<E> {
        let mut channels = self.channels();
        if let Some(sender) = sender_for::<E>(&channels) {
            return EventReceiver {
                rx: sender.subscribe(),
            };
        }

        let (tx, rx) = broadcast::channel::<E>(DEFAULT_CHANNEL_CAPACITY);
        channels.insert(TypeId::of::<E>(), Box::new(tx));
        EventReceiver { rx }
    }

    /// Lock the channel map, recovering it from a poisoned lock.
    fn channels(&self) -> MutexGuard<'_, Channels> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

fn sender_for<E: Event>(channels: &Channels) -> Option<&broadcast::Sender<E>> {
    channels
        .get(&TypeId::of::<E>())
        .and_then(|boxed| boxed.downcast_ref::<broadcast::Sender<E>>())
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus")
            .field("channel_count", &self.channels().len())
            .finish()
    }
}

// ---------------------------------------------------------------------------
// EventReceiver
// ---------------------------------------------------------------------------

/// Typed receiver for a specific event type.
pub struct EventReceiver<E: Event> {
    rx: broadcast::Receiver<E>,
}

impl<E: Event> EventReceiver<E> {
    /// Wait for the next event.
    ///
    /// Returns `None` once the bus is gone. Lagged events are skipped with a
    /// warning.
    pub async fn recv(&mut self) -> Option<E> {
        loop {
            match self.rx.recv().await {
                Ok(event) => return Some(event),
                Err(broadcast::error::RecvError::Lagged(n)) => {
                    warn!(
                        skipped = n,
                        event_type = std::any::type_name::<E>(),
                        "event receiver lagged"
                    );
                }
                Err(broadcast::error::RecvError::Closed) => return None,
            }
        }
    }

    /// Return the next event if one is already queued.
    pub fn try_recv(&mut self) -> Option<E> {
        loop {
            match self.rx.try_recv() {
                Ok(event) => return Some(event),
                Err(broadcast::error::TryRecvError::Lagged(_)) => continue,
                Err(_) => return None,
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn write_failed(node: &str) -> NodeWriteFailed {
        NodeWriteFailed {
            path: "/x".to_string(),
            node: NodeId::from(node),
            error: "refused".to_string(),
        }
    }

    #[tokio::test]
    async fn test_emit_subscribe_basic() {
        let bus = EventBus::new();
        let mut rx = bus.subscribe::<NodeWriteFailed>();

        bus.emit(write_failed("a"));

        let event = rx.recv().await.unwrap();
        assert_eq!(event.node, NodeId::from("a"));
        assert_eq!(event.path, "/x");
    }

    #[tokio::test]
    async fn test_multiple_subscribers() {
        let bus = EventBus::new();
        let mut rx1 = bus.subscribe::<UploadFailed>();
        let mut rx2 = bus.subscribe::<UploadFailed>();

        bus.emit(UploadFailed {
            path: "/y".to_string(),
            error: "boom".to_string(),
        });

        assert_eq!(rx1.recv().await.unwrap().path, "/y");
        assert_eq!(rx2.recv().await.unwrap().path, "/y");
    }

    #[tokio::test]
    async fn test_subscribe_after_emit_misses_past() {
        let bus = EventBus::new();
        bus.emit(write_failed("a"));

        let mut rx = bus.subscribe::<NodeWriteFailed>();
        bus.emit(write_failed("b"));

        assert_eq!(rx.recv().await.unwrap().node, NodeId::from("b"));
        assert!(rx.try_recv().is_none());
    }

    #[tokio::test]
    async fn test_event_types_are_independent() {
        let bus = EventBus::new();
        let mut rx_failed = bus.subscribe::<NodeWriteFailed>();
        let mut rx_cleanup = bus.subscribe::<ArtifactCleanupFailed>();

        bus.emit(ArtifactCleanupFailed {
            location: PathBuf::from("/tmp/b-1"),
            error: "busy".to_string(),
        });

        assert!(rx_failed.try_recv().is_none());
        let cleanup = rx_cleanup.recv().await.unwrap();
        assert_eq!(cleanup.location, PathBuf::from("/tmp/b-1"));
    }

    #[test]
    fn test_emit_without_subscriber_does_not_block() {
        let bus = EventBus::new();
        bus.emit(write_failed("a"));
        bus.emit(ReplicationRequested {
            job: ReplicationJob {
                sources: vec![NodeId::from("a")],
                target: NodeId::from("b"),
                path: "/x".to_string(),
            },
        });
    }

    #[tokio::test]
    async fn test_bus_survives_poisoned_lock() {
        let bus = EventBus::new();
        let poisoner = bus.clone();
        std::thread::spawn(move || {
            let _guard = poisoner.inner.lock().unwrap();
            panic!("emitter panicked");
        })
        .join()
        .unwrap_err();

        let mut rx = bus.subscribe::<NodeWriteFailed>();
        bus.emit(write_failed("a"));
        assert_eq!(rx.recv().await.unwrap().node, NodeId::from("a"));
    }
}
