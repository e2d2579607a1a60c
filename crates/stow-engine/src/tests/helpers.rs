//! Shared test utilities for stow-engine tests.

use std::collections::{HashMap, HashSet};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use axum::Router;
use axum::body::Bytes as AxumBytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::put;
use bytes::Bytes;
use stow_cluster::LocalCoordinator;
use stow_net::{NetError, Replicator};
use stow_store::{Spool, TransientArtifact};
use stow_types::{NodeAddr, NodeId, ReplicationJob, ShardId};
use tempfile::TempDir;
use tokio::io::AsyncReadExt;

use crate::error::NodeWriteError;
use crate::shard::{Shard, ShardConfig};
use crate::writer::NodeWriter;

pub const SHARD: ShardId = ShardId::new(0);

pub fn ids(names: &[&str]) -> Vec<NodeId> {
    names.iter().map(|n| NodeId::from(*n)).collect()
}

/// Generate deterministic, non-repeating test data.
pub fn test_data(size: usize) -> Vec<u8> {
    let mut data = Vec::with_capacity(size);
    let mut state: u32 = 0xDEAD_BEEF;
    for _ in 0..size {
        state = state.wrapping_mul(1103515245).wrapping_add(12345);
        data.push((state >> 16) as u8);
    }
    data
}

/// Split `data` into a body stream of `chunk`-sized pieces.
pub fn body(
    data: &[u8],
    chunk: usize,
) -> impl futures_lite::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    let items: Vec<Result<Bytes, std::io::Error>> = data
        .chunks(chunk.max(1))
        .map(|c| Ok(Bytes::copy_from_slice(c)))
        .collect();
    futures_lite::stream::iter(items)
}

/// A body that yields `prefix` and then fails.
pub fn failing_body(
    prefix: &'static [u8],
) -> impl futures_lite::Stream<Item = Result<Bytes, std::io::Error>> + Send + 'static {
    futures_lite::stream::iter(vec![
        Ok(Bytes::from_static(prefix)),
        Err(std::io::Error::other("client went away")),
    ])
}

/// Buffer `data` into a fresh spool file.
pub async fn buffered(spool: &Spool, data: &[u8]) -> TransientArtifact {
    let mut writer = spool.create().await.unwrap();
    writer.write(data).await.unwrap();
    writer.finish().await.unwrap();
    writer.into_artifact()
}

/// Number of files left in a spool directory.
pub fn spool_files(dir: &Path) -> usize {
    std::fs::read_dir(dir).unwrap().count()
}

// ---------------------------------------------------------------------------
// Scripted node writer
// ---------------------------------------------------------------------------

/// [`NodeWriter`] that accepts or refuses by node and records every attempt.
///
/// Each attempt reads the whole artifact through its own read view.
#[derive(Default)]
pub struct ScriptedWriter {
    refusing: HashSet<NodeId>,
    delete_artifact: bool,
    attempts: Mutex<Vec<NodeId>>,
    payloads: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedWriter {
    pub fn accepting() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn refusing(nodes: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            refusing: ids(nodes).into_iter().collect(),
            ..Self::default()
        })
    }

    /// Accepts every write but deletes the spool file behind the shard's back.
    pub fn deleting_artifact() -> Arc<Self> {
        Arc::new(Self {
            delete_artifact: true,
            ..Self::default()
        })
    }

    pub fn attempts(&self) -> Vec<NodeId> {
        self.attempts.lock().unwrap().clone()
    }

    pub fn payloads(&self) -> Vec<Vec<u8>> {
        self.payloads.lock().unwrap().clone()
    }
}

#[async_trait::async_trait]
impl NodeWriter for ScriptedWriter {
    async fn write(
        &self,
        node: &NodeId,
        path: &str,
        _size: u64,
        artifact: &TransientArtifact,
    ) -> Result<(), NodeWriteError> {
        self.attempts.lock().unwrap().push(node.clone());

        let mut data = Vec::new();
        artifact.open().await?.read_to_end(&mut data).await.unwrap();
        self.payloads.lock().unwrap().push(data);

        if self.refusing.contains(node) {
            return Err(NodeWriteError::Net(NetError::Status {
                method: "PUT",
                path: path.to_string(),
                node: node.clone(),
                status: 503,
            }));
        }
        if self.delete_artifact {
            std::fs::remove_file(artifact.location()).unwrap();
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Recording replicator
// ---------------------------------------------------------------------------

/// [`Replicator`] that records jobs and fails pushes to chosen targets.
///
/// Every push sleeps for `delay` so concurrent pushes overlap.
#[derive(Default)]
pub struct RecordingReplicator {
    failing: HashSet<NodeId>,
    delay: Duration,
    jobs: Mutex<Vec<ReplicationJob>>,
    in_flight: AtomicUsize,
    max_in_flight: AtomicUsize,
    completed: AtomicUsize,
}

impl RecordingReplicator {
    pub fn succeeding() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn failing(targets: &[&str]) -> Arc<Self> {
        Arc::new(Self {
            failing: ids(targets).into_iter().collect(),
            ..Self::default()
        })
    }

    pub fn slow(targets_failing: &[&str], delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            failing: ids(targets_failing).into_iter().collect(),
            delay,
            ..Self::default()
        })
    }

    /// Recorded jobs, sorted by target.
    pub fn jobs(&self) -> Vec<ReplicationJob> {
        let mut jobs = self.jobs.lock().unwrap().clone();
        jobs.sort_by(|a, b| a.target.cmp(&b.target));
        jobs
    }

    pub fn max_in_flight(&self) -> usize {
        self.max_in_flight.load(Ordering::SeqCst)
    }

    pub fn completed(&self) -> usize {
        self.completed.load(Ordering::SeqCst)
    }
}

#[async_trait::async_trait]
impl Replicator for RecordingReplicator {
    async fn push(&self, job: &ReplicationJob) -> Result<(), NetError> {
        self.jobs.lock().unwrap().push(job.clone());
        let now = self.in_flight.fetch_add(1, Ordering::SeqCst) + 1;
        self.max_in_flight.fetch_max(now, Ordering::SeqCst);

        tokio::time::sleep(self.delay).await;

        self.in_flight.fetch_sub(1, Ordering::SeqCst);
        self.completed.fetch_add(1, Ordering::SeqCst);

        if self.failing.contains(&job.target) {
            return Err(NetError::Status {
                method: "PUT",
                path: job.path.clone(),
                node: job.target.clone(),
                status: 507,
            });
        }
        Ok(())
    }
}

// ---------------------------------------------------------------------------
// Shard harness
// ---------------------------------------------------------------------------

pub struct Harness {
    pub shard: Arc<Shard>,
    pub coordinator: Arc<LocalCoordinator>,
    pub spool_dir: PathBuf,
    _dir: TempDir,
}

/// A shard over `nodes` with no capacity limit.
pub fn harness(
    nodes: &[&str],
    writer: Arc<dyn NodeWriter>,
    replicator: Arc<dyn Replicator>,
) -> Harness {
    harness_with_limits(nodes, writer, replicator, HashMap::new())
}

pub fn harness_with_limits(
    nodes: &[&str],
    writer: Arc<dyn NodeWriter>,
    replicator: Arc<dyn Replicator>,
    limits: HashMap<ShardId, u64>,
) -> Harness {
    let registry = ids(nodes)
        .into_iter()
        .enumerate()
        .map(|(i, id)| (id, NodeAddr::new("127.0.0.1", 7000 + i as u16)));
    let coordinator = LocalCoordinator::with_limits(registry, limits);
    harness_with_coordinator(nodes, coordinator, writer, replicator)
}

pub fn harness_with_coordinator(
    nodes: &[&str],
    coordinator: Arc<LocalCoordinator>,
    writer: Arc<dyn NodeWriter>,
    replicator: Arc<dyn Replicator>,
) -> Harness {
    let dir = TempDir::new().unwrap();
    let spool_dir = dir.path().join("spool");
    let spool = Spool::new(&spool_dir).unwrap();

    let shard = Shard::new(
        ShardConfig {
            id: SHARD,
            nodes: ids(nodes),
        },
        coordinator.clone(),
        writer,
        replicator,
        spool,
    )
    .unwrap();

    Harness {
        shard: Arc::new(shard),
        coordinator,
        spool_dir,
        _dir: dir,
    }
}

// ---------------------------------------------------------------------------
// Stub storage node
// ---------------------------------------------------------------------------

#[derive(Clone)]
struct StubState {
    objects: Arc<Mutex<HashMap<String, Vec<u8>>>>,
    lengths: Arc<Mutex<Vec<Option<u64>>>>,
    put_status: StatusCode,
}

/// A loopback HTTP storage node.
pub struct StubNode {
    pub addr: NodeAddr,
    state: StubState,
}

impl StubNode {
    pub async fn start(put_status: StatusCode) -> Self {
        let state = StubState {
            objects: Arc::new(Mutex::new(HashMap::new())),
            lengths: Arc::new(Mutex::new(Vec::new())),
            put_status,
        };

        let router = Router::new()
            .route("/{*path}", put(stub_put).get(stub_get))
            .with_state(state.clone());

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let port = listener.local_addr().unwrap().port();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        Self {
            addr: NodeAddr::new("127.0.0.1", port),
            state,
        }
    }

    pub fn object(&self, path: &str) -> Option<Vec<u8>> {
        self.state.objects.lock().unwrap().get(path).cloned()
    }

    /// `Content-Length` of every PUT received.
    pub fn lengths(&self) -> Vec<Option<u64>> {
        self.state.lengths.lock().unwrap().clone()
    }
}

async fn stub_put(
    State(state): State<StubState>,
    UrlPath(path): UrlPath<String>,
    headers: HeaderMap,
    body: AxumBytes,
) -> (StatusCode, &'static str) {
    let len = headers
        .get("content-length")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse().ok());
    state.lengths.lock().unwrap().push(len);

    if state.put_status.is_success() {
        state
            .objects
            .lock()
            .unwrap()
            .insert(format!("/{path}"), body.to_vec());
        (state.put_status, "")
    } else {
        (state.put_status, "stub node rejected the write")
    }
}

async fn stub_get(
    State(state): State<StubState>,
    UrlPath(path): UrlPath<String>,
) -> Result<Vec<u8>, StatusCode> {
    state
        .objects
        .lock()
        .unwrap()
        .get(&format!("/{path}"))
        .cloned()
        .ok_or(StatusCode::NOT_FOUND)
}

/// An address nothing is listening on.
pub async fn refused_addr() -> NodeAddr {
    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let port = listener.local_addr().unwrap().port();
    drop(listener);
    NodeAddr::new("127.0.0.1", port)
}
