//! Mesh transport abstraction for `TaskMesh`.
//!
//! Defines the [`Mesh`] trait that all swarm backends must satisfy.
//! Peer discovery, connection establishment, and NAT traversal live
//! behind this boundary; the core only ever joins a topic, broadcasts
//! opaque bytes, and drains a single ordered queue of [`MeshEvent`]s.
//!
//! Concrete implementations:
//! - [`loopback::LoopbackMesh`]: in-process hub-based mesh for tests
//!   and offline demo mode.

pub mod loopback;

use std::fmt;

use taskmesh_proto::topic::Topic;
use tokio::sync::oneshot;

/// Unique identifier for a peer in the mesh.
///
/// Opaque string; a real swarm backend would derive it from the
/// peer's keypair.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct PeerId(String);

impl PeerId {
    /// Create a new peer identifier from a string representation.
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    /// Return the string representation of this peer ID.
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for PeerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Errors that can occur during mesh operations.
#[derive(Debug, thiserror::Error)]
pub enum MeshError {
    /// A topic has already been joined; one mesh handle serves one room.
    #[error("already joined a topic")]
    AlreadyJoined,

    /// No topic has been joined yet.
    #[error("not joined to any topic")]
    NotJoined,

    /// An underlying I/O error occurred.
    #[error("mesh I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Inbound events from the mesh, observed as one ordered stream.
///
/// Callback wiring from the underlying swarm (connect, data, error,
/// close handlers) is flattened into these tagged events on a bounded
/// queue, so the reconciling owner applies everything in the order it
/// was observed with no interleaving races.
#[derive(Debug)]
pub enum MeshEvent {
    /// A new peer connected on the joined topic.
    PeerConnected(PeerId),
    /// Bytes arrived from a peer. Per-peer FIFO order is preserved.
    Data {
        /// The sending peer.
        from: PeerId,
        /// The raw message bytes.
        payload: Vec<u8>,
    },
    /// A peer-local error. Never fatal; the peer is skipped for that
    /// message only.
    PeerError {
        /// The peer the error relates to.
        peer: PeerId,
        /// Human-readable error description.
        error: String,
    },
    /// A peer disconnected.
    PeerClosed(PeerId),
}

/// One-time readiness signal for a topic join.
///
/// Resolves once the join has been flushed to the discovery layer.
/// This says nothing about whether any peer is connected yet.
#[derive(Debug)]
pub struct DiscoveryHandle {
    flushed: oneshot::Receiver<()>,
}

impl DiscoveryHandle {
    /// A handle that is already flushed, for in-process meshes where
    /// announcing is immediate.
    #[must_use]
    pub fn ready() -> Self {
        let (tx, rx) = oneshot::channel();
        let _ = tx.send(());
        Self { flushed: rx }
    }

    /// A handle that resolves when the given sender fires (or is
    /// dropped, which also counts as settled).
    #[must_use]
    pub const fn pending(flushed: oneshot::Receiver<()>) -> Self {
        Self { flushed }
    }

    /// Suspends until the announce/lookup has settled.
    pub async fn flushed(self) {
        let _ = self.flushed.await;
    }
}

/// Async mesh trait: join a topic, broadcast bytes, drain events.
///
/// Payloads are opaque to the mesh; serialization happens above,
/// discovery below. Broadcast is best-effort per peer: an individual
/// send failure is isolated to that peer and never surfaces as an
/// error to the caller.
pub trait Mesh: Send + Sync {
    /// Join-and-announce on a topic.
    ///
    /// The returned [`DiscoveryHandle`] resolves once the announce has
    /// been flushed to the discovery layer.
    fn join(
        &self,
        topic: Topic,
    ) -> impl std::future::Future<Output = Result<DiscoveryHandle, MeshError>> + Send;

    /// Send the payload to every currently-connected peer.
    ///
    /// Iterates the live connection set at the moment of the call,
    /// tolerating peers that disconnect mid-iteration. Returns the
    /// number of peers the payload was handed to.
    fn broadcast(&self, payload: &[u8]) -> impl std::future::Future<Output = usize> + Send;

    /// Receive the next mesh event, or `None` once the mesh has shut
    /// down.
    fn next_event(&self) -> impl std::future::Future<Output = Option<MeshEvent>> + Send;

    /// Current number of connected peers.
    fn peer_count(&self) -> usize;
}
