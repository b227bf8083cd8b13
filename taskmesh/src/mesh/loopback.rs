//! Loopback mesh for testing and offline demo mode.
//!
//! A [`LoopbackHub`] stands in for the discovery layer: every
//! [`LoopbackMesh`] registered under the same topic is fully connected
//! to the others through bounded in-process channels. Sending is
//! best-effort per peer and per-peer FIFO order is preserved, matching
//! the guarantees of a real swarm backend.

use std::collections::HashMap;
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::{Mutex as AsyncMutex, mpsc};

use taskmesh_proto::topic::Topic;

use super::{DiscoveryHandle, Mesh, MeshError, MeshEvent, PeerId};

/// Default capacity of each peer's inbound event queue.
pub const DEFAULT_INBOX_CAPACITY: usize = 256;

/// One registered peer endpoint inside the hub.
struct Endpoint {
    peer: PeerId,
    tx: mpsc::Sender<MeshEvent>,
}

/// In-process stand-in for the swarm discovery layer.
///
/// Holds the per-topic connection sets. Meshes sharing one hub and one
/// topic see each other; distinct topics are isolated rooms.
#[derive(Default)]
pub struct LoopbackHub {
    rooms: Mutex<HashMap<Topic, Vec<Endpoint>>>,
}

impl LoopbackHub {
    /// Creates an empty hub.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Registers a peer under a topic and announces the connection to
    /// both sides.
    fn register(&self, topic: Topic, endpoint: Endpoint) {
        let mut rooms = self.rooms.lock();
        let members = rooms.entry(topic).or_default();
        for member in members.iter() {
            let _ = member
                .tx
                .try_send(MeshEvent::PeerConnected(endpoint.peer.clone()));
            let _ = endpoint
                .tx
                .try_send(MeshEvent::PeerConnected(member.peer.clone()));
        }
        members.push(endpoint);
    }

    /// Delivers `payload` to every member of `topic` except `from`.
    ///
    /// Closed endpoints found along the way are pruned and announced
    /// to the remaining members as [`MeshEvent::PeerClosed`]. A full
    /// inbox drops the payload for that peer only.
    fn fan_out(&self, topic: Topic, from: &PeerId, payload: &[u8]) -> usize {
        let mut rooms = self.rooms.lock();
        let Some(members) = rooms.get_mut(&topic) else {
            return 0;
        };

        let mut delivered = 0;
        let mut closed = Vec::new();
        for member in members.iter() {
            if member.peer == *from {
                continue;
            }
            let event = MeshEvent::Data {
                from: from.clone(),
                payload: payload.to_vec(),
            };
            match member.tx.try_send(event) {
                Ok(()) => delivered += 1,
                Err(mpsc::error::TrySendError::Closed(_)) => closed.push(member.peer.clone()),
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!(peer = %member.peer, "inbox full, dropping payload for peer");
                }
            }
        }

        if !closed.is_empty() {
            members.retain(|m| !closed.contains(&m.peer));
            for gone in closed {
                for member in members.iter() {
                    let _ = member.tx.try_send(MeshEvent::PeerClosed(gone.clone()));
                }
            }
        }
        delivered
    }

    /// Number of live members of `topic` other than `me`.
    fn member_count(&self, topic: Topic, me: &PeerId) -> usize {
        let rooms = self.rooms.lock();
        rooms.get(&topic).map_or(0, |members| {
            members
                .iter()
                .filter(|m| m.peer != *me && !m.tx.is_closed())
                .count()
        })
    }
}

/// In-process mesh endpoint backed by a shared [`LoopbackHub`].
pub struct LoopbackMesh {
    hub: Arc<LoopbackHub>,
    local: PeerId,
    joined: Mutex<Option<Topic>>,
    inbox_tx: mpsc::Sender<MeshEvent>,
    inbox: AsyncMutex<mpsc::Receiver<MeshEvent>>,
}

impl LoopbackMesh {
    /// Creates an endpoint for `local` on the given hub.
    #[must_use]
    pub fn new(hub: &Arc<LoopbackHub>, local: PeerId, inbox_capacity: usize) -> Self {
        let (inbox_tx, inbox_rx) = mpsc::channel(inbox_capacity);
        Self {
            hub: Arc::clone(hub),
            local,
            joined: Mutex::new(None),
            inbox_tx,
            inbox: AsyncMutex::new(inbox_rx),
        }
    }

    /// The local peer's identifier.
    #[must_use]
    pub const fn local_peer(&self) -> &PeerId {
        &self.local
    }
}

impl Mesh for LoopbackMesh {
    async fn join(&self, topic: Topic) -> Result<DiscoveryHandle, MeshError> {
        {
            let mut joined = self.joined.lock();
            if joined.is_some() {
                return Err(MeshError::AlreadyJoined);
            }
            *joined = Some(topic);
        }
        self.hub.register(
            topic,
            Endpoint {
                peer: self.local.clone(),
                tx: self.inbox_tx.clone(),
            },
        );
        // Announcing in-process is immediate.
        Ok(DiscoveryHandle::ready())
    }

    async fn broadcast(&self, payload: &[u8]) -> usize {
        let topic = *self.joined.lock();
        let Some(topic) = topic else {
            tracing::warn!("broadcast before join, dropping payload");
            return 0;
        };
        self.hub.fan_out(topic, &self.local, payload)
    }

    async fn next_event(&self) -> Option<MeshEvent> {
        self.inbox.lock().await.recv().await
    }

    fn peer_count(&self) -> usize {
        let topic = *self.joined.lock();
        topic.map_or(0, |t| self.hub.member_count(t, &self.local))
    }
}
