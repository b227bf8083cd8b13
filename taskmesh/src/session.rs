//! Room membership state machine: `Idle → Joining → Active`.
//!
//! Entering a room is the only operation in the system that legitimately
//! suspends: the controller joins the topic, waits for the discovery
//! layer to report that the announce has been flushed, then broadcasts a
//! single fire-and-forget `SyncRequest`. If no peer is connected yet,
//! no answer ever arrives and the replica simply starts empty, correct
//! for a brand-new room. `Active` is terminal; leaving a room is not a
//! modeled operation, membership ends with the process.

use taskmesh_proto::codec;
use taskmesh_proto::message::Message;
use taskmesh_proto::topic::Topic;

use crate::mesh::{Mesh, MeshError};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Not in a room.
    Idle,
    /// Waiting for the discovery layer to flush the announce.
    Joining,
    /// Steady-state room membership.
    Active,
}

/// Errors that can occur while joining a room.
#[derive(Debug, thiserror::Error)]
pub enum JoinError {
    /// The session already joined a room; membership is one-shot.
    #[error("already joined a room")]
    AlreadyJoined,

    /// The mesh layer failed to join the topic.
    #[error(transparent)]
    Mesh(#[from] MeshError),
}

/// Drives the one-time handshake when this peer enters a room.
#[derive(Debug, Default)]
pub struct Session {
    state: State,
}

#[derive(Debug, Default)]
enum State {
    #[default]
    Idle,
    Joining,
    Active {
        topic: Topic,
    },
}

impl Session {
    /// Creates a session in the `Idle` state.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Current lifecycle state.
    #[must_use]
    pub const fn state(&self) -> SessionState {
        match self.state {
            State::Idle => SessionState::Idle,
            State::Joining => SessionState::Joining,
            State::Active { .. } => SessionState::Active,
        }
    }

    /// The joined room's topic, once `Active`.
    #[must_use]
    pub const fn topic(&self) -> Option<Topic> {
        match self.state {
            State::Active { topic } => Some(topic),
            State::Idle | State::Joining => None,
        }
    }

    /// Generates a fresh random 32-byte topic for a new room.
    #[must_use]
    pub fn generate_topic() -> Topic {
        Topic::from_bytes(rand::random())
    }

    /// Creates a brand-new room: generates a topic and joins it.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError`] as for [`Session::join`].
    pub async fn create_room<M: Mesh>(&mut self, mesh: &M) -> Result<Topic, JoinError> {
        let topic = Self::generate_topic();
        self.join(mesh, topic).await?;
        Ok(topic)
    }

    /// Joins a room by topic: announces on the mesh, suspends until
    /// discovery is flushed, then broadcasts one `SyncRequest`.
    ///
    /// # Errors
    ///
    /// Returns [`JoinError::AlreadyJoined`] unless the session is
    /// `Idle`, or the mesh layer's error if the join fails (in which
    /// case the session is back in `Idle` and may retry).
    pub async fn join<M: Mesh>(&mut self, mesh: &M, topic: Topic) -> Result<(), JoinError> {
        if self.state() != SessionState::Idle {
            return Err(JoinError::AlreadyJoined);
        }
        self.state = State::Joining;

        let discovery = match mesh.join(topic).await {
            Ok(handle) => handle,
            Err(e) => {
                self.state = State::Idle;
                return Err(e.into());
            }
        };
        discovery.flushed().await;

        // Fire-and-forget: zero peers answering is a valid outcome.
        match codec::encode(&Message::SyncRequest) {
            Ok(bytes) => {
                let peers = mesh.broadcast(&bytes).await;
                tracing::info!(%topic, peers, "joined room, requested full sync");
            }
            Err(e) => tracing::warn!(error = %e, "failed to encode sync request"),
        }

        self.state = State::Active { topic };
        Ok(())
    }
}
