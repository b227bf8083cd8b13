//! Node coordinator wiring local commands and mesh traffic to the engine.
//!
//! One background tokio task owns both the [`Engine`] and the [`Mesh`]
//! and drains a single ordered stream of inputs: [`NodeCommand`]s from
//! the caller and [`MeshEvent`]s from the wire. Because everything is
//! applied by that one task, replica mutations never interleave.
//!
//! # Architecture
//!
//! ```text
//! caller (CLI/tests)  ←── NodeEvent ───  reconciling owner task
//!                      ─── NodeCommand →
//! ```
//!
//! All failure handling here is local absorption: undecodable bytes are
//! dropped, peer errors are logged and surfaced as non-fatal events,
//! and nothing unwinds past this module. The protocol has no ack/retry
//! layer; any missed operation is re-derivable from a future full sync.

use tokio::sync::mpsc;

use taskmesh_proto::codec;
use taskmesh_proto::message::Message;
use taskmesh_proto::task::{Task, TaskId, TaskStatus};

use crate::engine::Engine;
use crate::mesh::{Mesh, MeshEvent};

/// Commands sent from the caller to the reconciling owner task.
#[derive(Debug)]
pub enum NodeCommand {
    /// Create a task and announce it.
    AddTask {
        /// Display name (validated non-empty).
        name: String,
        /// Optional description, may be empty.
        description: String,
    },
    /// Delete a task and announce the removal.
    DeleteTask {
        /// Id of the task to delete.
        id: TaskId,
    },
    /// Set a task's status and announce the move.
    SetStatus {
        /// Id of the task to update.
        id: TaskId,
        /// The new status.
        status: TaskStatus,
    },
    /// Flip a task between done and not-done and announce the toggle.
    Toggle {
        /// Id of the task to flip.
        id: TaskId,
    },
    /// Gracefully shut down the owner task.
    Shutdown,
}

/// Events sent from the reconciling owner task to the caller.
#[derive(Debug)]
pub enum NodeEvent {
    /// The task list changed; carries the full list sorted by creation
    /// time, recomputed on every change.
    TasksChanged(Vec<Task>),
    /// The number of connected peers changed.
    PeerCountChanged(usize),
    /// A non-fatal error occurred (validation failure, peer error).
    Error(String),
}

/// Configuration for the node coordinator.
#[derive(Debug, Clone)]
pub struct NodeConfig {
    /// Capacity of the command/event mpsc channels.
    pub channel_capacity: usize,
}

/// Default channel capacity for commands and events.
const DEFAULT_CHANNEL_CAPACITY: usize = 256;

impl Default for NodeConfig {
    fn default() -> Self {
        Self {
            channel_capacity: DEFAULT_CHANNEL_CAPACITY,
        }
    }
}

/// Spawns the reconciling owner task and returns channel handles.
///
/// The mesh should already be joined to its topic (see
/// [`Session::join`](crate::session::Session::join)); this task takes
/// over draining its events. Dropping the command sender shuts the
/// task down, as does [`NodeCommand::Shutdown`].
#[must_use]
pub fn spawn_node<M: Mesh + 'static>(
    mesh: M,
    config: &NodeConfig,
) -> (mpsc::Sender<NodeCommand>, mpsc::Receiver<NodeEvent>) {
    let (cmd_tx, cmd_rx) = mpsc::channel::<NodeCommand>(config.channel_capacity);
    let (evt_tx, evt_rx) = mpsc::channel::<NodeEvent>(config.channel_capacity);

    tokio::spawn(async move {
        owner_loop(mesh, cmd_rx, evt_tx).await;
    });

    (cmd_tx, evt_rx)
}

/// The single reconciling owner: applies commands and mesh events in
/// the order they are observed.
async fn owner_loop<M: Mesh>(
    mesh: M,
    mut cmd_rx: mpsc::Receiver<NodeCommand>,
    evt_tx: mpsc::Sender<NodeEvent>,
) {
    let mut engine = Engine::new();

    loop {
        tokio::select! {
            cmd = cmd_rx.recv() => {
                let Some(cmd) = cmd else {
                    tracing::info!("command channel closed, node shutting down");
                    break;
                };
                if matches!(cmd, NodeCommand::Shutdown) {
                    tracing::info!("node shutting down");
                    break;
                }
                handle_command(&mut engine, &mesh, cmd, &evt_tx).await;
            }
            event = mesh.next_event() => {
                let Some(event) = event else {
                    tracing::info!("mesh closed, node shutting down");
                    break;
                };
                handle_mesh_event(&mut engine, &mesh, event, &evt_tx).await;
            }
        }
    }
}

/// Applies a local command to the engine and announces the result.
///
/// Local operations apply immediately, so the caller's view is never
/// blocked on the network, and broadcast exactly once.
async fn handle_command<M: Mesh>(
    engine: &mut Engine,
    mesh: &M,
    cmd: NodeCommand,
    evt_tx: &mpsc::Sender<NodeEvent>,
) {
    let announce = match cmd {
        NodeCommand::AddTask { name, description } => {
            match engine.create_task(&name, &description) {
                Ok((task, msg)) => {
                    tracing::debug!(id = %task.id, "task created");
                    Some(msg)
                }
                Err(e) => {
                    let _ = evt_tx.send(NodeEvent::Error(e.to_string())).await;
                    return;
                }
            }
        }
        NodeCommand::DeleteTask { id } => Some(engine.delete_task(&id)),
        NodeCommand::SetStatus { id, status } => engine.set_status(&id, status),
        NodeCommand::Toggle { id } => engine.toggle(&id),
        NodeCommand::Shutdown => return,
    };

    if let Some(msg) = announce {
        broadcast(mesh, &msg).await;
    }
    let _ = evt_tx.send(NodeEvent::TasksChanged(engine.tasks())).await;
}

/// Merges one mesh event into the engine.
async fn handle_mesh_event<M: Mesh>(
    engine: &mut Engine,
    mesh: &M,
    event: MeshEvent,
    evt_tx: &mpsc::Sender<NodeEvent>,
) {
    match event {
        MeshEvent::Data { from, payload } => {
            let msg = match codec::decode(&payload) {
                Ok(msg) => msg,
                Err(e) => {
                    // Malformed input is silently dropped; the protocol
                    // has no negative acknowledgment.
                    tracing::debug!(peer = %from, error = %e, "dropping undecodable message");
                    return;
                }
            };
            tracing::trace!(peer = %from, kind = msg.kind(), "applying remote message");
            if let Some(reply) = engine.apply_remote(&msg) {
                broadcast(mesh, &reply).await;
            }
            let _ = evt_tx.send(NodeEvent::TasksChanged(engine.tasks())).await;
        }
        MeshEvent::PeerConnected(peer) => {
            tracing::info!(%peer, "peer connected");
            let _ = evt_tx
                .send(NodeEvent::PeerCountChanged(mesh.peer_count()))
                .await;
        }
        MeshEvent::PeerClosed(peer) => {
            tracing::info!(%peer, "peer disconnected");
            let _ = evt_tx
                .send(NodeEvent::PeerCountChanged(mesh.peer_count()))
                .await;
        }
        MeshEvent::PeerError { peer, error } => {
            tracing::warn!(%peer, %error, "peer error");
            let _ = evt_tx
                .send(NodeEvent::Error(format!("peer {peer}: {error}")))
                .await;
        }
    }
}

/// Encodes and broadcasts one message, best-effort.
async fn broadcast<M: Mesh>(mesh: &M, msg: &Message) {
    match codec::encode(msg) {
        Ok(bytes) => {
            let peers = mesh.broadcast(&bytes).await;
            tracing::trace!(kind = msg.kind(), peers, "broadcast");
        }
        Err(e) => tracing::warn!(kind = msg.kind(), error = %e, "failed to encode message"),
    }
}
