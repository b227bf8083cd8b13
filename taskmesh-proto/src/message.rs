//! Wire format message types for the `TaskMesh` replication protocol.
//!
//! Every byte sequence on the mesh decodes to exactly one [`Message`].
//! Operations (`Add`, `Delete`, `Move`, `Toggle`) are broadcast once by
//! the peer that originated them and never relayed by receivers, so a
//! fully-connected mesh sees each operation exactly once per peer.
//! `Sync`/`SyncRequest` form the decoupled, fire-and-forget join
//! handshake; there is no request/response coupling and no negative
//! acknowledgment anywhere in the protocol.

use serde::{Deserialize, Serialize};

use crate::task::{Task, TaskId, TaskStatus};

/// A replication protocol message.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum Message {
    /// Create-or-update one task. Receivers upsert, applying the write
    /// only if the task's `updated_at` beats their local copy.
    Add {
        /// The full task being announced.
        task: Task,
    },
    /// Remove one task. Idempotent at the receiver; unknown ids are a
    /// no-op.
    Delete {
        /// Id of the task to remove.
        id: TaskId,
    },
    /// Update the status of one task, leaving other fields untouched.
    Move {
        /// Id of the task to update.
        id: TaskId,
        /// The new status.
        status: TaskStatus,
        /// Write timestamp; stale moves lose against newer local writes.
        updated_at: u64,
    },
    /// Flip a task between done and not-done. The flip is resolved at
    /// the originating peer and `status` carries the outcome, so
    /// receivers apply a plain status write; concurrent flips delivered
    /// in either order converge on the newest one.
    Toggle {
        /// Id of the task that was flipped.
        id: TaskId,
        /// The status the flip landed on.
        status: TaskStatus,
        /// Write timestamp; stale toggles lose against newer local writes.
        updated_at: u64,
    },
    /// Full-state snapshot, sent (broadcast) in answer to a
    /// [`Message::SyncRequest`]. Unconditionally replaces the
    /// receiver's replica; only ever useful to a bootstrapping joiner.
    Sync {
        /// Every task the responding peer knows about.
        tasks: Vec<Task>,
    },
    /// "Please send me your full state." Broadcast once after joining
    /// a room; if no peer is connected yet, no answer ever arrives and
    /// the joiner simply starts empty.
    SyncRequest,
}

impl Message {
    /// Returns a short name for the message kind, for logging.
    #[must_use]
    pub const fn kind(&self) -> &'static str {
        match self {
            Self::Add { .. } => "add",
            Self::Delete { .. } => "delete",
            Self::Move { .. } => "move",
            Self::Toggle { .. } => "toggle",
            Self::Sync { .. } => "sync",
            Self::SyncRequest => "sync-request",
        }
    }
}
