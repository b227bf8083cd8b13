//! Reconciliation engine: the single reconciling owner of the replica.
//!
//! Local user actions are applied to the [`Replica`] immediately (the
//! caller's view never blocks on the network) and returned as exactly
//! one [`Message`] to broadcast. Remote messages are merged via
//! [`Engine::apply_remote`], which never asks for a re-broadcast of an
//! operation that originated elsewhere; the sender already announced
//! it to everyone, and relaying would amplify without bound on a
//! fully-connected mesh. The only reply it ever produces is the `Sync`
//! snapshot answering a `SyncRequest`.

use std::time::{SystemTime, UNIX_EPOCH};

use taskmesh_proto::message::Message;
use taskmesh_proto::task::{Task, TaskId, TaskStatus, ValidationError};

use crate::replica::Replica;

/// Interprets protocol messages against the replica and decides what,
/// if anything, to broadcast. Stateless across messages except through
/// the replica it owns.
#[derive(Debug, Default)]
pub struct Engine {
    replica: Replica,
}

impl Engine {
    /// Creates an engine with an empty replica.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the current timestamp in milliseconds since epoch.
    fn now_ms() -> u64 {
        u64::try_from(
            SystemTime::now()
                .duration_since(UNIX_EPOCH)
                .unwrap_or_default()
                .as_millis(),
        )
        .unwrap_or(u64::MAX)
    }

    /// A write timestamp for a local edit of `task`: wall clock, but
    /// always past the task's last write so same-millisecond edits
    /// still advance.
    fn next_write_ts(task: &Task) -> u64 {
        Self::now_ms().max(task.updated_at + 1)
    }

    /// Creates a new task and returns it along with the `Add` to
    /// broadcast.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError`] if the name is empty or too long;
    /// nothing invalid is applied or replicated.
    pub fn create_task(
        &mut self,
        name: &str,
        description: &str,
    ) -> Result<(Task, Message), ValidationError> {
        let task = Task::new(name, description, Self::now_ms())?;
        self.replica.upsert(task.clone());
        let msg = Message::Add { task: task.clone() };
        Ok((task, msg))
    }

    /// Deletes a task locally (idempotent, unknown ids included) and
    /// returns the `Delete` to broadcast.
    pub fn delete_task(&mut self, id: &TaskId) -> Message {
        self.replica.remove(id);
        Message::Delete { id: id.clone() }
    }

    /// Sets the status of a known task and returns the `Move` to
    /// broadcast, or `None` if the id is unknown.
    pub fn set_status(&mut self, id: &TaskId, status: TaskStatus) -> Option<Message> {
        let updated_at = Self::next_write_ts(self.replica.get(id)?);
        self.replica.set_status(id, status, updated_at);
        Some(Message::Move {
            id: id.clone(),
            status,
            updated_at,
        })
    }

    /// Flips a known task between done and not-done and returns the
    /// `Toggle` to broadcast, or `None` if the id is unknown.
    pub fn toggle(&mut self, id: &TaskId) -> Option<Message> {
        let task = self.replica.get(id)?;
        let status = task.status.toggled();
        let updated_at = Self::next_write_ts(task);
        self.replica.set_status(id, status, updated_at);
        Some(Message::Toggle {
            id: id.clone(),
            status,
            updated_at,
        })
    }

    /// Merges one remotely-originated message into the replica.
    ///
    /// Returns the single message to broadcast in response, which is
    /// `Some` only for a `SyncRequest` (answered with this replica's
    /// full snapshot, broadcast rather than unicast so whichever
    /// answer lands first bootstraps the joiner).
    pub fn apply_remote(&mut self, msg: &Message) -> Option<Message> {
        match msg {
            Message::Add { task } => {
                self.replica.upsert(task.clone());
                None
            }
            Message::Delete { id } => {
                self.replica.remove(id);
                None
            }
            Message::Move {
                id,
                status,
                updated_at,
            } => {
                self.replica.set_status(id, *status, *updated_at);
                None
            }
            // The flip was resolved at the originator; this is a plain
            // status write, so opposite delivery orders converge.
            Message::Toggle {
                id,
                status,
                updated_at,
            } => {
                self.replica.set_status(id, *status, *updated_at);
                None
            }
            Message::Sync { tasks } => {
                // A Sync carries another peer's whole view; it replaces
                // the local list rather than merging into it.
                self.replica.replace_all(tasks.clone());
                None
            }
            Message::SyncRequest => Some(Message::Sync {
                tasks: self.replica.snapshot_all(),
            }),
        }
    }

    /// Every task, sorted by creation time.
    #[must_use]
    pub fn tasks(&self) -> Vec<Task> {
        self.replica.tasks_by_created()
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.replica.get(id)
    }

    /// Number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.replica.len()
    }

    /// Whether the replica holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.replica.is_empty()
    }
}
