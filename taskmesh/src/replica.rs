//! The authoritative in-process copy of the task list for one peer.
//!
//! [`Replica`] is an encapsulated store behind a narrow mutation
//! interface, owned exclusively by the single reconciling owner (see
//! [`crate::net`]). No ordering is stored; presentation order is
//! recomputed on every read. Writes carry timestamps and lose against
//! newer local state, and removed ids leave a bounded tombstone so a
//! late-arriving stale `Add` cannot resurrect a deleted task.

use std::collections::{HashMap, HashSet, VecDeque};

use taskmesh_proto::task::{Task, TaskId, TaskStatus};

/// Maximum number of deleted ids retained as tombstones.
///
/// Oldest tombstones are evicted first. An `Add` that outlives a full
/// eviction cycle can still resurrect its task; at expected scale
/// (small ad-hoc groups, human-speed edits) that window is years wide.
pub const MAX_TOMBSTONES: usize = 1024;

/// Mapping from task id to [`Task`], plus the tombstone set.
#[derive(Debug, Default)]
pub struct Replica {
    tasks: HashMap<TaskId, Task>,
    /// Deleted ids, for resurrection protection.
    tombstones: HashSet<TaskId>,
    /// Tombstone insertion order, oldest first, for bounded eviction.
    tombstone_order: VecDeque<TaskId>,
}

impl Replica {
    /// Creates an empty replica.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Inserts the task if its id is unknown; otherwise overwrites the
    /// mutable fields (`name`, `description`, `status`) if and only if
    /// the incoming `updated_at` is strictly newer than the local copy.
    /// `id` and `created_at` are never touched on an existing task.
    ///
    /// Writes to a tombstoned id are ignored.
    ///
    /// Returns whether the task was newly created.
    pub fn upsert(&mut self, task: Task) -> bool {
        if self.tombstones.contains(&task.id) {
            return false;
        }
        match self.tasks.entry(task.id.clone()) {
            std::collections::hash_map::Entry::Vacant(entry) => {
                entry.insert(task);
                true
            }
            std::collections::hash_map::Entry::Occupied(mut entry) => {
                let local = entry.get_mut();
                if task.updated_at > local.updated_at {
                    local.name = task.name;
                    local.description = task.description;
                    local.status = task.status;
                    local.updated_at = task.updated_at;
                }
                false
            }
        }
    }

    /// Deletes the entry if present and records a tombstone. No-op on
    /// an already-absent id beyond the tombstone, so deletes are
    /// idempotent and a delete observed before its add still sticks.
    pub fn remove(&mut self, id: &TaskId) {
        self.tasks.remove(id);
        if self.tombstones.insert(id.clone()) {
            self.tombstone_order.push_back(id.clone());
            if self.tombstone_order.len() > MAX_TOMBSTONES
                && let Some(oldest) = self.tombstone_order.pop_front()
            {
                self.tombstones.remove(&oldest);
            }
        }
    }

    /// Updates the status of a known task, if the write is newer than
    /// the local copy. No-op on unknown ids or stale timestamps.
    ///
    /// Returns whether the status was applied.
    pub fn set_status(&mut self, id: &TaskId, status: TaskStatus, updated_at: u64) -> bool {
        let Some(task) = self.tasks.get_mut(id) else {
            return false;
        };
        if updated_at <= task.updated_at {
            return false;
        }
        task.status = status;
        task.updated_at = updated_at;
        true
    }

    /// Returns an owned copy of every task, for full-sync payloads.
    /// Unordered.
    #[must_use]
    pub fn snapshot_all(&self) -> Vec<Task> {
        self.tasks.values().cloned().collect()
    }

    /// Atomically discards the current state and installs the given
    /// tasks. A full overwrite, not a merge: prior tasks and tombstones
    /// are gone. Used only when absorbing a bootstrap `Sync` payload,
    /// which represents the mesh as another peer already saw it.
    pub fn replace_all(&mut self, tasks: Vec<Task>) {
        self.tasks = tasks.into_iter().map(|t| (t.id.clone(), t)).collect();
        self.tombstones.clear();
        self.tombstone_order.clear();
    }

    /// Returns every task sorted by creation time, the default
    /// presentation order. Recomputed on each call, never stored.
    #[must_use]
    pub fn tasks_by_created(&self) -> Vec<Task> {
        let mut tasks = self.snapshot_all();
        tasks.sort_by_key(|t| t.created_at);
        tasks
    }

    /// Looks up a task by id.
    #[must_use]
    pub fn get(&self, id: &TaskId) -> Option<&Task> {
        self.tasks.get(id)
    }

    /// Number of live tasks.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    /// Whether the replica holds no tasks.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }
}
