//! Replicated task model for `TaskMesh`.
//!
//! A [`Task`] is the unit of replicated state. Its `id` and `created_at`
//! are assigned once by the originating peer and never change; the
//! mutable fields (`name`, `description`, `status`) travel with an
//! `updated_at` timestamp so receivers can reject stale writes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Maximum allowed task name length in characters.
pub const MAX_TASK_NAME_LENGTH: usize = 256;

/// Unique identifier for a task, based on UUID v7 for time-ordering.
///
/// Uniqueness is client-generated and treated as authoritative; there is
/// no global allocator and ids are never reassigned or fabricated for an
/// existing logical task.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TaskId(Uuid);

impl TaskId {
    /// Creates a new time-ordered task identifier (UUID v7).
    #[must_use]
    pub fn new() -> Self {
        Self(Uuid::now_v7())
    }

    /// Creates a `TaskId` from an existing UUID.
    #[must_use]
    pub const fn from_uuid(uuid: Uuid) -> Self {
        Self(uuid)
    }

    /// Returns the inner UUID value.
    #[must_use]
    pub const fn as_uuid(&self) -> &Uuid {
        &self.0
    }
}

impl Default for TaskId {
    fn default() -> Self {
        Self::new()
    }
}

impl std::fmt::Display for TaskId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Lifecycle status of a task.
///
/// Transitions are unconstrained: any status may move to any other.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TaskStatus {
    /// Task is open and not started.
    Todo,
    /// Task is actively being worked on.
    InProgress,
    /// Task has been completed.
    Done,
}

impl TaskStatus {
    /// Returns the status a completion toggle lands on.
    ///
    /// `Done` flips back to `Todo`; everything else flips to `Done`.
    #[must_use]
    pub const fn toggled(self) -> Self {
        match self {
            Self::Done => Self::Todo,
            Self::Todo | Self::InProgress => Self::Done,
        }
    }
}

impl std::fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Todo => write!(f, "todo"),
            Self::InProgress => write!(f, "in_progress"),
            Self::Done => write!(f, "done"),
        }
    }
}

/// Error returned when a string does not name a recognized status.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
#[error("unrecognized task status: {0}")]
pub struct ParseStatusError(pub String);

impl std::str::FromStr for TaskStatus {
    type Err = ParseStatusError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "todo" => Ok(Self::Todo),
            "in_progress" | "in-progress" => Ok(Self::InProgress),
            "done" => Ok(Self::Done),
            other => Err(ParseStatusError(other.to_string())),
        }
    }
}

/// A replicated task.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Task {
    /// Unique task identifier, immutable for the task's lifetime.
    pub id: TaskId,
    /// Display name. Non-empty at creation; empty names are rejected
    /// locally and never replicated.
    pub name: String,
    /// Optional free-form description, may be empty.
    pub description: String,
    /// When this task was created (milliseconds since epoch at the
    /// origin peer). Never mutated after creation; used only for
    /// default presentation ordering.
    pub created_at: u64,
    /// When the mutable fields were last written (milliseconds since
    /// epoch at the writing peer). Receivers apply an incoming write
    /// only if this is strictly newer than their local copy.
    pub updated_at: u64,
    /// Current lifecycle status.
    pub status: TaskStatus,
}

/// Error returned when a task fails creation-time validation.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ValidationError {
    /// Task name is empty.
    #[error("task name cannot be empty")]
    NameEmpty,
    /// Task name exceeds the maximum allowed length.
    #[error("task name too long ({len} characters, max {max})")]
    NameTooLong {
        /// Actual length of the name in characters.
        len: usize,
        /// Maximum allowed length in characters.
        max: usize,
    },
}

impl Task {
    /// Creates a new task originating at this peer.
    ///
    /// `now_ms` is stamped onto both `created_at` and `updated_at`.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NameEmpty`] if the name is empty, or
    /// [`ValidationError::NameTooLong`] if it exceeds
    /// [`MAX_TASK_NAME_LENGTH`] characters.
    pub fn new(name: &str, description: &str, now_ms: u64) -> Result<Self, ValidationError> {
        let task = Self {
            id: TaskId::new(),
            name: name.to_string(),
            description: description.to_string(),
            created_at: now_ms,
            updated_at: now_ms,
            status: TaskStatus::Todo,
        };
        task.validate()?;
        Ok(task)
    }

    /// Validates this task's name for creation.
    ///
    /// # Errors
    ///
    /// Returns [`ValidationError::NameEmpty`] or
    /// [`ValidationError::NameTooLong`] on violation.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.is_empty() {
            return Err(ValidationError::NameEmpty);
        }
        let len = self.name.chars().count();
        if len > MAX_TASK_NAME_LENGTH {
            return Err(ValidationError::NameTooLong {
                len,
                max: MAX_TASK_NAME_LENGTH,
            });
        }
        Ok(())
    }
}
