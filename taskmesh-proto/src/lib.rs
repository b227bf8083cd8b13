//! Shared protocol definitions for the `TaskMesh` wire format.

pub mod codec;
pub mod message;
pub mod task;
pub mod topic;
