//! `TaskMesh`: serverless replicated task list over a topic mesh.

pub mod config;
pub mod engine;
pub mod mesh;
pub mod net;
pub mod replica;
pub mod session;
