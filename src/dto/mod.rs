//! Wire types shared by the REST, WebSocket, and realtime-database boundaries.

pub mod board;
pub mod chat;
pub mod project;
pub mod task;
pub mod ws;

/// Server-owned opaque identifier for a project.
pub type ProjectId = String;
/// Server-owned opaque identifier for a task.
pub type TaskId = String;
/// Server-owned opaque identifier for a user.
pub type UserId = String;
