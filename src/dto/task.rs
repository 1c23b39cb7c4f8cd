use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use validator::Validate;

use crate::dto::{ProjectId, TaskId, UserId};

/// Kanban column a task currently sits in.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TaskStatus {
    /// Not yet scheduled.
    #[default]
    Backlog,
    /// Scheduled but not started.
    Todo,
    /// In progress.
    Doing,
    /// Finished; eligible for a gameboard tile.
    Done,
}

/// Pacing tag indicating how fast a task is expected to move.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Pacing {
    /// Slow-burn work.
    Crawl,
    /// Steady progress.
    #[default]
    Walk,
    /// Sprint work.
    Run,
}

/// The unit of work tracked on a project board.
///
/// The `id` is the merge key across every mutation path: optimistic local
/// edits, REST responses, and inbound delta messages all address the same
/// task through it.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub id: TaskId,
    /// Owning project, when the server includes it in the payload.
    #[serde(default)]
    pub project_id: Option<ProjectId>,
    pub title: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub status: TaskStatus,
    /// Users assigned to the task. The backend sends `null` for unassigned
    /// tasks rather than an empty list.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub assignees: Vec<UserId>,
    /// Gamified value awarded when the task completes.
    #[serde(default)]
    pub value_score: u32,
    #[serde(default)]
    pub pacing: Pacing,
    /// Optional journey phase label the task belongs to.
    #[serde(default)]
    pub phase: Option<String>,
    /// Optional step index within the phase.
    #[serde(default)]
    pub step: Option<u32>,
}

/// Payload for creating a new task on a project.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    pub title: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    pub status: TaskStatus,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub assignees: Vec<UserId>,
    #[validate(range(max = 1000))]
    pub value_score: u32,
    pub pacing: Pacing,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub phase: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub step: Option<u32>,
}

/// Partial update applied to an existing task. Omitted fields are untouched.
#[derive(Debug, Clone, Default, Serialize, Validate)]
pub struct UpdateTaskRequest {
    #[validate(length(min = 1, max = 200))]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub assignees: Option<Vec<UserId>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value_score: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pacing: Option<Pacing>,
}
