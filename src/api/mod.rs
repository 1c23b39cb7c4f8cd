//! REST boundary: the `SyncApi` seam plus the reqwest-backed client.

mod client;
mod network;
mod projects;
mod tasks;

use futures::future::BoxFuture;

use crate::{
    dto::{
        ProjectId, TaskId, UserId,
        board::Gameboard,
        project::{
            CreatePackRequest, Leaderboard, PackSummary, Project, ProjectRequest, UserProfile,
        },
        task::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest},
        ws::TaskCompleted,
    },
    error::ApiResult,
};

pub use client::ApiClient;

/// Remote API surface consumed by the sync engine.
///
/// Kept behind a trait so the engine and reconciler can be exercised against
/// scripted responses without a network.
pub trait SyncApi: Send + Sync {
    /// Authenticated user behind the configured bearer token.
    fn fetch_me(&self) -> BoxFuture<'static, ApiResult<UserProfile>>;

    /// Project detail including the equity/member list.
    fn fetch_project(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Project>>;
    /// Full task list for a project.
    fn fetch_tasks(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Vec<Task>>>;
    /// Current gameboard for a project.
    fn fetch_gameboard(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Gameboard>>;
    /// Global leaderboard.
    fn fetch_leaderboard(&self) -> BoxFuture<'static, ApiResult<Leaderboard>>;

    /// Projects the authenticated user belongs to.
    fn list_projects(&self) -> BoxFuture<'static, ApiResult<Vec<Project>>>;
    /// Create a project owned by the authenticated user.
    fn create_project(&self, request: ProjectRequest) -> BoxFuture<'static, ApiResult<Project>>;
    /// Update project fields.
    fn update_project(
        &self,
        project_id: ProjectId,
        request: ProjectRequest,
    ) -> BoxFuture<'static, ApiResult<Project>>;

    /// Create a task on a project.
    fn create_task(
        &self,
        project_id: ProjectId,
        request: CreateTaskRequest,
    ) -> BoxFuture<'static, ApiResult<Task>>;
    /// Patch task fields.
    fn update_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        request: UpdateTaskRequest,
    ) -> BoxFuture<'static, ApiResult<Task>>;
    /// Move a task to another kanban column.
    fn update_task_status(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        status: TaskStatus,
    ) -> BoxFuture<'static, ApiResult<Task>>;
    /// Complete a task, returning the refreshed task, project, and board.
    fn complete_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> BoxFuture<'static, ApiResult<TaskCompleted>>;

    /// Ask to connect with another founder.
    fn request_connection(&self, user_id: UserId) -> BoxFuture<'static, ApiResult<()>>;
    /// Accept or decline a surfaced match.
    fn respond_to_match(
        &self,
        user_id: UserId,
        accept: bool,
    ) -> BoxFuture<'static, ApiResult<()>>;

    /// Packs the authenticated user belongs to.
    fn list_packs(&self) -> BoxFuture<'static, ApiResult<Vec<PackSummary>>>;
    /// Found a new pack.
    fn create_pack(
        &self,
        request: CreatePackRequest,
    ) -> BoxFuture<'static, ApiResult<PackSummary>>;
}
