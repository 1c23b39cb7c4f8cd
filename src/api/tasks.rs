//! Task CRUD and status transition endpoints.

use serde::Serialize;

use crate::{
    api::ApiClient,
    dto::{
        ProjectId, TaskId,
        task::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest},
        ws::TaskCompleted,
    },
    error::ApiResult,
};

#[derive(Serialize)]
struct StatusBody {
    status: TaskStatus,
}

impl ApiClient {
    pub(super) async fn get_tasks(&self, project_id: &ProjectId) -> ApiResult<Vec<Task>> {
        self.fetch_json(&format!("projects/{project_id}/tasks"))
            .await
    }

    pub(super) async fn post_task(
        &self,
        project_id: &ProjectId,
        request: &CreateTaskRequest,
    ) -> ApiResult<Task> {
        self.post_json(&format!("projects/{project_id}/tasks"), request)
            .await
    }

    pub(super) async fn patch_task(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
        request: &UpdateTaskRequest,
    ) -> ApiResult<Task> {
        self.patch_json(&format!("projects/{project_id}/tasks/{task_id}"), request)
            .await
    }

    pub(super) async fn post_task_status(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
        status: TaskStatus,
    ) -> ApiResult<Task> {
        self.post_json(
            &format!("projects/{project_id}/tasks/{task_id}/status"),
            &StatusBody { status },
        )
        .await
    }

    pub(super) async fn post_task_complete(
        &self,
        project_id: &ProjectId,
        task_id: &TaskId,
    ) -> ApiResult<TaskCompleted> {
        self.post_json(
            &format!("projects/{project_id}/tasks/{task_id}/complete"),
            &serde_json::json!({}),
        )
        .await
    }
}
