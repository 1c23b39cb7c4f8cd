use std::sync::Arc;

use futures::future::BoxFuture;
use reqwest::{Client, Method, RequestBuilder, Response, StatusCode};
use serde::{Serialize, de::DeserializeOwned};

use crate::{
    api::SyncApi,
    dto::{
        ProjectId, TaskId, UserId,
        board::Gameboard,
        project::{
            CreatePackRequest, Leaderboard, PackSummary, Project, ProjectRequest, UserProfile,
        },
        task::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest},
        ws::TaskCompleted,
    },
    error::{ApiError, ApiResult},
};

/// Bearer-authenticated JSON client for the Wolfpack REST API.
#[derive(Clone)]
pub struct ApiClient {
    client: Client,
    base_url: Arc<str>,
    token: Arc<str>,
}

impl ApiClient {
    /// Build a client against `base_url` using `token` for every request.
    pub fn new(base_url: &str, token: &str) -> ApiResult<Self> {
        let client = Client::builder()
            .build()
            .map_err(|source| ApiError::ClientBuilder { source })?;

        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            token: Arc::from(token),
        })
    }

    fn request(&self, method: Method, path: &str) -> RequestBuilder {
        let url = format!("{}/{}", self.base_url, path);
        self.client
            .request(method, url)
            .bearer_auth(self.token.as_ref())
    }

    async fn get_json<T>(&self, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        let response = self
            .request(Method::GET, path)
            .send()
            .await
            .map_err(|source| ApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;
        decode_json(path, check(response).await?).await
    }

    async fn send_json<B, T>(&self, method: Method, path: &str, body: &B) -> ApiResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;
        decode_json(path, check(response).await?).await
    }

    async fn send_no_content<B>(&self, method: Method, path: &str, body: &B) -> ApiResult<()>
    where
        B: ?Sized + Serialize,
    {
        let response = self
            .request(method, path)
            .json(body)
            .send()
            .await
            .map_err(|source| ApiError::RequestSend {
                path: path.to_string(),
                source,
            })?;
        check(response).await.map(drop)
    }

    pub(super) async fn fetch_json<T>(&self, path: &str) -> ApiResult<T>
    where
        T: DeserializeOwned,
    {
        self.get_json(path).await
    }

    pub(super) async fn post_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        self.send_json(Method::POST, path, body).await
    }

    pub(super) async fn patch_json<B, T>(&self, path: &str, body: &B) -> ApiResult<T>
    where
        B: ?Sized + Serialize,
        T: DeserializeOwned,
    {
        self.send_json(Method::PATCH, path, body).await
    }

    pub(super) async fn post_no_content<B>(&self, path: &str, body: &B) -> ApiResult<()>
    where
        B: ?Sized + Serialize,
    {
        self.send_no_content(Method::POST, path, body).await
    }
}

/// Surface a non-2xx response as the backend's error contract.
async fn check(response: Response) -> ApiResult<Response> {
    let status = response.status();
    if status.is_success() {
        return Ok(response);
    }

    let body = response.text().await.unwrap_or_default();
    Err(rejection(status, &body))
}

async fn decode_json<T>(path: &str, response: Response) -> ApiResult<T>
where
    T: DeserializeOwned,
{
    response
        .json::<T>()
        .await
        .map_err(|source| ApiError::DecodeResponse {
            path: path.to_string(),
            source,
        })
}

/// Map a rejected response to its user-facing message: the `detail` field of
/// the JSON body when present (stringified if it is an object), otherwise a
/// generic `API error: <status>` string.
fn rejection(status: StatusCode, body: &str) -> ApiError {
    let detail = serde_json::from_str::<serde_json::Value>(body)
        .ok()
        .and_then(|value| value.get("detail").cloned());

    let message = match detail {
        Some(serde_json::Value::String(text)) => text,
        Some(serde_json::Value::Null) | None => format!("API error: {}", status.as_u16()),
        Some(other) => other.to_string(),
    };

    ApiError::Rejected { status, message }
}

impl SyncApi for ApiClient {
    fn fetch_me(&self) -> BoxFuture<'static, ApiResult<UserProfile>> {
        let client = self.clone();
        Box::pin(async move { client.get_me().await })
    }

    fn fetch_project(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Project>> {
        let client = self.clone();
        Box::pin(async move { client.get_project(&project_id).await })
    }

    fn fetch_tasks(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Vec<Task>>> {
        let client = self.clone();
        Box::pin(async move { client.get_tasks(&project_id).await })
    }

    fn fetch_gameboard(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Gameboard>> {
        let client = self.clone();
        Box::pin(async move { client.get_gameboard(&project_id).await })
    }

    fn fetch_leaderboard(&self) -> BoxFuture<'static, ApiResult<Leaderboard>> {
        let client = self.clone();
        Box::pin(async move { client.get_leaderboard().await })
    }

    fn list_projects(&self) -> BoxFuture<'static, ApiResult<Vec<Project>>> {
        let client = self.clone();
        Box::pin(async move { client.get_projects().await })
    }

    fn create_project(&self, request: ProjectRequest) -> BoxFuture<'static, ApiResult<Project>> {
        let client = self.clone();
        Box::pin(async move { client.post_project(&request).await })
    }

    fn update_project(
        &self,
        project_id: ProjectId,
        request: ProjectRequest,
    ) -> BoxFuture<'static, ApiResult<Project>> {
        let client = self.clone();
        Box::pin(async move { client.patch_project(&project_id, &request).await })
    }

    fn create_task(
        &self,
        project_id: ProjectId,
        request: CreateTaskRequest,
    ) -> BoxFuture<'static, ApiResult<Task>> {
        let client = self.clone();
        Box::pin(async move { client.post_task(&project_id, &request).await })
    }

    fn update_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        request: UpdateTaskRequest,
    ) -> BoxFuture<'static, ApiResult<Task>> {
        let client = self.clone();
        Box::pin(async move { client.patch_task(&project_id, &task_id, &request).await })
    }

    fn update_task_status(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        status: TaskStatus,
    ) -> BoxFuture<'static, ApiResult<Task>> {
        let client = self.clone();
        Box::pin(async move { client.post_task_status(&project_id, &task_id, status).await })
    }

    fn complete_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> BoxFuture<'static, ApiResult<TaskCompleted>> {
        let client = self.clone();
        Box::pin(async move { client.post_task_complete(&project_id, &task_id).await })
    }

    fn request_connection(&self, user_id: UserId) -> BoxFuture<'static, ApiResult<()>> {
        let client = self.clone();
        Box::pin(async move { client.post_connection_request(&user_id).await })
    }

    fn respond_to_match(
        &self,
        user_id: UserId,
        accept: bool,
    ) -> BoxFuture<'static, ApiResult<()>> {
        let client = self.clone();
        Box::pin(async move { client.post_match_response(&user_id, accept).await })
    }

    fn list_packs(&self) -> BoxFuture<'static, ApiResult<Vec<PackSummary>>> {
        let client = self.clone();
        Box::pin(async move { client.get_packs().await })
    }

    fn create_pack(
        &self,
        request: CreatePackRequest,
    ) -> BoxFuture<'static, ApiResult<PackSummary>> {
        let client = self.clone();
        Box::pin(async move { client.post_pack(&request).await })
    }
}
