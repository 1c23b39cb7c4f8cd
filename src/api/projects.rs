//! Project, gameboard, and leaderboard endpoints.

use crate::{
    api::ApiClient,
    dto::{
        ProjectId,
        board::Gameboard,
        project::{Leaderboard, Project, ProjectRequest, UserProfile},
    },
    error::ApiResult,
};

impl ApiClient {
    pub(super) async fn get_me(&self) -> ApiResult<UserProfile> {
        self.fetch_json("users/me").await
    }

    pub(super) async fn get_projects(&self) -> ApiResult<Vec<Project>> {
        self.fetch_json("projects").await
    }

    pub(super) async fn get_project(&self, project_id: &ProjectId) -> ApiResult<Project> {
        self.fetch_json(&format!("projects/{project_id}")).await
    }

    pub(super) async fn post_project(&self, request: &ProjectRequest) -> ApiResult<Project> {
        self.post_json("projects", request).await
    }

    pub(super) async fn patch_project(
        &self,
        project_id: &ProjectId,
        request: &ProjectRequest,
    ) -> ApiResult<Project> {
        self.patch_json(&format!("projects/{project_id}"), request)
            .await
    }

    pub(super) async fn get_gameboard(&self, project_id: &ProjectId) -> ApiResult<Gameboard> {
        self.fetch_json(&format!("projects/{project_id}/gameboard"))
            .await
    }

    pub(super) async fn get_leaderboard(&self) -> ApiResult<Leaderboard> {
        self.fetch_json("leaderboard").await
    }
}
