//! Connection/match and pack endpoints.

use serde::Serialize;

use crate::{
    api::ApiClient,
    dto::{
        UserId,
        project::{CreatePackRequest, PackSummary},
    },
    error::ApiResult,
};

#[derive(Serialize)]
struct MatchResponseBody {
    accept: bool,
}

impl ApiClient {
    pub(super) async fn post_connection_request(&self, user_id: &UserId) -> ApiResult<()> {
        self.post_no_content(
            &format!("connections/{user_id}/request"),
            &serde_json::json!({}),
        )
        .await
    }

    pub(super) async fn post_match_response(
        &self,
        user_id: &UserId,
        accept: bool,
    ) -> ApiResult<()> {
        self.post_no_content(
            &format!("matches/{user_id}/respond"),
            &MatchResponseBody { accept },
        )
        .await
    }

    pub(super) async fn get_packs(&self) -> ApiResult<Vec<PackSummary>> {
        self.fetch_json("packs").await
    }

    pub(super) async fn post_pack(&self, request: &CreatePackRequest) -> ApiResult<PackSummary> {
        self.post_json("packs", request).await
    }
}
