//! Loads the authoritative REST snapshot for a project.

use std::sync::Arc;

use futures::future::try_join3;

use crate::{
    api::SyncApi,
    dto::ProjectId,
    error::SyncError,
    sync::ProjectSession,
};

/// Fetches the three-call baseline (project detail, task list, gameboard)
/// installed whenever a project is selected.
#[derive(Clone)]
pub struct SnapshotLoader {
    api: Arc<dyn SyncApi>,
}

impl SnapshotLoader {
    /// Loader issuing calls through `api`.
    pub fn new(api: Arc<dyn SyncApi>) -> Self {
        Self { api }
    }

    /// Fetch the full baseline for `project_id`.
    ///
    /// The three calls run concurrently and all must succeed; any rejection
    /// fails the load as a whole with a single aggregate error. Callers
    /// cannot tell which call failed.
    pub async fn load(&self, project_id: &ProjectId) -> Result<ProjectSession, SyncError> {
        let (project, tasks, gameboard) = try_join3(
            self.api.fetch_project(project_id.clone()),
            self.api.fetch_tasks(project_id.clone()),
            self.api.fetch_gameboard(project_id.clone()),
        )
        .await
        .map_err(|err| SyncError::Snapshot(err.to_string()))?;

        Ok(ProjectSession {
            project,
            tasks,
            gameboard,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::sync::testing::{MockApi, project, task};

    #[tokio::test]
    async fn load_installs_all_three_pieces() {
        let api = MockApi::new();
        api.seed_project(project("p1"), vec![task("t1", "one")]);

        let loader = SnapshotLoader::new(Arc::new(api));
        let session = loader.load(&"p1".to_string()).await.unwrap();

        assert_eq!(session.project.id, "p1");
        assert_eq!(session.tasks.len(), 1);
        assert_eq!(session.gameboard.tiles.len(), 40);
    }

    #[tokio::test]
    async fn any_rejection_fails_the_whole_load() {
        let api = MockApi::new();
        api.seed_project(project("p1"), Vec::new());
        api.fail_task_fetches("board is resting");

        let loader = SnapshotLoader::new(Arc::new(api));
        let err = loader.load(&"p1".to_string()).await.unwrap_err();

        match err {
            SyncError::Snapshot(message) => assert!(message.contains("board is resting")),
            other => panic!("expected snapshot error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_project_fails_the_load() {
        let api = MockApi::new();
        let loader = SnapshotLoader::new(Arc::new(api));
        assert!(loader.load(&"ghost".to_string()).await.is_err());
    }
}
