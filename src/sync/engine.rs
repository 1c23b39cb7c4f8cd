//! The sync engine: owns the session, the active project, and the delta
//! stream, and exposes the mutation operations the UI calls.

use std::{sync::Arc, time::Duration};

use tokio::{
    sync::{Mutex, mpsc},
    task::JoinHandle,
};
use tracing::{error, info};
use uuid::Uuid;
use validator::Validate;

use crate::{
    api::SyncApi,
    dto::{
        ProjectId, TaskId, UserId,
        project::{CreatePackRequest, Leaderboard, PackSummary, Project, ProjectRequest},
        task::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest},
        ws::TaskCompleted,
    },
    error::{AuthError, SyncError},
    sync::{
        SharedSync, SyncCore,
        local::LocalState,
        session::Session,
        snapshot::SnapshotLoader,
        stream::{ConnectionKey, Connector, StreamStatus},
        supervisor,
    },
};

struct StreamTask {
    outbound_tx: mpsc::UnboundedSender<String>,
    handle: JoinHandle<()>,
}

/// Top-level handle owning the whole synchronization stack.
///
/// Construction wires the pieces together; [`SyncEngine::init`] establishes
/// the session and opens the stream; [`SyncEngine::shutdown`] tears
/// everything down. Nothing here lives in module-level state.
pub struct SyncEngine {
    core: SharedSync,
    api: Arc<dyn SyncApi>,
    connector: Arc<dyn Connector>,
    loader: SnapshotLoader,
    stream: Mutex<Option<StreamTask>>,
}

impl SyncEngine {
    /// Assemble an engine over the given API and transport implementations.
    pub fn new(api: Arc<dyn SyncApi>, connector: Arc<dyn Connector>) -> Self {
        Self {
            core: SyncCore::new(),
            api: api.clone(),
            connector,
            loader: SnapshotLoader::new(api),
            stream: Mutex::new(None),
        }
    }

    /// Shared state handle for watchers and effect subscriptions.
    pub fn core(&self) -> SharedSync {
        self.core.clone()
    }

    /// Establish the session and open the user-keyed delta stream.
    pub async fn init(
        &self,
        local: &LocalState,
        auth_timeout: Duration,
    ) -> Result<Session, AuthError> {
        let session = Session::establish(self.api.clone(), local, auth_timeout).await?;
        self.core.install_session(session.clone()).await;
        self.restart_stream(None).await;
        Ok(session)
    }

    /// Tear down the stream and drop all session state.
    pub async fn shutdown(&self) {
        self.stop_stream().await;
        self.core.clear_session().await;
        info!("sync engine shut down");
    }

    /// Switch the active project.
    ///
    /// The existing connection is closed and a new one opened under the new
    /// key; deltas arriving while the snapshot loads are buffered and folded
    /// afterwards. Selecting `None` clears all project state. Switching back
    /// to a previously loaded project re-fetches from scratch.
    pub async fn select_project(&self, project_id: Option<ProjectId>) -> Result<(), SyncError> {
        self.core.begin_load();
        self.core.clear_active();
        self.restart_stream(project_id.clone()).await;

        let result = match project_id {
            None => Ok(()),
            Some(project_id) => match self.loader.load(&project_id).await {
                Ok(session) => {
                    self.core.install_snapshot(session).await;
                    Ok(())
                }
                Err(err) => {
                    self.core.fail_load(err.to_string()).await;
                    Err(err)
                }
            },
        };

        self.core.finish_load().await;
        result
    }

    /// Push an arbitrary JSON message onto the stream.
    ///
    /// When the connection is not open the message is dropped with a logged
    /// error; callers get no delivery feedback.
    pub async fn send(&self, message: serde_json::Value) {
        let status = *self.core.status_watcher().borrow();
        if status != StreamStatus::Open {
            error!(?status, "cannot send: delta stream is not open");
            return;
        }
        let stream = self.stream.lock().await;
        match stream.as_ref() {
            Some(task) => {
                if task.outbound_tx.send(message.to_string()).is_err() {
                    error!("cannot send: delta stream writer is gone");
                }
            }
            None => error!("cannot send: no delta stream"),
        }
    }

    async fn restart_stream(&self, project_id: Option<ProjectId>) {
        self.stop_stream().await;

        let Some(session) = self.core.session().await else {
            return;
        };

        let key = ConnectionKey {
            user_id: session.user.id,
            project_id,
        };
        self.core.reset_log().await;

        let (outbound_tx, outbound_rx) = mpsc::unbounded_channel();
        let handle = tokio::spawn(supervisor::run(
            self.core.clone(),
            self.api.clone(),
            self.connector.clone(),
            key,
            outbound_rx,
        ));
        *self.stream.lock().await = Some(StreamTask {
            outbound_tx,
            handle,
        });
    }

    async fn stop_stream(&self) {
        let Some(StreamTask {
            outbound_tx,
            handle,
        }) = self.stream.lock().await.take()
        else {
            return;
        };
        drop(outbound_tx);
        let _ = handle.await;
    }

    fn active_project(&self) -> Result<ProjectId, SyncError> {
        self.core.active_project_id().ok_or(SyncError::NoProject)
    }

    /// True when `project_id` is still the active selection; responses that
    /// land after a switch must not touch the wrong project's state.
    fn still_active(&self, project_id: &ProjectId) -> bool {
        self.core.active_project_id().as_ref() == Some(project_id)
    }

    /// Refresh the project index from the API.
    pub async fn refresh_projects(&self) -> Result<Vec<Project>, SyncError> {
        let projects = self.api.list_projects().await?;
        self.core.set_projects(projects.clone());
        Ok(projects)
    }

    /// Refresh the leaderboard from the API.
    pub async fn refresh_leaderboard(&self) -> Result<Leaderboard, SyncError> {
        let leaderboard = self.api.fetch_leaderboard().await?;
        self.core.set_leaderboard(leaderboard.clone());
        Ok(leaderboard)
    }

    /// Create a project and append it to the index.
    pub async fn create_project(&self, request: ProjectRequest) -> Result<Project, SyncError> {
        request.validate()?;
        let project = self.api.create_project(request).await?;
        let appended = project.clone();
        self.core
            .state_modify(move |state| state.projects.push(appended));
        Ok(project)
    }

    /// Update project fields, folding the response in if still relevant.
    pub async fn update_project(
        &self,
        project_id: ProjectId,
        request: ProjectRequest,
    ) -> Result<Project, SyncError> {
        request.validate()?;
        let project = self
            .api
            .update_project(project_id.clone(), request)
            .await?;
        if self.still_active(&project_id) {
            let confirmed = project.clone();
            self.core.with_active(move |active| active.project = confirmed);
        }
        Ok(project)
    }

    /// Create a task with an optimistic local placeholder.
    ///
    /// The placeholder is swapped for the server entity when the response
    /// lands, or rolled back if the call fails, and only while this project
    /// is still the active selection.
    pub async fn create_task(&self, request: CreateTaskRequest) -> Result<Task, SyncError> {
        request.validate()?;
        let project_id = self.active_project()?;

        let placeholder_id = format!("local-{}", Uuid::new_v4());
        let placeholder = Task {
            id: placeholder_id.clone(),
            project_id: Some(project_id.clone()),
            title: request.title.clone(),
            description: request.description.clone(),
            status: request.status,
            assignees: request.assignees.clone(),
            value_score: request.value_score,
            pacing: request.pacing,
            phase: request.phase.clone(),
            step: request.step,
        };
        self.core
            .with_active(move |active| active.tasks.push(placeholder));

        match self.api.create_task(project_id.clone(), request).await {
            Ok(confirmed) => {
                if self.still_active(&project_id) {
                    let installed = confirmed.clone();
                    self.core.with_active(move |active| {
                        if let Some(slot) = active
                            .tasks
                            .iter_mut()
                            .find(|task| task.id == placeholder_id)
                        {
                            *slot = installed;
                        } else if let Some(slot) = active
                            .tasks
                            .iter_mut()
                            .find(|task| task.id == installed.id)
                        {
                            *slot = installed;
                        } else {
                            active.tasks.push(installed);
                        }
                    });
                }
                Ok(confirmed)
            }
            Err(err) => {
                if self.still_active(&project_id) {
                    self.core.with_active(move |active| {
                        active.tasks.retain(|task| task.id != placeholder_id);
                    });
                }
                Err(err.into())
            }
        }
    }

    /// Patch task fields, folding the response in if still relevant.
    pub async fn update_task(
        &self,
        task_id: TaskId,
        request: UpdateTaskRequest,
    ) -> Result<Task, SyncError> {
        request.validate()?;
        let project_id = self.active_project()?;
        let confirmed = self
            .api
            .update_task(project_id.clone(), task_id, request)
            .await?;
        if self.still_active(&project_id) {
            let installed = confirmed.clone();
            self.core.with_active(move |active| {
                if let Some(slot) = active.tasks.iter_mut().find(|task| task.id == installed.id) {
                    *slot = installed;
                }
            });
        }
        Ok(confirmed)
    }

    /// Move a task to another column, optimistically.
    ///
    /// The local task flips immediately; a rejected call restores the
    /// remembered state, and the server entity replaces it on success.
    pub async fn update_task_status(
        &self,
        task_id: TaskId,
        status: TaskStatus,
    ) -> Result<Task, SyncError> {
        let project_id = self.active_project()?;

        let mut remembered: Option<Task> = None;
        self.core.with_active(|active| {
            if let Some(task) = active.tasks.iter_mut().find(|task| task.id == task_id) {
                remembered = Some(task.clone());
                task.status = status;
            }
        });

        match self
            .api
            .update_task_status(project_id.clone(), task_id, status)
            .await
        {
            Ok(confirmed) => {
                if self.still_active(&project_id) {
                    let installed = confirmed.clone();
                    self.core.with_active(move |active| {
                        if let Some(slot) =
                            active.tasks.iter_mut().find(|task| task.id == installed.id)
                        {
                            *slot = installed;
                        }
                    });
                }
                Ok(confirmed)
            }
            Err(err) => {
                if let Some(previous) = remembered {
                    if self.still_active(&project_id) {
                        self.core.with_active(move |active| {
                            if let Some(slot) =
                                active.tasks.iter_mut().find(|task| task.id == previous.id)
                            {
                                *slot = previous;
                            }
                        });
                    }
                }
                Err(err.into())
            }
        }
    }

    /// Complete a task and fold the returned task/project/board in.
    pub async fn complete_task(&self, task_id: TaskId) -> Result<TaskCompleted, SyncError> {
        let project_id = self.active_project()?;
        let payload = self
            .api
            .complete_task(project_id.clone(), task_id)
            .await?;
        if self.still_active(&project_id) {
            let installed = payload.clone();
            self.core.with_active(move |active| {
                if let Some(slot) = active
                    .tasks
                    .iter_mut()
                    .find(|task| task.id == installed.task.id)
                {
                    *slot = installed.task.clone();
                }
                if let Some(project) = installed.project {
                    active.project = project;
                }
                if let Some(gameboard) = installed.gameboard {
                    active.gameboard = gameboard;
                }
            });
        }
        Ok(payload)
    }

    /// Ask to connect with another founder.
    pub async fn request_connection(&self, user_id: UserId) -> Result<(), SyncError> {
        self.api.request_connection(user_id).await.map_err(Into::into)
    }

    /// Accept or decline a surfaced match.
    pub async fn respond_to_match(&self, user_id: UserId, accept: bool) -> Result<(), SyncError> {
        self.api
            .respond_to_match(user_id, accept)
            .await
            .map_err(Into::into)
    }

    /// Packs the user belongs to.
    pub async fn list_packs(&self) -> Result<Vec<PackSummary>, SyncError> {
        self.api.list_packs().await.map_err(Into::into)
    }

    /// Found a new pack.
    pub async fn create_pack(&self, request: CreatePackRequest) -> Result<PackSummary, SyncError> {
        request.validate()?;
        self.api.create_pack(request).await.map_err(Into::into)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::dto::task::Pacing;
    use crate::sync::testing::{MockApi, MockConnector, project, task};

    async fn engine_with(api: &Arc<MockApi>, connector: &Arc<MockConnector>) -> SyncEngine {
        let engine = SyncEngine::new(
            api.clone() as Arc<dyn SyncApi>,
            connector.clone() as Arc<dyn Connector>,
        );
        let local = LocalState {
            token: Some("tok".into()),
            ..LocalState::default()
        };
        engine.init(&local, Duration::from_secs(5)).await.unwrap();
        engine
    }

    fn create_request(title: &str) -> CreateTaskRequest {
        CreateTaskRequest {
            title: title.into(),
            description: None,
            status: TaskStatus::Backlog,
            assignees: Vec::new(),
            value_score: 10,
            pacing: Pacing::Walk,
            phase: None,
            step: None,
        }
    }

    #[tokio::test]
    async fn changing_the_project_key_rekeys_one_connection() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;

        let mut status = engine.core().status_watcher();
        status
            .wait_for(|status| *status == StreamStatus::Open)
            .await
            .unwrap();
        assert_eq!(connector.connect_count(), 1);
        assert_eq!(connector.key_of(0).project_id, None);

        engine.select_project(Some("p1".into())).await.unwrap();
        status
            .wait_for(|status| *status == StreamStatus::Open)
            .await
            .unwrap();

        // Exactly one close of the old transport, one new open, never two
        // concurrent connections.
        assert_eq!(connector.close_count(0), 1);
        assert_eq!(connector.connect_count(), 2);
        assert_eq!(connector.key_of(1).project_id.as_deref(), Some("p1"));
    }

    #[tokio::test]
    async fn empty_project_fills_its_first_tile_end_to_end() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("P"), Vec::new());
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;

        engine.select_project(Some("P".into())).await.unwrap();
        let mut state = engine.core().state_watcher();
        assert!(state.borrow().active.as_ref().unwrap().tasks.is_empty());

        let mut status = engine.core().status_watcher();
        status
            .wait_for(|status| *status == StreamStatus::Open)
            .await
            .unwrap();
        connector.feed_frame(
            1,
            r#"{"type":"task_created","project_id":"P","data":{"id":"t1","title":"Ideation","status":"backlog"}}"#,
        );
        state
            .wait_for(|state| {
                state
                    .active
                    .as_ref()
                    .is_some_and(|active| active.tasks.len() == 1)
            })
            .await
            .unwrap();

        connector.feed_frame(
            1,
            r#"{
                "type": "task_completed",
                "data": {
                    "task": {"id": "t1", "title": "Ideation", "status": "done", "project_id": "P"},
                    "project": {"id": "P", "name": "project P"},
                    "gameboard": {"tiles": [{"task_id": "t1", "value_score": 10}]}
                }
            }"#,
        );
        state
            .wait_for(|state| {
                state.active.as_ref().is_some_and(|active| {
                    active.tasks[0].status == TaskStatus::Done
                        && active.gameboard.tiles[0].is_some()
                })
            })
            .await
            .unwrap();
    }

    #[tokio::test]
    async fn optimistic_create_swaps_placeholder_for_server_task() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;
        engine.select_project(Some("p1".into())).await.unwrap();

        let confirmed = engine.create_task(create_request("Ship it")).await.unwrap();

        let state = engine.core().state_view();
        let tasks = &state.active.unwrap().tasks;
        assert_eq!(tasks.len(), 1);
        assert_eq!(tasks[0].id, confirmed.id);
        assert!(!tasks[0].id.starts_with("local-"));
    }

    #[tokio::test]
    async fn failed_create_rolls_the_placeholder_back() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        api.fail_task_creates("title rejected");
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;
        engine.select_project(Some("p1".into())).await.unwrap();

        let err = engine.create_task(create_request("Nope")).await.unwrap_err();
        assert!(err.to_string().contains("title rejected"));

        let state = engine.core().state_view();
        assert!(state.active.unwrap().tasks.is_empty());
    }

    #[tokio::test]
    async fn late_create_response_cannot_touch_another_project() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        api.seed_project(project("p2"), Vec::new());
        let gate = api.gate_task_creates();
        let connector = Arc::new(MockConnector::new());
        let engine = Arc::new(SyncEngine::new(
            api.clone() as Arc<dyn SyncApi>,
            connector.clone() as Arc<dyn Connector>,
        ));
        let local = LocalState {
            token: Some("tok".into()),
            ..LocalState::default()
        };
        engine.init(&local, Duration::from_secs(5)).await.unwrap();
        engine.select_project(Some("p1".into())).await.unwrap();

        let create_engine = engine.clone();
        let pending =
            tokio::spawn(async move { create_engine.create_task(create_request("Slow")).await });

        // Switch projects while the response is held back.
        engine.select_project(Some("p2".into())).await.unwrap();
        gate.notify_one();
        pending.await.unwrap().unwrap();

        // The stale response must not leak into the new project's state.
        let state = engine.core().state_view();
        let active = state.active.unwrap();
        assert_eq!(active.project.id, "p2");
        assert!(active.tasks.is_empty());
    }

    #[tokio::test]
    async fn rejected_status_change_restores_the_previous_column() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), vec![task("t1", "one")]);
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;
        engine.select_project(Some("p1".into())).await.unwrap();

        let mut status = engine.core().status_watcher();
        status
            .wait_for(|status| *status == StreamStatus::Open)
            .await
            .unwrap();

        // A task the backend does not know about: the optimistic flip must
        // be rolled back when the call is rejected.
        connector.feed_frame(
            1,
            r#"{"type":"task_created","project_id":"p1","data":{"id":"ghost","title":"G","status":"todo"}}"#,
        );
        let mut state = engine.core().state_watcher();
        state
            .wait_for(|state| {
                state
                    .active
                    .as_ref()
                    .is_some_and(|active| active.tasks.len() == 2)
            })
            .await
            .unwrap();

        let err = engine
            .update_task_status("ghost".into(), TaskStatus::Doing)
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not found"));

        let state = engine.core().state_view();
        let active = state.active.unwrap();
        let ghost = active.tasks.iter().find(|task| task.id == "ghost").unwrap();
        assert_eq!(ghost.status, TaskStatus::Todo);
    }

    #[tokio::test]
    async fn selecting_none_clears_project_state() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), vec![task("t1", "one")]);
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;

        engine.select_project(Some("p1".into())).await.unwrap();
        assert!(engine.core().state_view().active.is_some());

        engine.select_project(None).await.unwrap();
        assert!(engine.core().state_view().active.is_none());
        assert!(engine.core().last_error().await.is_none());
    }

    #[tokio::test]
    async fn failed_snapshot_retains_a_user_visible_error() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        api.fail_task_fetches("den is closed");
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;

        let err = engine.select_project(Some("p1".into())).await.unwrap_err();
        assert!(matches!(err, SyncError::Snapshot(_)));

        let retained = engine.core().last_error().await.unwrap();
        assert!(retained.contains("den is closed"));
        assert!(engine.core().state_view().active.is_none());
    }

    #[tokio::test]
    async fn completing_a_task_fills_the_board_from_the_response() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), vec![task("t1", "one")]);
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;
        engine.select_project(Some("p1".into())).await.unwrap();

        let payload = engine.complete_task("t1".into()).await.unwrap();
        assert_eq!(payload.task.status, TaskStatus::Done);

        let state = engine.core().state_view();
        let active = state.active.unwrap();
        assert_eq!(active.tasks[0].status, TaskStatus::Done);
        assert_eq!(active.gameboard.fill_count(), 1);
    }

    #[tokio::test]
    async fn project_rename_folds_into_active_state() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;
        engine.select_project(Some("p1".into())).await.unwrap();

        engine
            .update_project(
                "p1".into(),
                ProjectRequest {
                    name: "Renamed".into(),
                    description: None,
                },
            )
            .await
            .unwrap();

        let state = engine.core().state_view();
        assert_eq!(state.active.unwrap().project.name, "Renamed");
    }

    #[tokio::test]
    async fn task_patch_replaces_the_local_entity() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), vec![task("t1", "one")]);
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;
        engine.select_project(Some("p1".into())).await.unwrap();

        let updated = engine
            .update_task(
                "t1".into(),
                UpdateTaskRequest {
                    title: Some("Sharper title".into()),
                    ..UpdateTaskRequest::default()
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.title, "Sharper title");

        let state = engine.core().state_view();
        assert_eq!(state.active.unwrap().tasks[0].title, "Sharper title");
    }

    #[tokio::test]
    async fn network_and_pack_operations_round_trip() {
        let api = Arc::new(MockApi::new());
        api.seed_project(project("p1"), Vec::new());
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;

        let projects = engine.refresh_projects().await.unwrap();
        assert_eq!(projects.len(), 1);
        assert_eq!(engine.core().state_view().projects.len(), 1);

        engine.refresh_leaderboard().await.unwrap();
        assert!(engine.core().state_view().leaderboard.is_some());

        let created = engine
            .create_project(ProjectRequest {
                name: "Side quest".into(),
                description: None,
            })
            .await
            .unwrap();
        assert!(
            engine
                .core()
                .state_view()
                .projects
                .iter()
                .any(|project| project.id == created.id)
        );

        engine.request_connection("u9".into()).await.unwrap();
        engine.respond_to_match("u9".into(), true).await.unwrap();

        let pack = engine
            .create_pack(CreatePackRequest {
                name: "Night Howlers".into(),
            })
            .await
            .unwrap();
        assert_eq!(pack.member_ids, vec!["u1".to_string()]);
        assert!(engine.list_packs().await.unwrap().is_empty());
    }

    #[tokio::test]
    async fn outbound_sends_reach_the_open_transport() {
        let api = Arc::new(MockApi::new());
        let connector = Arc::new(MockConnector::new());
        let engine = engine_with(&api, &connector).await;

        let mut status = engine.core().status_watcher();
        status
            .wait_for(|status| *status == StreamStatus::Open)
            .await
            .unwrap();

        engine.send(serde_json::json!({"type": "presence"})).await;
        // Sends while closed are dropped without feedback; this one was
        // queued while open and must land on the transport.
        tokio::time::timeout(Duration::from_secs(1), async {
            while connector.sent_of(0).is_empty() {
                tokio::task::yield_now().await;
            }
        })
        .await
        .unwrap();
        assert!(connector.sent_of(0)[0].contains("presence"));
    }
}
