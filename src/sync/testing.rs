//! Scripted doubles for the API and transport seams, shared across the
//! sync test modules.

use std::{
    collections::HashMap,
    sync::{
        Arc,
        Mutex as StdMutex,
        atomic::{AtomicBool, AtomicUsize, Ordering},
    },
};

use futures::future::BoxFuture;
use reqwest::StatusCode;
use tokio::sync::{Notify, mpsc};

use crate::{
    api::SyncApi,
    dto::{
        ProjectId, TaskId, UserId,
        board::{Gameboard, Tile},
        project::{
            CreatePackRequest, Leaderboard, PackSummary, Project, ProjectRequest, UserProfile,
        },
        task::{CreateTaskRequest, Task, TaskStatus, UpdateTaskRequest},
        ws::TaskCompleted,
    },
    error::{ApiError, ApiResult, StreamError},
    sync::stream::{ConnectionKey, Connector, StreamTransport},
};

/// Minimal project fixture.
pub(crate) fn project(id: &str) -> Project {
    Project {
        id: id.to_string(),
        name: format!("project {id}"),
        description: None,
        owner_id: Some("u1".into()),
        members: Vec::new(),
    }
}

/// Minimal task fixture.
pub(crate) fn task(id: &str, title: &str) -> Task {
    Task {
        id: id.to_string(),
        project_id: None,
        title: title.to_string(),
        description: None,
        status: TaskStatus::Todo,
        assignees: Vec::new(),
        value_score: 0,
        pacing: Default::default(),
        phase: None,
        step: None,
    }
}

#[derive(Default)]
struct MockApiInner {
    projects: StdMutex<HashMap<ProjectId, Project>>,
    tasks: StdMutex<HashMap<ProjectId, Vec<Task>>>,
    boards: StdMutex<HashMap<ProjectId, Gameboard>>,
    task_fetch_error: StdMutex<Option<String>>,
    task_create_error: StdMutex<Option<String>>,
    stall_profile: AtomicBool,
    project_fetches: AtomicUsize,
    task_counter: AtomicUsize,
    create_gate: StdMutex<Option<Arc<Notify>>>,
}

/// Scripted [`SyncApi`] backed by in-memory maps.
#[derive(Clone, Default)]
pub(crate) struct MockApi {
    inner: Arc<MockApiInner>,
}

impl MockApi {
    pub fn new() -> Self {
        Self::default()
    }

    /// Install a project with its tasks and an empty board.
    pub fn seed_project(&self, project: Project, tasks: Vec<Task>) {
        let id = project.id.clone();
        self.inner.projects.lock().unwrap().insert(id.clone(), project);
        self.inner.tasks.lock().unwrap().insert(id.clone(), tasks);
        self.inner.boards.lock().unwrap().insert(id, Gameboard::empty());
    }

    /// Make every task list fetch fail with `message`.
    pub fn fail_task_fetches(&self, message: &str) {
        *self.inner.task_fetch_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make every task creation fail with `message`.
    pub fn fail_task_creates(&self, message: &str) {
        *self.inner.task_create_error.lock().unwrap() = Some(message.to_string());
    }

    /// Make profile fetches hang forever.
    pub fn stall_profile_fetches(&self) {
        self.inner.stall_profile.store(true, Ordering::SeqCst);
    }

    /// Hold task creation responses until the returned handle is notified.
    pub fn gate_task_creates(&self) -> Arc<Notify> {
        let gate = Arc::new(Notify::new());
        *self.inner.create_gate.lock().unwrap() = Some(gate.clone());
        gate
    }

    /// How many project detail fetches have been served.
    pub fn project_fetches(&self) -> usize {
        self.inner.project_fetches.load(Ordering::SeqCst)
    }

    fn not_found(what: &str) -> ApiError {
        ApiError::Rejected {
            status: StatusCode::NOT_FOUND,
            message: format!("{what} not found"),
        }
    }

    fn profile() -> UserProfile {
        UserProfile {
            id: "u1".into(),
            display_name: "Alpha Wolf".into(),
            email: None,
        }
    }
}

fn ready<T: Send + 'static>(result: ApiResult<T>) -> BoxFuture<'static, ApiResult<T>> {
    Box::pin(async move { result })
}

impl SyncApi for MockApi {
    fn fetch_me(&self) -> BoxFuture<'static, ApiResult<UserProfile>> {
        if self.inner.stall_profile.load(Ordering::SeqCst) {
            return Box::pin(std::future::pending());
        }
        ready(Ok(Self::profile()))
    }

    fn fetch_project(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Project>> {
        self.inner.project_fetches.fetch_add(1, Ordering::SeqCst);
        let result = self
            .inner
            .projects
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .ok_or_else(|| Self::not_found("project"));
        ready(result)
    }

    fn fetch_tasks(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Vec<Task>>> {
        if let Some(message) = self.inner.task_fetch_error.lock().unwrap().clone() {
            return ready(Err(ApiError::Rejected {
                status: StatusCode::SERVICE_UNAVAILABLE,
                message,
            }));
        }
        let tasks = self
            .inner
            .tasks
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .unwrap_or_default();
        ready(Ok(tasks))
    }

    fn fetch_gameboard(&self, project_id: ProjectId) -> BoxFuture<'static, ApiResult<Gameboard>> {
        let board = self
            .inner
            .boards
            .lock()
            .unwrap()
            .get(&project_id)
            .cloned()
            .unwrap_or_default();
        ready(Ok(board))
    }

    fn fetch_leaderboard(&self) -> BoxFuture<'static, ApiResult<Leaderboard>> {
        ready(Ok(Leaderboard::default()))
    }

    fn list_projects(&self) -> BoxFuture<'static, ApiResult<Vec<Project>>> {
        let projects = self.inner.projects.lock().unwrap().values().cloned().collect();
        ready(Ok(projects))
    }

    fn create_project(&self, request: ProjectRequest) -> BoxFuture<'static, ApiResult<Project>> {
        let created = Project {
            id: format!("p-{}", self.inner.projects.lock().unwrap().len() + 1),
            name: request.name,
            description: request.description,
            owner_id: Some("u1".into()),
            members: Vec::new(),
        };
        self.inner
            .projects
            .lock()
            .unwrap()
            .insert(created.id.clone(), created.clone());
        ready(Ok(created))
    }

    fn update_project(
        &self,
        project_id: ProjectId,
        request: ProjectRequest,
    ) -> BoxFuture<'static, ApiResult<Project>> {
        let mut projects = self.inner.projects.lock().unwrap();
        let result = match projects.get_mut(&project_id) {
            Some(existing) => {
                existing.name = request.name;
                existing.description = request.description;
                Ok(existing.clone())
            }
            None => Err(Self::not_found("project")),
        };
        ready(result)
    }

    fn create_task(
        &self,
        project_id: ProjectId,
        request: CreateTaskRequest,
    ) -> BoxFuture<'static, ApiResult<Task>> {
        if let Some(message) = self.inner.task_create_error.lock().unwrap().clone() {
            return ready(Err(ApiError::Rejected {
                status: StatusCode::UNPROCESSABLE_ENTITY,
                message,
            }));
        }
        let number = self.inner.task_counter.fetch_add(1, Ordering::SeqCst) + 1;
        let created = Task {
            id: format!("srv-{number}"),
            project_id: Some(project_id.clone()),
            title: request.title,
            description: request.description,
            status: request.status,
            assignees: request.assignees,
            value_score: request.value_score,
            pacing: request.pacing,
            phase: request.phase,
            step: request.step,
        };
        self.inner
            .tasks
            .lock()
            .unwrap()
            .entry(project_id)
            .or_default()
            .push(created.clone());

        let gate = self.inner.create_gate.lock().unwrap().clone();
        Box::pin(async move {
            if let Some(gate) = gate {
                gate.notified().await;
            }
            Ok(created)
        })
    }

    fn update_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        request: UpdateTaskRequest,
    ) -> BoxFuture<'static, ApiResult<Task>> {
        let mut tasks = self.inner.tasks.lock().unwrap();
        let result = tasks
            .get_mut(&project_id)
            .and_then(|tasks| tasks.iter_mut().find(|task| task.id == task_id))
            .map(|task| {
                if let Some(title) = request.title {
                    task.title = title;
                }
                if let Some(description) = request.description {
                    task.description = Some(description);
                }
                if let Some(status) = request.status {
                    task.status = status;
                }
                if let Some(assignees) = request.assignees {
                    task.assignees = assignees;
                }
                if let Some(value_score) = request.value_score {
                    task.value_score = value_score;
                }
                if let Some(pacing) = request.pacing {
                    task.pacing = pacing;
                }
                task.clone()
            })
            .ok_or_else(|| Self::not_found("task"));
        ready(result)
    }

    fn update_task_status(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
        status: TaskStatus,
    ) -> BoxFuture<'static, ApiResult<Task>> {
        let mut tasks = self.inner.tasks.lock().unwrap();
        let result = tasks
            .get_mut(&project_id)
            .and_then(|tasks| tasks.iter_mut().find(|task| task.id == task_id))
            .map(|task| {
                task.status = status;
                task.clone()
            })
            .ok_or_else(|| Self::not_found("task"));
        ready(result)
    }

    fn complete_task(
        &self,
        project_id: ProjectId,
        task_id: TaskId,
    ) -> BoxFuture<'static, ApiResult<TaskCompleted>> {
        let mut tasks = self.inner.tasks.lock().unwrap();
        let Some(task) = tasks
            .get_mut(&project_id)
            .and_then(|tasks| tasks.iter_mut().find(|task| task.id == task_id))
        else {
            return ready(Err(Self::not_found("task")));
        };
        task.status = TaskStatus::Done;
        let task = task.clone();
        drop(tasks);

        let mut boards = self.inner.boards.lock().unwrap();
        let board = boards.entry(project_id.clone()).or_default();
        if let Some(slot) = board.tiles.iter_mut().find(|slot| slot.is_none()) {
            *slot = Some(Tile {
                task_id: task.id.clone(),
                title: Some(task.title.clone()),
                value_score: task.value_score,
            });
        }
        let payload = TaskCompleted {
            task,
            project: self.inner.projects.lock().unwrap().get(&project_id).cloned(),
            gameboard: Some(board.clone()),
        };
        ready(Ok(payload))
    }

    fn request_connection(&self, _user_id: UserId) -> BoxFuture<'static, ApiResult<()>> {
        ready(Ok(()))
    }

    fn respond_to_match(
        &self,
        _user_id: UserId,
        _accept: bool,
    ) -> BoxFuture<'static, ApiResult<()>> {
        ready(Ok(()))
    }

    fn list_packs(&self) -> BoxFuture<'static, ApiResult<Vec<PackSummary>>> {
        ready(Ok(Vec::new()))
    }

    fn create_pack(
        &self,
        request: CreatePackRequest,
    ) -> BoxFuture<'static, ApiResult<PackSummary>> {
        ready(Ok(PackSummary {
            id: "pack-1".into(),
            name: request.name,
            member_ids: vec!["u1".into()],
        }))
    }
}

/// Scripted transport fed through an unbounded channel.
pub(crate) struct ScriptedTransport {
    incoming: mpsc::UnboundedReceiver<Result<String, StreamError>>,
    pub closes: Arc<AtomicUsize>,
    pub sent: Arc<StdMutex<Vec<String>>>,
}

impl ScriptedTransport {
    /// Transport plus the sender used to feed it inbound frames. Dropping
    /// the sender reads as a server-side close.
    pub fn channel() -> (Self, mpsc::UnboundedSender<Result<String, StreamError>>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (
            Self {
                incoming: rx,
                closes: Arc::new(AtomicUsize::new(0)),
                sent: Arc::new(StdMutex::new(Vec::new())),
            },
            tx,
        )
    }
}

impl StreamTransport for ScriptedTransport {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), StreamError>> {
        self.sent.lock().unwrap().push(text);
        Box::pin(async { Ok(()) })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, StreamError>>> {
        Box::pin(async move { self.incoming.recv().await })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), StreamError>> {
        self.closes.fetch_add(1, Ordering::SeqCst);
        Box::pin(async { Ok(()) })
    }
}

/// One opened mock connection, observable from the test body.
pub(crate) struct MockConnection {
    pub key: ConnectionKey,
    pub feed: Option<mpsc::UnboundedSender<Result<String, StreamError>>>,
    pub closes: Arc<AtomicUsize>,
    pub sent: Arc<StdMutex<Vec<String>>>,
}

#[derive(Default)]
struct MockConnectorInner {
    connections: StdMutex<Vec<MockConnection>>,
    refuse: AtomicBool,
}

/// Connector handing out [`ScriptedTransport`]s and recording every open.
#[derive(Clone, Default)]
pub(crate) struct MockConnector {
    inner: Arc<MockConnectorInner>,
}

impl MockConnector {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every connection attempt fail.
    pub fn refuse_connections(&self) {
        self.inner.refuse.store(true, Ordering::SeqCst);
    }

    /// Number of transports handed out so far.
    pub fn connect_count(&self) -> usize {
        self.inner.connections.lock().unwrap().len()
    }

    /// Key the `index`-th connection was opened with.
    pub fn key_of(&self, index: usize) -> ConnectionKey {
        self.inner.connections.lock().unwrap()[index].key.clone()
    }

    /// Push an inbound frame onto the `index`-th connection.
    pub fn feed_frame(&self, index: usize, frame: &str) {
        let connections = self.inner.connections.lock().unwrap();
        let feed = connections[index]
            .feed
            .as_ref()
            .expect("connection already dropped");
        feed.send(Ok(frame.to_string())).expect("transport gone");
    }

    /// Simulate the server dropping the `index`-th connection.
    pub fn drop_connection(&self, index: usize) {
        self.inner.connections.lock().unwrap()[index].feed.take();
    }

    /// Frames the `index`-th transport has sent outbound.
    pub fn sent_of(&self, index: usize) -> Vec<String> {
        self.inner.connections.lock().unwrap()[index]
            .sent
            .lock()
            .unwrap()
            .clone()
    }

    /// How many times the `index`-th transport was closed.
    pub fn close_count(&self, index: usize) -> usize {
        self.inner.connections.lock().unwrap()[index]
            .closes
            .load(Ordering::SeqCst)
    }
}

impl Connector for MockConnector {
    fn connect(
        &self,
        key: &ConnectionKey,
    ) -> BoxFuture<'static, Result<Box<dyn StreamTransport>, StreamError>> {
        if self.inner.refuse.load(Ordering::SeqCst) {
            return Box::pin(async { Err(StreamError::Connect("refused".into())) });
        }

        let (transport, feed) = ScriptedTransport::channel();
        self.inner.connections.lock().unwrap().push(MockConnection {
            key: key.clone(),
            feed: Some(feed),
            closes: transport.closes.clone(),
            sent: transport.sent.clone(),
        });
        Box::pin(async move { Ok(Box::new(transport) as Box<dyn StreamTransport>) })
    }
}
