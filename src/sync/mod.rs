//! Shared synchronization state: the project session, the delta log, and the
//! effect fan-out consumed by an embedding UI.

pub mod engine;
pub mod local;
pub mod reconciler;
pub mod session;
pub mod snapshot;
pub mod stream;
pub mod supervisor;

#[cfg(test)]
pub(crate) mod testing;

use std::sync::{
    Arc,
    atomic::{AtomicBool, Ordering},
};

use tokio::sync::{Mutex, RwLock, broadcast, watch};

use crate::dto::{
    ProjectId, TaskId, UserId,
    board::Gameboard,
    project::{BoardInvitation, Leaderboard, MatchProfile, Project},
    task::Task,
    ws::DeltaMessage,
};

pub use self::session::Session;
pub use self::stream::{DeltaLog, StreamStatus};

/// Shared handle to the synchronization core.
pub type SharedSync = Arc<SyncCore>;

/// Default capacity of the effect broadcast channel.
const EFFECT_CAPACITY: usize = 16;

/// Point-in-time view of one project: the baseline snapshot plus everything
/// the reconciler has folded into it since.
#[derive(Debug, Clone, PartialEq)]
pub struct ProjectSession {
    pub project: Project,
    pub tasks: Vec<Task>,
    pub gameboard: Gameboard,
}

/// Everything deltas can mutate, published as one value so subscribers see
/// consistent snapshots.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SyncState {
    /// The actively selected project, if any.
    pub active: Option<ProjectSession>,
    /// Index of projects the user belongs to.
    pub projects: Vec<Project>,
    /// Most recent leaderboard pushed or fetched.
    pub leaderboard: Option<Leaderboard>,
    /// Matches surfaced by the radar since sign-in.
    pub matches: Vec<MatchProfile>,
    /// Board invitations received since sign-in.
    pub invitations: Vec<BoardInvitation>,
}

/// Fire-and-forget notification emitted when a delta has an observable side
/// effect beyond the data merge.
#[derive(Debug, Clone, PartialEq)]
pub enum SyncEffect {
    /// A task finished; the UI plays the celebration animation.
    Celebrate { task_id: TaskId },
    /// The user was invited onto another board; the UI navigates there.
    OpenBoard { project_id: ProjectId },
    /// The radar surfaced a new match.
    MatchFound { user_id: UserId },
}

/// Broadcast hub fanning effects out to every subscriber.
pub struct EffectHub {
    sender: broadcast::Sender<SyncEffect>,
}

impl EffectHub {
    fn new(capacity: usize) -> Self {
        let (sender, _receiver) = broadcast::channel(capacity);
        Self { sender }
    }

    /// Register a new subscriber that will receive subsequent effects.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEffect> {
        self.sender.subscribe()
    }

    /// Send an effect to all current subscribers, ignoring delivery errors.
    pub fn broadcast(&self, effect: SyncEffect) {
        let _ = self.sender.send(effect);
    }
}

/// Central synchronization state shared between the snapshot loader, the
/// delta stream, and embedding callers.
pub struct SyncCore {
    session: RwLock<Option<Session>>,
    state: watch::Sender<SyncState>,
    delta_log: Mutex<DeltaLog>,
    /// True while a snapshot load is in flight; inbound deltas are buffered
    /// in the log and applied once the snapshot is installed.
    loading: AtomicBool,
    status: watch::Sender<StreamStatus>,
    effects: EffectHub,
    last_error: RwLock<Option<String>>,
}

impl SyncCore {
    /// Construct a fresh core wrapped in an [`Arc`] so it can be cloned
    /// cheaply across tasks.
    pub fn new() -> SharedSync {
        let (state_tx, _rx) = watch::channel(SyncState::default());
        let (status_tx, _rx) = watch::channel(StreamStatus::Closed);
        Arc::new(Self {
            session: RwLock::new(None),
            state: state_tx,
            delta_log: Mutex::new(DeltaLog::default()),
            loading: AtomicBool::new(false),
            status: status_tx,
            effects: EffectHub::new(EFFECT_CAPACITY),
            last_error: RwLock::new(None),
        })
    }

    /// Currently established session, if any.
    pub async fn session(&self) -> Option<Session> {
        self.session.read().await.clone()
    }

    /// Install the session created at sign-in.
    pub async fn install_session(&self, session: Session) {
        *self.session.write().await = Some(session);
    }

    /// Drop the session and every piece of derived state.
    pub async fn clear_session(&self) {
        *self.session.write().await = None;
        self.state.send_replace(SyncState::default());
        self.delta_log.lock().await.reset();
        *self.last_error.write().await = None;
    }

    /// Subscribe to consistent snapshots of the merged state.
    pub fn state_watcher(&self) -> watch::Receiver<SyncState> {
        self.state.subscribe()
    }

    /// Clone the current merged state.
    pub fn state_view(&self) -> SyncState {
        self.state.borrow().clone()
    }

    /// Identifier of the actively selected project.
    pub fn active_project_id(&self) -> Option<ProjectId> {
        self.state
            .borrow()
            .active
            .as_ref()
            .map(|session| session.project.id.clone())
    }

    /// Subscribe to delta stream connection status changes.
    pub fn status_watcher(&self) -> watch::Receiver<StreamStatus> {
        self.status.subscribe()
    }

    pub(crate) fn set_status(&self, status: StreamStatus) {
        self.status.send_replace(status);
    }

    /// Hub used to observe reconciler side effects.
    pub fn effects(&self) -> &EffectHub {
        &self.effects
    }

    /// User-visible error retained from the last failed snapshot load.
    pub async fn last_error(&self) -> Option<String> {
        self.last_error.read().await.clone()
    }

    /// Mark a snapshot load as started; deltas buffer until it finishes.
    pub(crate) fn begin_load(&self) {
        self.loading.store(true, Ordering::SeqCst);
    }

    /// Clear the active project session wholesale.
    pub(crate) fn clear_active(&self) {
        self.state.send_modify(|state| state.active = None);
    }

    /// Install a freshly loaded snapshot as the active baseline.
    pub(crate) async fn install_snapshot(&self, session: ProjectSession) {
        self.state.send_modify(|state| state.active = Some(session));
        *self.last_error.write().await = None;
    }

    /// Retain the aggregate error string from a failed snapshot load.
    pub(crate) async fn fail_load(&self, message: String) {
        *self.last_error.write().await = Some(message);
    }

    /// Mark the load finished and fold any deltas buffered meanwhile.
    pub(crate) async fn finish_load(&self) {
        self.loading.store(false, Ordering::SeqCst);
        self.apply_pending().await;
    }

    /// Start a fresh delta log for a new connection.
    pub(crate) async fn reset_log(&self) {
        self.delta_log.lock().await.reset();
    }

    /// Append one inbound delta and fold it unless a load is in flight.
    pub async fn ingest(&self, message: DeltaMessage) {
        self.delta_log.lock().await.push(message);
        if !self.loading.load(Ordering::SeqCst) {
            self.apply_pending().await;
        }
    }

    /// Fold every unapplied log entry into the state, in arrival order.
    ///
    /// The log lock is held across the fold so two concurrent appliers
    /// cannot interleave entries out of order.
    pub(crate) async fn apply_pending(&self) {
        let mut log = self.delta_log.lock().await;
        let pending = log.take_unapplied();
        if pending.is_empty() {
            return;
        }

        let mut effects = Vec::new();
        self.state.send_modify(|state| {
            for message in &pending {
                effects.extend(reconciler::apply(state, message));
            }
        });
        drop(log);

        for effect in effects {
            self.effects.broadcast(effect);
        }
    }

    /// Replace the project index wholesale (REST refresh).
    pub(crate) fn set_projects(&self, projects: Vec<Project>) {
        self.state.send_modify(|state| state.projects = projects);
    }

    /// Replace the leaderboard wholesale (REST refresh).
    pub(crate) fn set_leaderboard(&self, leaderboard: Leaderboard) {
        self.state
            .send_modify(|state| state.leaderboard = Some(leaderboard));
    }

    /// Mutate the merged state in place.
    pub(crate) fn state_modify<F>(&self, mutate: F)
    where
        F: FnOnce(&mut SyncState),
    {
        self.state.send_modify(mutate);
    }

    /// Mutate the active session in place, if one is installed.
    pub(crate) fn with_active<F>(&self, mutate: F)
    where
        F: FnOnce(&mut ProjectSession),
    {
        self.state.send_modify(|state| {
            if let Some(active) = state.active.as_mut() {
                mutate(active);
            }
        });
    }
}
