use serde::{Deserialize, Serialize};

use crate::dto::{
    ProjectId, UserId,
    board::Gameboard,
    project::{BoardInvitation, EquityMember, Leaderboard, MatchProfile, Project},
    task::Task,
};

/// Typed delta pushed over the WebSocket stream.
///
/// Every frame is a `{type, data}` object, optionally tagged with the
/// project it concerns. Payloads are self-contained: they carry the full
/// updated entity, never a partial patch. Unrecognised types parse to
/// [`DeltaMessage::Unknown`] so a newer backend cannot wedge the stream.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum DeltaMessage {
    #[serde(rename = "project_created")]
    ProjectCreated {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: Project,
    },
    #[serde(rename = "project_updated")]
    ProjectUpdated {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: Project,
    },
    #[serde(rename = "member_added")]
    MemberAdded {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: EquityMember,
    },
    #[serde(rename = "member_removed")]
    MemberRemoved {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: MemberRemoved,
    },
    #[serde(rename = "task_created")]
    TaskCreated {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: Task,
    },
    #[serde(rename = "task_updated")]
    TaskUpdated {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: Task,
    },
    #[serde(rename = "task_status_updated")]
    TaskStatusUpdated {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: Task,
    },
    #[serde(rename = "task_completed")]
    TaskCompleted {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: TaskCompleted,
    },
    #[serde(rename = "new_match")]
    NewMatch {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: MatchProfile,
    },
    #[serde(rename = "new_board_invitation")]
    NewBoardInvitation {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: BoardInvitation,
    },
    #[serde(rename = "leaderboard_updated")]
    LeaderboardUpdated {
        #[serde(default)]
        project_id: Option<ProjectId>,
        data: Leaderboard,
    },
    #[serde(other)]
    Unknown,
}

/// Payload of a `member_removed` delta.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MemberRemoved {
    pub user_id: UserId,
}

/// Payload of a `task_completed` delta: the finished task plus the refreshed
/// project and gameboard it affected.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TaskCompleted {
    pub task: Task,
    #[serde(default)]
    pub project: Option<Project>,
    #[serde(default)]
    pub gameboard: Option<Gameboard>,
}

impl DeltaMessage {
    /// Parse one inbound frame.
    pub fn from_json_str(raw: &str) -> serde_json::Result<Self> {
        serde_json::from_str(raw)
    }

    /// Wire name of the message type, for logging.
    pub fn kind(&self) -> &'static str {
        match self {
            Self::ProjectCreated { .. } => "project_created",
            Self::ProjectUpdated { .. } => "project_updated",
            Self::MemberAdded { .. } => "member_added",
            Self::MemberRemoved { .. } => "member_removed",
            Self::TaskCreated { .. } => "task_created",
            Self::TaskUpdated { .. } => "task_updated",
            Self::TaskStatusUpdated { .. } => "task_status_updated",
            Self::TaskCompleted { .. } => "task_completed",
            Self::NewMatch { .. } => "new_match",
            Self::NewBoardInvitation { .. } => "new_board_invitation",
            Self::LeaderboardUpdated { .. } => "leaderboard_updated",
            Self::Unknown => "unknown",
        }
    }

    /// Project the message is scoped to, when it carries one.
    ///
    /// The envelope tag wins; task payloads that embed their own project id
    /// are used as a fallback so untagged frames can still be filtered.
    pub fn scope(&self) -> Option<&ProjectId> {
        let envelope = match self {
            Self::ProjectCreated { project_id, .. }
            | Self::ProjectUpdated { project_id, .. }
            | Self::MemberAdded { project_id, .. }
            | Self::MemberRemoved { project_id, .. }
            | Self::TaskCreated { project_id, .. }
            | Self::TaskUpdated { project_id, .. }
            | Self::TaskStatusUpdated { project_id, .. }
            | Self::TaskCompleted { project_id, .. }
            | Self::NewMatch { project_id, .. }
            | Self::NewBoardInvitation { project_id, .. }
            | Self::LeaderboardUpdated { project_id, .. } => project_id.as_ref(),
            Self::Unknown => None,
        };

        envelope.or_else(|| match self {
            Self::TaskCreated { data, .. }
            | Self::TaskUpdated { data, .. }
            | Self::TaskStatusUpdated { data, .. } => data.project_id.as_ref(),
            Self::TaskCompleted { data, .. } => data
                .task
                .project_id
                .as_ref()
                .or_else(|| data.project.as_ref().map(|project| &project.id)),
            _ => None,
        })
    }
}
