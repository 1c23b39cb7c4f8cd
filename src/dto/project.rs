use serde::{Deserialize, Serialize};
use serde_with::{DefaultOnNull, serde_as};
use validator::Validate;

use crate::dto::{ProjectId, UserId};

/// Core project record plus its equity/member list.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Project {
    pub id: ProjectId,
    pub name: String,
    #[serde(default)]
    pub description: Option<String>,
    #[serde(default)]
    pub owner_id: Option<UserId>,
    /// Equity split across the founding members.
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub members: Vec<EquityMember>,
}

/// One member's stake in a project.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EquityMember {
    pub user_id: UserId,
    pub display_name: String,
    /// Percentage share, 0..=100.
    #[serde(default)]
    pub equity_pct: f32,
    #[serde(default)]
    pub role: Option<String>,
}

/// Payload for creating or renaming a project.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct ProjectRequest {
    #[validate(length(min = 1, max = 120))]
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
}

/// The authenticated user as reported by the API.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    pub id: UserId,
    pub display_name: String,
    #[serde(default)]
    pub email: Option<String>,
}

/// One row of the gamified leaderboard.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LeaderboardEntry {
    pub user_id: UserId,
    pub display_name: String,
    pub score: i64,
}

/// Full leaderboard as returned by the API and pushed over the stream.
#[serde_as]
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Leaderboard {
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub entries: Vec<LeaderboardEntry>,
}

/// Candidate surfaced by the radar matchmaking screen.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MatchProfile {
    pub user_id: UserId,
    pub display_name: String,
    /// Match strength in 0..=1 when the server scores it.
    #[serde(default)]
    pub compatibility: Option<f32>,
    #[serde(default)]
    pub headline: Option<String>,
}

/// Invitation to join another project's board.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct BoardInvitation {
    /// The project the recipient is being invited into.
    pub project_id: ProjectId,
    #[serde(default)]
    pub project_name: Option<String>,
    #[serde(default)]
    pub invited_by: Option<UserId>,
}

/// A user-formed group with its own chat channel.
#[serde_as]
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PackSummary {
    pub id: String,
    pub name: String,
    #[serde_as(as = "DefaultOnNull")]
    #[serde(default)]
    pub member_ids: Vec<UserId>,
}

/// Payload for founding a new pack.
#[derive(Debug, Clone, Serialize, Validate)]
pub struct CreatePackRequest {
    #[validate(length(min = 1, max = 80))]
    pub name: String,
}
