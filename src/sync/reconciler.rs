//! Folds delta messages into locally held snapshot state.
//!
//! Two merge strategies, chosen by message type: `*_updated`/`*_completed`
//! payloads replace the matching entity wholesale (and are a no-op when no
//! entity matches), `*_created` payloads append unconditionally. Every
//! message carrying a project scope is checked against the active project
//! before anything is touched.

use crate::{
    dto::{
        project::Project,
        task::Task,
        ws::{DeltaMessage, TaskCompleted},
    },
    sync::{SyncEffect, SyncState},
};

/// Fold one message into `state`, returning the observable side effects the
/// caller must emit.
pub fn apply(state: &mut SyncState, message: &DeltaMessage) -> Vec<SyncEffect> {
    if let Some(scope) = message.scope() {
        let matches_active = state
            .active
            .as_ref()
            .is_some_and(|active| active.project.id == *scope);
        if !matches_active {
            return Vec::new();
        }
    }

    let mut effects = Vec::new();
    match message {
        DeltaMessage::ProjectCreated { data, .. } => {
            state.projects.push(data.clone());
        }
        DeltaMessage::ProjectUpdated { data, .. } => {
            replace_project(&mut state.projects, data);
            if let Some(active) = state.active.as_mut() {
                if active.project.id == data.id {
                    active.project = data.clone();
                }
            }
        }
        DeltaMessage::MemberAdded { data, .. } => {
            if let Some(active) = state.active.as_mut() {
                active.project.members.push(data.clone());
            }
        }
        DeltaMessage::MemberRemoved { data, .. } => {
            if let Some(active) = state.active.as_mut() {
                active
                    .project
                    .members
                    .retain(|member| member.user_id != data.user_id);
            }
        }
        DeltaMessage::TaskCreated { data, .. } => {
            if let Some(active) = state.active.as_mut() {
                active.tasks.push(data.clone());
            }
        }
        DeltaMessage::TaskUpdated { data, .. }
        | DeltaMessage::TaskStatusUpdated { data, .. } => {
            if let Some(active) = state.active.as_mut() {
                replace_task(&mut active.tasks, data);
            }
        }
        DeltaMessage::TaskCompleted { data, .. } => {
            apply_completion(state, data);
            effects.push(SyncEffect::Celebrate {
                task_id: data.task.id.clone(),
            });
        }
        DeltaMessage::NewMatch { data, .. } => {
            state.matches.push(data.clone());
            effects.push(SyncEffect::MatchFound {
                user_id: data.user_id.clone(),
            });
        }
        DeltaMessage::NewBoardInvitation { data, .. } => {
            state.invitations.push(data.clone());
            effects.push(SyncEffect::OpenBoard {
                project_id: data.project_id.clone(),
            });
        }
        DeltaMessage::LeaderboardUpdated { data, .. } => {
            state.leaderboard = Some(data.clone());
        }
        DeltaMessage::Unknown => {}
    }

    effects
}

/// Replace the task with a matching id wholesale; no match is a no-op.
fn replace_task(tasks: &mut [Task], incoming: &Task) {
    for slot in tasks.iter_mut().filter(|task| task.id == incoming.id) {
        *slot = incoming.clone();
    }
}

/// Replace the project with a matching id wholesale; no match is a no-op.
fn replace_project(projects: &mut [Project], incoming: &Project) {
    for slot in projects.iter_mut().filter(|project| project.id == incoming.id) {
        *slot = incoming.clone();
    }
}

/// Completion payloads carry the full refreshed task, project, and board.
fn apply_completion(state: &mut SyncState, data: &TaskCompleted) {
    if let Some(project) = data.project.as_ref() {
        replace_project(&mut state.projects, project);
    }
    if let Some(active) = state.active.as_mut() {
        replace_task(&mut active.tasks, &data.task);
        if let Some(project) = data.project.as_ref() {
            if active.project.id == project.id {
                active.project = project.clone();
            }
        }
        if let Some(gameboard) = data.gameboard.as_ref() {
            active.gameboard = gameboard.clone();
        }
    }
}
