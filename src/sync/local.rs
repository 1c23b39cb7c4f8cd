//! Persisted local state: bearer token, stand-in user record, tour flag.

use std::{fs, io, path::PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::dto::project::UserProfile;

/// Contents of the local state file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct LocalState {
    /// Bearer credential for the REST and WebSocket boundaries.
    #[serde(default)]
    pub token: Option<String>,
    /// Stand-in identity used when no real identity provider is configured.
    #[serde(default)]
    pub local_user: Option<UserProfile>,
    /// Whether the onboarding tour has been shown.
    #[serde(default)]
    pub tour_seen: bool,
}

/// JSON-file-backed store for [`LocalState`].
///
/// Missing or malformed files degrade to the default state with a logged
/// warning; reads never fail.
pub struct LocalStore {
    path: PathBuf,
}

impl LocalStore {
    /// Store persisting to `path`.
    pub fn new(path: PathBuf) -> Self {
        Self { path }
    }

    /// Read the persisted state, falling back to defaults.
    pub fn load(&self) -> LocalState {
        match fs::read_to_string(&self.path) {
            Ok(contents) => match serde_json::from_str(&contents) {
                Ok(state) => state,
                Err(err) => {
                    warn!(
                        path = %self.path.display(),
                        error = %err,
                        "failed to parse local state; starting fresh"
                    );
                    LocalState::default()
                }
            },
            Err(err) if err.kind() == io::ErrorKind::NotFound => LocalState::default(),
            Err(err) => {
                warn!(
                    path = %self.path.display(),
                    error = %err,
                    "failed to read local state; starting fresh"
                );
                LocalState::default()
            }
        }
    }

    /// Persist `state`, creating parent directories as needed.
    pub fn save(&self, state: &LocalState) -> io::Result<()> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(state)
            .map_err(|err| io::Error::new(io::ErrorKind::InvalidData, err))?;
        fs::write(&self.path, contents)
    }

    /// Persist a new bearer token, keeping the rest of the state.
    pub fn store_token(&self, token: &str) -> io::Result<()> {
        let mut state = self.load();
        state.token = Some(token.to_string());
        self.save(&state)
    }

    /// Record that the onboarding tour has been shown.
    pub fn mark_tour_seen(&self) -> io::Result<()> {
        let mut state = self.load();
        state.tour_seen = true;
        self.save(&state)
    }
}
