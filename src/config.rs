//! Application-level configuration: API host resolution and engine tuning.

use std::{env, fs, io::ErrorKind, path::PathBuf, time::Duration};

use serde::Deserialize;
use tracing::{info, warn};

use crate::dto::{ProjectId, UserId};

/// Default location on disk where the engine looks for the JSON theme file.
const DEFAULT_THEME_PATH: &str = "config/theme.json";
/// Environment variable that overrides [`DEFAULT_THEME_PATH`].
const THEME_PATH_ENV: &str = "WOLFPACK_THEME_PATH";
/// Environment variable overriding the API base URL.
const API_URL_ENV: &str = "WOLFPACK_API_URL";
/// Environment variable overriding the realtime database base URL.
const RTDB_URL_ENV: &str = "WOLFPACK_RTDB_URL";
/// Environment variable overriding where local state is persisted.
const STATE_PATH_ENV: &str = "WOLFPACK_STATE_PATH";
/// Hardcoded fallback host when neither theme nor environment configure one.
const DEFAULT_API_URL: &str = "https://api.wolfpack.app";
/// Fallback realtime database host for the chat layer.
const DEFAULT_RTDB_URL: &str = "https://wolfpack-den.firebaseio.com";
/// Deadline for session initialization.
const DEFAULT_AUTH_TIMEOUT: Duration = Duration::from_secs(5);

#[derive(Debug, Clone)]
/// Immutable runtime configuration shared across the engine.
pub struct AppConfig {
    /// Base URL of the REST API, no trailing slash.
    pub api_base_url: String,
    /// Base URL of the realtime database, no trailing slash.
    pub realtime_db_url: String,
    /// How long session initialization may run before it is cancelled.
    pub auth_timeout: Duration,
    /// Where the persisted local state file lives.
    pub local_state_path: PathBuf,
}

impl AppConfig {
    /// Resolve configuration from the theme file, then the environment, then
    /// built-in defaults. A malformed or missing theme file never aborts
    /// startup; it degrades to the next source with a logged warning.
    pub fn load() -> Self {
        let theme = load_theme();
        let api_base_url = theme
            .as_ref()
            .and_then(|theme| theme.api_base_url.clone())
            .or_else(|| env_non_empty(API_URL_ENV))
            .unwrap_or_else(|| DEFAULT_API_URL.to_string());
        let realtime_db_url = theme
            .as_ref()
            .and_then(|theme| theme.realtime_db_url.clone())
            .or_else(|| env_non_empty(RTDB_URL_ENV))
            .unwrap_or_else(|| DEFAULT_RTDB_URL.to_string());
        let local_state_path = env_non_empty(STATE_PATH_ENV)
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from(".wolfpack/state.json"));

        Self {
            api_base_url: api_base_url.trim_end_matches('/').to_string(),
            realtime_db_url: realtime_db_url.trim_end_matches('/').to_string(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            local_state_path,
        }
    }

    /// WebSocket endpoint for the delta stream, keyed by user and project.
    pub fn ws_url(&self, user_id: &UserId, project_id: Option<&ProjectId>) -> String {
        let base = ws_base_from_api(&self.api_base_url);
        match project_id {
            Some(project_id) => format!("{base}/ws?user_id={user_id}&project_id={project_id}"),
            None => format!("{base}/ws?user_id={user_id}"),
        }
    }
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_URL.to_string(),
            realtime_db_url: DEFAULT_RTDB_URL.to_string(),
            auth_timeout: DEFAULT_AUTH_TIMEOUT,
            local_state_path: PathBuf::from(".wolfpack/state.json"),
        }
    }
}

/// Swap the HTTP scheme for the matching WebSocket scheme.
fn ws_base_from_api(api_base_url: &str) -> String {
    if let Some(rest) = api_base_url.strip_prefix("https://") {
        format!("wss://{rest}")
    } else if let Some(rest) = api_base_url.strip_prefix("http://") {
        format!("ws://{rest}")
    } else {
        format!("wss://{api_base_url}")
    }
}

#[derive(Debug, Deserialize)]
/// JSON representation of the theme file shipped alongside deployments.
struct RawTheme {
    #[serde(default)]
    api_base_url: Option<String>,
    #[serde(default)]
    realtime_db_url: Option<String>,
}

fn load_theme() -> Option<RawTheme> {
    let path = env::var_os(THEME_PATH_ENV)
        .map(PathBuf::from)
        .filter(|path| !path.as_os_str().is_empty())
        .unwrap_or_else(|| PathBuf::from(DEFAULT_THEME_PATH));

    match fs::read_to_string(&path) {
        Ok(contents) => match serde_json::from_str::<RawTheme>(&contents) {
            Ok(theme) => {
                info!(path = %path.display(), "loaded theme configuration");
                Some(theme)
            }
            Err(err) => {
                warn!(
                    path = %path.display(),
                    error = %err,
                    "failed to parse theme file; falling back to environment"
                );
                None
            }
        },
        Err(err) if err.kind() == ErrorKind::NotFound => None,
        Err(err) => {
            warn!(
                path = %path.display(),
                error = %err,
                "failed to read theme file; falling back to environment"
            );
            None
        }
    }
}

fn env_non_empty(key: &str) -> Option<String> {
    env::var(key).ok().filter(|value| !value.is_empty())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ws_base_swaps_scheme() {
        assert_eq!(ws_base_from_api("https://api.example.com"), "wss://api.example.com");
        assert_eq!(ws_base_from_api("http://localhost:8000"), "ws://localhost:8000");
    }

    #[test]
    fn ws_url_includes_project_key_when_present() {
        let config = AppConfig {
            api_base_url: "https://api.example.com".into(),
            ..AppConfig::default()
        };
        assert_eq!(
            config.ws_url(&"u1".to_string(), Some(&"p1".to_string())),
            "wss://api.example.com/ws?user_id=u1&project_id=p1"
        );
        assert_eq!(
            config.ws_url(&"u1".to_string(), None),
            "wss://api.example.com/ws?user_id=u1"
        );
    }

    #[test]
    fn theme_file_tolerates_partial_keys() {
        let theme: RawTheme = serde_json::from_str(r#"{"api_base_url":"https://x"}"#).unwrap();
        assert_eq!(theme.api_base_url.as_deref(), Some("https://x"));
        assert!(theme.realtime_db_url.is_none());
    }
}
