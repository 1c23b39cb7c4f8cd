//! The authenticated session: identity plus bearer credential.

use std::{sync::Arc, time::Duration};

use tokio::time::timeout;
use tracing::info;

use crate::{
    api::SyncApi,
    dto::project::UserProfile,
    error::AuthError,
    sync::local::LocalState,
};

/// Authenticated identity and the credential used on both the REST and
/// WebSocket boundaries. Created at sign-in, destroyed at teardown.
#[derive(Debug, Clone)]
pub struct Session {
    pub user: UserProfile,
    /// Bearer token; empty for a local stand-in session.
    pub token: String,
}

impl Session {
    /// Establish a session, bounded by `deadline`.
    ///
    /// A configured bearer token is validated against the API; without one
    /// the locally persisted stand-in user is used as the identity. Hitting
    /// the deadline cancels the in-flight work and yields
    /// [`AuthError::TimedOut`], which is distinguishable from every success
    /// shape, including an empty one.
    pub async fn establish(
        api: Arc<dyn SyncApi>,
        local: &LocalState,
        deadline: Duration,
    ) -> Result<Self, AuthError> {
        match timeout(deadline, Self::resolve(api, local)).await {
            Ok(result) => result,
            Err(_) => Err(AuthError::TimedOut { timeout: deadline }),
        }
    }

    async fn resolve(api: Arc<dyn SyncApi>, local: &LocalState) -> Result<Self, AuthError> {
        if let Some(token) = local.token.clone().filter(|token| !token.is_empty()) {
            let user = api
                .fetch_me()
                .await
                .map_err(|source| AuthError::Validation { source })?;
            info!(user_id = %user.id, "session established");
            return Ok(Self { user, token });
        }

        if let Some(user) = local.local_user.clone() {
            info!(user_id = %user.id, "using local stand-in identity");
            return Ok(Self {
                user,
                token: String::new(),
            });
        }

        Err(AuthError::MissingCredentials)
    }
}
