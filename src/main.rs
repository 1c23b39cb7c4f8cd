//! Wolfpack sync binary: wires config, session, the delta stream, and chat,
//! then tails merged state and effects until shutdown.

use std::{env, sync::Arc};

use anyhow::Context;
use tokio::sync::{broadcast, watch};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use wolfpack_sync::{
    api::ApiClient,
    chat::{ChatRegistry, ChatTarget, RestRealtimeDb},
    config::AppConfig,
    dto::chat::ChatMessage,
    sync::{SyncEffect, engine::SyncEngine, local::LocalStore, stream::WsConnector},
};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_tracing();

    let config = AppConfig::load();
    let store = LocalStore::new(config.local_state_path.clone());
    let mut local = store.load();
    if let Ok(token) = env::var("WOLFPACK_TOKEN") {
        if !token.is_empty() {
            local.token = Some(token);
        }
    }

    let api = ApiClient::new(
        &config.api_base_url,
        local.token.as_deref().unwrap_or_default(),
    )
    .context("building API client")?;
    let connector = WsConnector::new(config.clone());
    let engine = Arc::new(SyncEngine::new(Arc::new(api), Arc::new(connector)));

    let session = engine
        .init(&local, config.auth_timeout)
        .await
        .context("establishing session")?;
    info!(user_id = %session.user.id, "signed in");

    tokio::spawn(log_effects(engine.core().effects().subscribe()));

    if let Ok(project_id) = env::var("WOLFPACK_PROJECT_ID") {
        if !project_id.is_empty() {
            match engine.select_project(Some(project_id.clone())).await {
                Ok(()) => info!(%project_id, "project selected"),
                Err(err) => warn!(%project_id, error = %err, "initial project load failed"),
            }
        }
    }

    let chats = open_chat_registry(&config, local.token.as_deref()).await;

    shutdown_signal().await;
    if let Some(chats) = chats {
        chats.close_all().await;
    }
    engine.shutdown().await;

    Ok(())
}

/// Build the chat registry and, when a pack is configured, tail its channel.
async fn open_chat_registry(
    config: &AppConfig,
    token: Option<&str>,
) -> Option<Arc<ChatRegistry>> {
    let db = match RestRealtimeDb::new(&config.realtime_db_url, token) {
        Ok(db) => db,
        Err(err) => {
            warn!(error = %err, "chat layer unavailable");
            return None;
        }
    };
    let chats = Arc::new(ChatRegistry::new(Arc::new(db)));

    if let Ok(pack_id) = env::var("WOLFPACK_PACK_ID") {
        if !pack_id.is_empty() {
            let channel = chats.open(ChatTarget::Pack { pack_id }).await;
            tokio::spawn(log_chat(channel.messages_watcher()));
        }
    }

    Some(chats)
}

/// Tail reconciler side effects so they are visible in the logs.
async fn log_effects(mut effects: broadcast::Receiver<SyncEffect>) {
    loop {
        match effects.recv().await {
            Ok(SyncEffect::Celebrate { task_id }) => {
                info!(%task_id, "task completed; time to howl");
            }
            Ok(SyncEffect::OpenBoard { project_id }) => {
                info!(%project_id, "invited onto a board");
            }
            Ok(SyncEffect::MatchFound { user_id }) => {
                info!(%user_id, "new match surfaced");
            }
            Err(broadcast::error::RecvError::Lagged(missed)) => {
                warn!(missed, "effect stream lagged");
            }
            Err(broadcast::error::RecvError::Closed) => break,
        }
    }
}

/// Log the newest chat message whenever the list changes.
async fn log_chat(mut messages: watch::Receiver<Vec<ChatMessage>>) {
    while messages.changed().await.is_ok() {
        let newest = messages.borrow_and_update().last().cloned();
        if let Some(message) = newest {
            info!(from = %message.sender_name, text = %message.text, "chat");
        }
    }
}

/// Configure tracing subscribers so logs include spans by default.
fn init_tracing() {
    let env_filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| "info".into());
    tracing_subscriber::registry()
        .with(env_filter)
        .with(tracing_subscriber::fmt::layer())
        .init();
}

/// Wait for Ctrl+C or SIGTERM and shut the engine down gracefully.
async fn shutdown_signal() {
    #[cfg(unix)]
    {
        use tokio::signal::unix::{SignalKind, signal};

        let mut term = match signal(SignalKind::terminate()) {
            Ok(term) => term,
            Err(err) => {
                warn!(error = %err, "failed to install SIGTERM handler");
                let _ = tokio::signal::ctrl_c().await;
                return;
            }
        };
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {},
            _ = term.recv() => {},
        }
    }

    #[cfg(not(unix))]
    {
        let _ = tokio::signal::ctrl_c().await;
    }
}
