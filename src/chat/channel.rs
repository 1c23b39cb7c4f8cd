//! One live chat channel: subscription lifecycle and message sending.

use std::{sync::Arc, time::Duration};

use futures::StreamExt;
use serde_json::Value;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::sleep,
};
use tracing::{info, warn};

use crate::{
    chat::store::RealtimeDb,
    dto::{
        UserId,
        chat::{ChatIndexEntry, ChatMessage},
        project::UserProfile,
    },
    error::ChatError,
};

/// How many times the best-effort index update is attempted.
const INDEX_RETRY_ATTEMPTS: u32 = 3;
/// Initial delay between index update attempts.
const INDEX_RETRY_DELAY: Duration = Duration::from_millis(200);

/// Where a chat channel lives in the realtime database.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatTarget {
    /// 1:1 conversation.
    Direct { chat_id: String },
    /// Group channel owned by a pack.
    Pack { pack_id: String },
    /// Location-bound channel.
    Territory { territory_id: String },
}

impl ChatTarget {
    /// Database path holding the channel's message records.
    pub fn messages_path(&self) -> String {
        match self {
            Self::Direct { chat_id } => format!("chats/{chat_id}"),
            Self::Pack { pack_id } => format!("packs/{pack_id}/messages"),
            Self::Territory { territory_id } => format!("territories/{territory_id}/messages"),
        }
    }

    /// Sender-side conversation index path, for targets that keep one.
    pub fn index_path(&self, user_id: &UserId) -> Option<String> {
        match self {
            Self::Direct { chat_id } => Some(format!("user_chats/{user_id}/{chat_id}")),
            Self::Pack { .. } | Self::Territory { .. } => None,
        }
    }
}

/// Lifecycle phases of a channel subscription.
///
/// A failed read lands in [`ChatPhase::Failed`], which is distinguishable
/// from a legitimately empty channel in the `Live` phase.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChatPhase {
    /// Not yet opened.
    Idle,
    /// Subscription requested, initial value not yet received.
    Loading,
    /// Receiving live full-list updates.
    Live,
    /// The subscription failed or ended; the message carries the cause.
    Failed(String),
}

/// Receipt returned by [`ChatChannel::send_message`].
///
/// The message write and the conversation index update are two separate
/// phases: the first failing fails the send, the second is best-effort and
/// its outcome is reported here instead of being swallowed.
#[derive(Debug)]
pub struct SendReceipt {
    /// Server-generated key of the stored message record.
    pub message_key: String,
    /// Outcome of the index metadata update; `None` when the target keeps
    /// no per-user index.
    pub index_update: Option<Result<(), ChatError>>,
}

struct ChannelState {
    db: Arc<dyn RealtimeDb>,
    target: ChatTarget,
    phase: watch::Sender<ChatPhase>,
    messages: watch::Sender<Vec<ChatMessage>>,
}

/// One live channel: a subscription task plus watchable phase and messages.
pub struct ChatChannel {
    state: Arc<ChannelState>,
    task: Mutex<Option<JoinHandle<()>>>,
}

impl ChatChannel {
    /// Channel for `target`, not yet subscribed.
    pub fn new(db: Arc<dyn RealtimeDb>, target: ChatTarget) -> Arc<Self> {
        let (phase_tx, _rx) = watch::channel(ChatPhase::Idle);
        let (messages_tx, _rx) = watch::channel(Vec::new());
        Arc::new(Self {
            state: Arc::new(ChannelState {
                db,
                target,
                phase: phase_tx,
                messages: messages_tx,
            }),
            task: Mutex::new(None),
        })
    }

    /// Start the live subscription.
    ///
    /// Every update delivers the entire current list; reconciliation is a
    /// wholesale replacement of the local list, ordered by timestamp.
    pub async fn open(&self) {
        let mut task = self.task.lock().await;
        if task.is_some() {
            return;
        }

        self.state.phase.send_replace(ChatPhase::Loading);
        *task = Some(tokio::spawn(run_subscription(self.state.clone())));
    }

    /// Stop the subscription and return to idle.
    pub async fn close(&self) {
        if let Some(task) = self.task.lock().await.take() {
            task.abort();
        }
        self.state.phase.send_replace(ChatPhase::Idle);
    }

    /// Current phase.
    pub fn phase(&self) -> ChatPhase {
        self.state.phase.borrow().clone()
    }

    /// Subscribe to phase changes.
    pub fn phase_watcher(&self) -> watch::Receiver<ChatPhase> {
        self.state.phase.subscribe()
    }

    /// Subscribe to full-list message updates.
    pub fn messages_watcher(&self) -> watch::Receiver<Vec<ChatMessage>> {
        self.state.messages.subscribe()
    }

    /// Write a message, then separately attempt the sender's conversation
    /// index update.
    ///
    /// The index write is expected to be rejected by access rules on the
    /// recipient side; it is retried a bounded number of times and its final
    /// outcome lands in the receipt rather than failing the send.
    pub async fn send_message(
        &self,
        sender: &UserProfile,
        text: &str,
    ) -> Result<SendReceipt, ChatError> {
        let path = self.state.target.messages_path();
        let message = ChatMessage::now(
            sender.id.clone(),
            sender.display_name.clone(),
            text.to_string(),
        );
        let value = serde_json::to_value(&message).map_err(|source| ChatError::Decode {
            path: path.clone(),
            source,
        })?;

        let message_key = self.state.db.push(path, value).await?;

        let index_update = match self.state.target.index_path(&sender.id) {
            None => None,
            Some(index_path) => Some(self.update_index(index_path, &message).await),
        };

        Ok(SendReceipt {
            message_key,
            index_update,
        })
    }

    async fn update_index(&self, path: String, message: &ChatMessage) -> Result<(), ChatError> {
        let entry = ChatIndexEntry::from_message(message);
        let value = serde_json::to_value(&entry).map_err(|source| ChatError::Decode {
            path: path.clone(),
            source,
        })?;

        let mut delay = INDEX_RETRY_DELAY;
        let mut attempt = 0;
        loop {
            match self.state.db.update(path.clone(), value.clone()).await {
                Ok(()) => return Ok(()),
                Err(err) => {
                    attempt += 1;
                    if attempt >= INDEX_RETRY_ATTEMPTS {
                        warn!(path = %path, error = %err, "giving up on chat index update");
                        return Err(err);
                    }
                    warn!(
                        attempt,
                        path = %path,
                        error = %err,
                        "chat index update failed; retrying"
                    );
                    sleep(delay).await;
                    delay *= 2;
                }
            }
        }
    }
}

/// Drive one subscription until it ends or breaks.
async fn run_subscription(state: Arc<ChannelState>) {
    let path = state.target.messages_path();
    let mut stream = match state.db.subscribe(path.clone()).await {
        Ok(stream) => stream,
        Err(err) => {
            warn!(path = %path, error = %err, "chat subscription failed");
            state.phase.send_replace(ChatPhase::Failed(err.to_string()));
            return;
        }
    };

    info!(path = %path, "chat channel live");
    while let Some(update) = stream.next().await {
        match update {
            Ok(value) => {
                state.messages.send_replace(messages_from_value(&value));
                state.phase.send_replace(ChatPhase::Live);
            }
            Err(err) => {
                warn!(path = %path, error = %err, "chat subscription broke");
                state.phase.send_replace(ChatPhase::Failed(err.to_string()));
                return;
            }
        }
    }

    state
        .phase
        .send_replace(ChatPhase::Failed("subscription ended".into()));
}

/// Flatten the stored value into a timestamp-ordered message list.
///
/// The database hands back an object keyed by push id (or nothing at all
/// for an empty channel); records that do not parse are skipped.
fn messages_from_value(value: &Value) -> Vec<ChatMessage> {
    let mut messages: Vec<ChatMessage> = match value {
        Value::Object(map) => map
            .values()
            .filter_map(|record| {
                serde_json::from_value::<ChatMessage>(record.clone())
                    .map_err(|err| {
                        warn!(error = %err, "skipping malformed chat record");
                        err
                    })
                    .ok()
            })
            .collect(),
        Value::Array(records) => records
            .iter()
            .filter(|record| !record.is_null())
            .filter_map(|record| serde_json::from_value(record.clone()).ok())
            .collect(),
        _ => Vec::new(),
    };
    messages.sort_by_key(|message| message.timestamp);
    messages
}
