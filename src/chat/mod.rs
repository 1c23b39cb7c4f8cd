//! Realtime chat channels over the managed realtime database.

pub mod channel;
pub mod store;

use std::sync::Arc;

use dashmap::DashMap;

pub use self::channel::{ChatChannel, ChatPhase, ChatTarget, SendReceipt};
pub use self::store::{RealtimeDb, RestRealtimeDb};

/// Registry owning at most one live channel per database path.
///
/// Channels are created lazily and shared: opening the same target twice
/// hands back the existing subscription instead of a second one.
pub struct ChatRegistry {
    db: Arc<dyn RealtimeDb>,
    channels: DashMap<String, Arc<ChatChannel>>,
}

impl ChatRegistry {
    /// Registry over the given database implementation.
    pub fn new(db: Arc<dyn RealtimeDb>) -> Self {
        Self {
            db,
            channels: DashMap::new(),
        }
    }

    /// Open (or reuse) the channel for `target` and start its subscription.
    pub async fn open(&self, target: ChatTarget) -> Arc<ChatChannel> {
        let key = target.messages_path();
        if let Some(existing) = self.channels.get(&key) {
            return existing.clone();
        }

        let channel = ChatChannel::new(self.db.clone(), target);
        channel.open().await;
        self.channels.insert(key, channel.clone());
        channel
    }

    /// Close and forget the channel for `target`, if one is live.
    pub async fn close(&self, target: &ChatTarget) {
        if let Some((_key, channel)) = self.channels.remove(&target.messages_path()) {
            channel.close().await;
        }
    }

    /// Tear down every live channel.
    pub async fn close_all(&self) {
        let keys: Vec<String> = self.channels.iter().map(|entry| entry.key().clone()).collect();
        for key in keys {
            if let Some((_key, channel)) = self.channels.remove(&key) {
                channel.close().await;
            }
        }
    }
}
