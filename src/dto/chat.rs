use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::dto::UserId;

/// One message record stored under a chat channel path.
///
/// Field names follow the realtime database schema, which uses camelCase
/// keys and an epoch-milliseconds timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatMessage {
    pub sender_id: UserId,
    pub sender_name: String,
    pub text: String,
    /// Milliseconds since the Unix epoch.
    pub timestamp: i64,
}

impl ChatMessage {
    /// Build a message stamped with the current wall-clock time.
    pub fn now(sender_id: UserId, sender_name: String, text: String) -> Self {
        Self {
            sender_id,
            sender_name,
            text,
            timestamp: unix_millis_now(),
        }
    }
}

/// "Last message" metadata kept under the sender's conversation index.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChatIndexEntry {
    pub last_message: String,
    pub last_sender_id: UserId,
    pub timestamp: i64,
}

impl ChatIndexEntry {
    /// Index entry summarising `message`.
    pub fn from_message(message: &ChatMessage) -> Self {
        Self {
            last_message: message.text.clone(),
            last_sender_id: message.sender_id.clone(),
            timestamp: message.timestamp,
        }
    }
}

fn unix_millis_now() -> i64 {
    (OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn message_round_trips_camel_case() {
        let raw = r#"{"senderId":"u1","senderName":"Alice","text":"hi","timestamp":1700000000000}"#;
        let message: ChatMessage = serde_json::from_str(raw).unwrap();
        assert_eq!(message.sender_id, "u1");
        let encoded = serde_json::to_string(&message).unwrap();
        assert!(encoded.contains("\"senderId\""));
    }

    #[test]
    fn index_entry_summarises_message() {
        let message = ChatMessage {
            sender_id: "u1".into(),
            sender_name: "Alice".into(),
            text: "on my way".into(),
            timestamp: 1_700_000_000_000,
        };
        let entry = ChatIndexEntry::from_message(&message);
        assert_eq!(entry.last_message, "on my way");
        assert_eq!(entry.last_sender_id, "u1");
        assert_eq!(entry.timestamp, message.timestamp);
    }
}
