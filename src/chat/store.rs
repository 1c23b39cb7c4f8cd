//! Realtime database access: the `RealtimeDb` seam and its REST-protocol
//! implementation (streaming reads, push writes, merge updates).

use std::{pin::Pin, sync::Arc};

use futures::{Stream, StreamExt, future::BoxFuture};
use reqwest::{Client, header};
use serde::Deserialize;
use serde_json::Value;

use crate::error::ChatError;

/// Stream of full-value updates for one subscribed path. The first item is
/// the initial read; every subsequent item is the complete current value,
/// not a delta.
pub type ValueStream = Pin<Box<dyn Stream<Item = Result<Value, ChatError>> + Send>>;

/// Database surface the chat layer consumes.
pub trait RealtimeDb: Send + Sync {
    /// Subscribe to live full-value updates at `path`.
    fn subscribe(&self, path: String) -> BoxFuture<'static, Result<ValueStream, ChatError>>;
    /// Append a child with a server-generated key; resolves to the key.
    fn push(&self, path: String, value: Value) -> BoxFuture<'static, Result<String, ChatError>>;
    /// Merge `value` into the object stored at `path`.
    fn update(&self, path: String, value: Value) -> BoxFuture<'static, Result<(), ChatError>>;
}

/// REST-protocol implementation speaking to a managed realtime database.
///
/// Subscriptions use the database's `text/event-stream` endpoint: the server
/// sends `put`/`patch` events against a path inside the subscription, and we
/// maintain a local tree so each event can be surfaced as the full current
/// value, matching the snapshot-per-change contract the chat layer expects.
#[derive(Clone)]
pub struct RestRealtimeDb {
    client: Client,
    base_url: Arc<str>,
    auth: Option<Arc<str>>,
}

impl RestRealtimeDb {
    /// Client against `base_url`, optionally authenticating with `auth`.
    pub fn new(base_url: &str, auth: Option<&str>) -> Result<Self, ChatError> {
        let client = Client::builder()
            .build()
            .map_err(|source| ChatError::Client { source })?;
        Ok(Self {
            client,
            base_url: Arc::from(base_url.trim_end_matches('/')),
            auth: auth.filter(|auth| !auth.is_empty()).map(Arc::from),
        })
    }

    fn url(&self, path: &str) -> String {
        match self.auth.as_deref() {
            Some(auth) => format!("{}/{path}.json?auth={auth}", self.base_url),
            None => format!("{}/{path}.json", self.base_url),
        }
    }
}

#[derive(Debug, Deserialize)]
struct StreamEvent {
    path: String,
    data: Value,
}

#[derive(Debug, Deserialize)]
struct PushResponse {
    name: String,
}

impl RealtimeDb for RestRealtimeDb {
    fn subscribe(&self, path: String) -> BoxFuture<'static, Result<ValueStream, ChatError>> {
        let client = self.client.clone();
        let url = self.url(&path);
        Box::pin(async move {
            let response = client
                .get(&url)
                .header(header::ACCEPT, "text/event-stream")
                .send()
                .await
                .map_err(|source| ChatError::Request {
                    path: path.clone(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(ChatError::Status {
                    path,
                    status: response.status(),
                });
            }
            Ok(event_stream(path, Box::pin(response.bytes_stream())))
        })
    }

    fn push(&self, path: String, value: Value) -> BoxFuture<'static, Result<String, ChatError>> {
        let client = self.client.clone();
        let url = self.url(&path);
        Box::pin(async move {
            let response = client
                .post(&url)
                .json(&value)
                .send()
                .await
                .map_err(|source| ChatError::Request {
                    path: path.clone(),
                    source,
                })?;
            if !response.status().is_success() {
                return Err(ChatError::Status {
                    path,
                    status: response.status(),
                });
            }
            let body = response
                .text()
                .await
                .map_err(|source| ChatError::Request {
                    path: path.clone(),
                    source,
                })?;
            let parsed: PushResponse = serde_json::from_str(&body)
                .map_err(|source| ChatError::Decode { path, source })?;
            Ok(parsed.name)
        })
    }

    fn update(&self, path: String, value: Value) -> BoxFuture<'static, Result<(), ChatError>> {
        let client = self.client.clone();
        let url = self.url(&path);
        Box::pin(async move {
            let response = client
                .patch(&url)
                .json(&value)
                .send()
                .await
                .map_err(|source| ChatError::Request {
                    path: path.clone(),
                    source,
                })?;
            if response.status().is_success() {
                Ok(())
            } else {
                Err(ChatError::Status {
                    path,
                    status: response.status(),
                })
            }
        })
    }
}

/// Turn the raw event-stream bytes into full-value snapshots.
fn event_stream<B>(
    path: String,
    mut bytes: impl Stream<Item = reqwest::Result<B>> + Send + Unpin + 'static,
) -> ValueStream
where
    B: AsRef<[u8]> + Send + 'static,
{
    Box::pin(async_stream::stream! {
        let mut tree = Value::Null;
        let mut buffer = String::new();
        let mut event_name = String::new();
        let mut data_line = String::new();

        while let Some(chunk) = bytes.next().await {
            let chunk = match chunk {
                Ok(chunk) => chunk,
                Err(source) => {
                    yield Err(ChatError::Request { path: path.clone(), source });
                    return;
                }
            };
            buffer.push_str(&String::from_utf8_lossy(chunk.as_ref()));

            while let Some(newline) = buffer.find('\n') {
                let line = buffer[..newline].trim_end_matches('\r').to_string();
                buffer.drain(..=newline);

                if line.is_empty() {
                    // Blank line terminates one event.
                    match event_name.as_str() {
                        "put" | "patch" => {
                            match serde_json::from_str::<StreamEvent>(&data_line) {
                                Ok(event) => {
                                    if event_name == "put" {
                                        apply_put(&mut tree, &event.path, event.data);
                                    } else {
                                        apply_patch(&mut tree, &event.path, event.data);
                                    }
                                    yield Ok(tree.clone());
                                }
                                Err(source) => {
                                    yield Err(ChatError::Decode { path: path.clone(), source });
                                    return;
                                }
                            }
                        }
                        "cancel" | "auth_revoked" => {
                            yield Err(ChatError::SubscriptionEnded { path: path.clone() });
                            return;
                        }
                        // keep-alive and unnamed events carry nothing.
                        _ => {}
                    }
                    event_name.clear();
                    data_line.clear();
                } else if let Some(rest) = line.strip_prefix("event:") {
                    event_name = rest.trim().to_string();
                } else if let Some(rest) = line.strip_prefix("data:") {
                    data_line = rest.trim().to_string();
                }
            }
        }
    })
}

/// Replace the subtree at `path` wholesale.
fn apply_put(tree: &mut Value, path: &str, data: Value) {
    if path == "/" || path.is_empty() {
        *tree = data;
        return;
    }
    *node_at(tree, path) = data;
}

/// Merge object keys into the subtree at `path`.
fn apply_patch(tree: &mut Value, path: &str, data: Value) {
    let node = node_at(tree, path);
    if let Value::Object(fields) = data {
        if let Value::Object(target) = node {
            for (key, value) in fields {
                target.insert(key, value);
            }
            return;
        }
        *node = Value::Object(fields);
    } else {
        *node = data;
    }
}

/// Walk (and create) the object spine down to `path`.
fn node_at<'tree>(tree: &'tree mut Value, path: &str) -> &'tree mut Value {
    path.split('/')
        .filter(|segment| !segment.is_empty())
        .fold(tree, |node, segment| {
            if !node.is_object() {
                *node = Value::Object(serde_json::Map::new());
            }
            match node {
                Value::Object(map) => map.entry(segment).or_insert(Value::Null),
                other => other,
            }
        })
}
