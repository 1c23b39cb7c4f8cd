//! Delta stream client: transport seam, connection loop, and the append-only
//! message log the reconciler drains.

use futures::{SinkExt, StreamExt, future::BoxFuture};
use tokio::{net::TcpStream, sync::mpsc};
use tokio_tungstenite::{
    MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message,
};
use tracing::{info, warn};

use crate::{
    config::AppConfig,
    dto::{ProjectId, UserId, ws::DeltaMessage},
    error::StreamError,
    sync::SharedSync,
};

/// Lifecycle states of the delta stream connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StreamStatus {
    /// A connection attempt is in flight.
    Connecting,
    /// The stream is live and frames flow.
    Open,
    /// No live connection. Reachable from any state.
    Closed,
}

/// Key identifying one live connection. Whenever either component changes,
/// the existing connection is torn down and a new one opened; there is no
/// in-place reconfiguration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConnectionKey {
    pub user_id: UserId,
    pub project_id: Option<ProjectId>,
}

/// Ordered, never-truncated log of every delta received over the life of a
/// connection, with a cursor tracking what the reconciler has folded in.
#[derive(Debug, Default)]
pub struct DeltaLog {
    entries: Vec<DeltaMessage>,
    cursor: usize,
}

impl DeltaLog {
    /// Append one received message.
    pub fn push(&mut self, message: DeltaMessage) {
        self.entries.push(message);
    }

    /// Clone out every entry past the cursor and advance it.
    pub fn take_unapplied(&mut self) -> Vec<DeltaMessage> {
        let pending = self.entries[self.cursor..].to_vec();
        self.cursor = self.entries.len();
        pending
    }

    /// Total messages received on this connection.
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// True when no messages have been received yet.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Start over for a new connection.
    pub fn reset(&mut self) {
        self.entries.clear();
        self.cursor = 0;
    }
}

/// Bidirectional text transport behind the delta stream.
///
/// Abstracted so connection handling and reconciliation can be exercised
/// against scripted transports in tests.
pub trait StreamTransport: Send {
    /// Queue one outbound text frame.
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), StreamError>>;
    /// Await the next inbound text frame. `None` means the peer closed.
    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, StreamError>>>;
    /// Close the transport.
    fn close(&mut self) -> BoxFuture<'_, Result<(), StreamError>>;
}

/// Factory opening transports for a connection key.
pub trait Connector: Send + Sync {
    /// Open a fresh transport for `key`.
    fn connect(
        &self,
        key: &ConnectionKey,
    ) -> BoxFuture<'static, Result<Box<dyn StreamTransport>, StreamError>>;
}

type WsStream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// Production transport over a tungstenite WebSocket.
pub struct WsTransport {
    socket: WsStream,
}

impl StreamTransport for WsTransport {
    fn send(&mut self, text: String) -> BoxFuture<'_, Result<(), StreamError>> {
        Box::pin(async move {
            self.socket
                .send(Message::Text(text.into()))
                .await
                .map_err(|err| StreamError::Transport(err.to_string()))
        })
    }

    fn recv(&mut self) -> BoxFuture<'_, Option<Result<String, StreamError>>> {
        Box::pin(async move {
            loop {
                match self.socket.next().await {
                    Some(Ok(Message::Text(text))) => return Some(Ok(text.as_str().to_owned())),
                    // Control and binary frames carry no deltas; pings are
                    // answered by the protocol layer on the next flush.
                    Some(Ok(Message::Ping(_) | Message::Pong(_) | Message::Binary(_))) => continue,
                    Some(Ok(Message::Frame(_))) => continue,
                    Some(Ok(Message::Close(_))) => return None,
                    Some(Err(err)) => {
                        return Some(Err(StreamError::Transport(err.to_string())));
                    }
                    None => return None,
                }
            }
        })
    }

    fn close(&mut self) -> BoxFuture<'_, Result<(), StreamError>> {
        Box::pin(async move {
            self.socket
                .close(None)
                .await
                .map_err(|err| StreamError::Transport(err.to_string()))
        })
    }
}

/// Connector dialing the configured WebSocket endpoint.
pub struct WsConnector {
    config: AppConfig,
}

impl WsConnector {
    /// Connector resolving URLs from `config`.
    pub fn new(config: AppConfig) -> Self {
        Self { config }
    }
}

impl Connector for WsConnector {
    fn connect(
        &self,
        key: &ConnectionKey,
    ) -> BoxFuture<'static, Result<Box<dyn StreamTransport>, StreamError>> {
        let url = self.config.ws_url(&key.user_id, key.project_id.as_ref());
        Box::pin(async move {
            let (socket, _response) = connect_async(url.as_str())
                .await
                .map_err(|err| StreamError::Connect(err.to_string()))?;
            Ok(Box::new(WsTransport { socket }) as Box<dyn StreamTransport>)
        })
    }
}

/// Why a connection's lifetime ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Disconnect {
    /// We tore the connection down on purpose (key change or shutdown).
    Shutdown,
    /// The transport dropped or the server closed; a supervisor may retry.
    Lost,
}

/// Drive one open connection until it ends.
///
/// Inbound frames are parsed as deltas and folded into `core`; frames that
/// fail to parse are logged and dropped without affecting the connection.
/// The outbound channel closing signals an intentional teardown.
pub(crate) async fn run_connection(
    core: &SharedSync,
    mut transport: Box<dyn StreamTransport>,
    outbound_rx: &mut mpsc::UnboundedReceiver<String>,
) -> Disconnect {
    loop {
        tokio::select! {
            command = outbound_rx.recv() => match command {
                Some(text) => {
                    if let Err(err) = transport.send(text).await {
                        warn!(error = %err, "delta stream send failed");
                        return Disconnect::Lost;
                    }
                }
                None => {
                    let _ = transport.close().await;
                    return Disconnect::Shutdown;
                }
            },
            frame = transport.recv() => match frame {
                Some(Ok(text)) => match DeltaMessage::from_json_str(&text) {
                    Ok(message) => {
                        core.ingest(message).await;
                    }
                    Err(err) => {
                        warn!(error = %err, "failed to parse delta frame; dropping");
                    }
                },
                Some(Err(err)) => {
                    warn!(error = %err, "delta stream transport error");
                    return Disconnect::Lost;
                }
                None => {
                    info!("delta stream closed by server");
                    return Disconnect::Lost;
                }
            },
        }
    }
}
