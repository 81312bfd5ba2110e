//! One WebSocket connection, from upgrade to disconnect.

use std::sync::Arc;
use std::time::Duration;

use broker_gateway::BrokerGateway;
use drone_stream::{CancelTrigger, ClientEvent, Session, SessionEvent, SessionId, StreamConfig};
use futures::{SinkExt, StreamExt};
use tokio::sync::{mpsc, watch};
use warp::ws::{Message, WebSocket};

/// Shared state handed to every connection.
#[derive(Clone)]
pub struct AppContext {
    pub gateway: Arc<BrokerGateway>,
    pub stream: StreamConfig,
    /// Flipped to `true` to close every live connection
    shutdown: Arc<watch::Sender<bool>>,
}

impl AppContext {
    pub fn new(gateway: Arc<BrokerGateway>, stream: StreamConfig) -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            gateway,
            stream,
            shutdown: Arc::new(shutdown),
        }
    }

    /// Number of connections currently being served.
    pub fn live_sessions(&self) -> usize {
        self.shutdown.receiver_count()
    }

    /// Close every live connection and wait for their cleanup.
    ///
    /// Each connection cancels its consumers as on a client disconnect.
    /// Returns `false` if some were still running after `grace`.
    pub async fn close_sessions(&self, grace: Duration) -> bool {
        self.shutdown.send_replace(true);
        let live = self.live_sessions();
        if live == 0 {
            return true;
        }
        tracing::info!(sessions = live, "Closing live sessions");
        match tokio::time::timeout(grace, self.shutdown.closed()).await {
            Ok(()) => true,
            Err(_) => {
                tracing::warn!(
                    sessions = self.live_sessions(),
                    "Sessions still open after shutdown grace period"
                );
                false
            }
        }
    }
}

/// Serve a client until the socket closes.
///
/// 1. Spawns a writer that drains the session's outbound channel to the socket
/// 2. Handles inbound text frames one at a time against the session
/// 3. Releases every consumer the session holds on close, error or server
///    shutdown
pub async fn serve(socket: WebSocket, ctx: AppContext) {
    // Held until cleanup is done; shutdown waits for it to drop
    let mut shutdown = ctx.shutdown.subscribe();
    let session_id = SessionId::generate();
    let (mut ws_tx, mut ws_rx) = socket.split();
    let (out_tx, mut out_rx) = mpsc::channel::<SessionEvent>(ctx.stream.outbound_buffer);

    let writer_id = session_id.clone();
    let writer = tokio::spawn(async move {
        while let Some(event) = out_rx.recv().await {
            let text = match serde_json::to_string(&event) {
                Ok(text) => text,
                Err(e) => {
                    tracing::warn!(
                        session = %writer_id,
                        event = event.name(),
                        error = %e,
                        "Failed to encode event"
                    );
                    continue;
                }
            };
            if ws_tx.send(Message::text(text)).await.is_err() {
                tracing::debug!(session = %writer_id, "Socket closed while writing");
                break;
            }
        }
    });

    let mut session = Session::new(session_id.clone(), ctx.gateway, ctx.stream, out_tx);
    tracing::info!(session = %session_id, "Client connected");

    while !*shutdown.borrow_and_update() {
        let frame = tokio::select! {
            frame = ws_rx.next() => frame,
            _ = shutdown.changed() => break,
        };
        let Some(frame) = frame else {
            break;
        };
        let message = match frame {
            Ok(message) => message,
            Err(e) => {
                tracing::debug!(session = %session_id, error = %e, "Socket error");
                break;
            }
        };
        if message.is_close() {
            break;
        }

        let Some(text) = frame_text(&message) else {
            continue;
        };

        let event = match ClientEvent::parse(text) {
            Ok(event) => event,
            Err(e) => {
                tracing::warn!(session = %session_id, error = %e, "Ignoring malformed frame");
                continue;
            }
        };

        let name = event.name();
        tracing::debug!(session = %session_id, event = name, "Handling request");
        if let Err(e) = session.handle(event).await {
            tracing::warn!(session = %session_id, event = name, error = %e, "Request failed");
        }
    }

    session.cancel_all(CancelTrigger::Disconnect).await;
    drop(session);
    writer.abort();
    tracing::info!(session = %session_id, "Client disconnected");
    drop(shutdown);
}

/// Text payload of a data frame. Binary frames are accepted when they hold
/// UTF-8; control frames carry no request.
fn frame_text(message: &Message) -> Option<&str> {
    if message.is_text() {
        message.to_str().ok()
    } else if message.is_binary() {
        std::str::from_utf8(message.as_bytes()).ok()
    } else {
        None
    }
}
