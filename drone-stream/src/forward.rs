//! Delivery forwarding.
//!
//! One task per consumer moves broker deliveries into the session's outbound
//! channel. Forwarders never touch session state; they stop when the broker
//! ends the consumer or the session's outbound channel closes.

use broker_gateway::Consumer;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

use crate::event::SessionEvent;
use crate::types::{SessionId, StreamKind};

/// Which outbound channel a consumer's deliveries are tagged with.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Route {
    /// A per-session device queue
    Device(StreamKind),
    /// The shared admin queue
    Admin,
}

impl Route {
    fn wrap(self, payload: Value) -> SessionEvent {
        match self {
            Route::Device(kind) => SessionEvent::device(kind, payload),
            Route::Admin => SessionEvent::AdminDroneTopic(payload),
        }
    }
}

/// Spawn the forwarding task for one consumer.
pub fn spawn_forwarder(
    session: SessionId,
    consumer: Consumer,
    route: Route,
    outbound: mpsc::Sender<SessionEvent>,
) -> JoinHandle<()> {
    let Consumer {
        handle,
        mut deliveries,
    } = consumer;

    tokio::spawn(async move {
        while let Some(delivery) = deliveries.recv().await {
            let payload: Value = match serde_json::from_slice(&delivery.payload) {
                Ok(value) => value,
                Err(e) => {
                    tracing::warn!(
                        session = %session,
                        routing_key = %delivery.routing_key,
                        error = %e,
                        "Dropping delivery with malformed JSON payload"
                    );
                    continue;
                }
            };

            if outbound.send(route.wrap(payload)).await.is_err() {
                tracing::debug!(session = %session, consumer = %handle, "Outbound channel closed");
                break;
            }
        }
        tracing::debug!(session = %session, consumer = %handle, "Forwarder stopped");
    })
}
