//! # drone-stream
//!
//! Per-session device stream subscriptions for the drone bridge.
//!
//! A client session names a set of devices; for each device the session gets
//! two private queues on the shared topic exchange, one for telemetry
//! (`drone`) and one for media signaling (`webrtc`). Messages on those queues
//! are forwarded to the client tagged by channel. Sessions can also publish
//! commands and signaling back to devices, attach to the shared admin
//! telemetry queue, and release everything on cancel or disconnect.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use broker_gateway::{BrokerGateway, GatewayConfig, MemoryBroker};
//! use drone_stream::{DeviceSet, Session, SessionEvent, SessionId, StreamConfig};
//! use tokio::sync::mpsc;
//!
//! # #[tokio::main]
//! # async fn main() -> drone_stream::Result<()> {
//! let gateway = Arc::new(BrokerGateway::new(
//!     Arc::new(MemoryBroker::new()),
//!     GatewayConfig::default(),
//! ));
//! let (tx, mut rx) = mpsc::channel(16);
//! let mut session = Session::new(SessionId::generate(), gateway, StreamConfig::default(), tx);
//!
//! session.subscribe(DeviceSet::from_devices(["drone-1"])).await?;
//! assert!(matches!(rx.recv().await, Some(SessionEvent::QueueCreated(_))));
//! # Ok(())
//! # }
//! ```

mod admin;
pub mod binding;
mod cleanup;
pub mod command;
mod config;
mod error;
mod event;
mod forward;
mod session;
mod types;

pub use cleanup::{CancelTrigger, CleanupReport};
pub use config::StreamConfig;
pub use error::{Result, SessionError};
pub use event::{ClientEvent, Command, SessionEvent};
pub use session::Session;
pub use types::*;
