//! WebSocket transport for the drone bridge.
//!
//! Each WebSocket connection on `/ws` becomes one [`drone_stream::Session`].
//! Frames in both directions are JSON envelopes of the form
//! `{"event": <name>, "data": <payload>}`.
//!
//! # Overview
//!
//! - [`BridgeServer`]: binds the listener and serves `/ws` and `/health`
//!   until shut down.
//! - [`routes`]: the warp filter tree, usable directly with `warp::test`.
//! - [`ServerConfig`]: listen address, broker backend and the nested
//!   gateway and stream settings.
//! - [`backend::connect`]: builds the broker for a [`BrokerBackend`].
//!
//! A connection is served by one task that owns its session and handles
//! requests strictly in arrival order. Broker deliveries reach the socket
//! through the session's outbound channel, drained by a writer task. When
//! the socket closes, every consumer the session holds is cancelled.

pub mod backend;
mod config;
mod connection;
mod error;
mod server;

pub use config::{BrokerBackend, ServerConfig};
pub use connection::AppContext;
pub use error::{Result, ServerError};
pub use server::{routes, BridgeServer};
