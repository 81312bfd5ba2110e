//! Broker boundary for the drone bridge.
//!
//! This crate owns everything the bridge knows about the message broker. It is
//! deliberately generic: it has no knowledge of devices, sessions or stream
//! kinds, only of exchanges, queues, bindings and consumers.
//!
//! # Overview
//!
//! - [`Broker`]: the collaborator contract. Exchange/queue declaration,
//!   binding, consumption, cancellation and fire-and-forget publishing.
//! - [`MemoryBroker`]: an in-process topic broker implementing [`Broker`].
//!   Used by tests and by the `memory` backend of the server.
//! - `AmqpBroker` (feature `amqp`): a RabbitMQ-compatible backend built on
//!   `lapin`, sharing one connection and one channel.
//! - [`BrokerGateway`]: the single shared handle every session talks to. It
//!   owns the process-wide topic exchange and asserts it idempotently.
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use broker_gateway::{BrokerGateway, GatewayConfig, MemoryBroker};
//!
//! # #[tokio::main]
//! # async fn main() -> broker_gateway::Result<()> {
//! let broker = Arc::new(MemoryBroker::new());
//! let gateway = BrokerGateway::new(broker, GatewayConfig::default());
//!
//! gateway.ensure_exchange().await?;
//! let queue = gateway.declare_queue("session-drone-1-drone").await?;
//! gateway.bind(&queue, "drone-1.phone.drone").await?;
//!
//! let mut consumer = gateway.consume(&queue).await?;
//! gateway.publish("drone-1.phone.drone", br#"{"alt":10}"#.to_vec().into()).await?;
//!
//! let delivery = consumer.deliveries.recv().await.unwrap();
//! assert_eq!(&delivery.payload[..], br#"{"alt":10}"#);
//! # Ok(())
//! # }
//! ```

#[cfg(feature = "amqp")]
pub mod amqp;
pub mod broker;
pub mod error;
pub mod gateway;
pub mod memory;
pub mod topic;

#[cfg(feature = "amqp")]
pub use amqp::AmqpBroker;
pub use broker::{Broker, Consumer, ConsumerHandle, Delivery, ExchangeOptions, QueueOptions};
pub use error::{GatewayError, Result};
pub use gateway::{BrokerGateway, GatewayConfig};
pub use memory::{MemoryBroker, Operation};
