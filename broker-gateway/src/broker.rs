//! The broker collaborator contract.
//!
//! Implementations must be safe to share between every session of the
//! process. Each call is an independent round-trip; none of them retries.

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

use crate::error::Result;

/// Options for declaring the topic exchange.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExchangeOptions {
    /// Whether the exchange survives a broker restart
    pub durable: bool,
}

/// Options for declaring a queue.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct QueueOptions {
    /// Delete the queue once its last consumer detaches
    pub auto_delete: bool,
    /// Whether the queue survives a broker restart
    pub durable: bool,
}

impl QueueOptions {
    /// Non-durable queue that disappears with its last consumer.
    pub fn ephemeral() -> Self {
        Self {
            auto_delete: true,
            durable: false,
        }
    }
}

impl Default for QueueOptions {
    fn default() -> Self {
        Self::ephemeral()
    }
}

/// Broker-issued token identifying one active consumption.
///
/// Handles are never released implicitly; dropping one does not cancel the
/// consumer. Use [`Broker::cancel`].
#[derive(Debug, Clone, Hash, Eq, PartialEq)]
pub struct ConsumerHandle(String);

impl ConsumerHandle {
    /// Wrap a consumer tag.
    pub fn new(tag: impl Into<String>) -> Self {
        Self(tag.into())
    }

    /// The consumer tag as a string slice.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl std::fmt::Display for ConsumerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// A message delivered to a consumer.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    /// Routing key the message was published with
    pub routing_key: String,
    /// Raw message body
    pub payload: Bytes,
}

/// An active consumer: its handle plus the stream of deliveries.
///
/// The delivery channel closes once the consumer is cancelled.
#[derive(Debug)]
pub struct Consumer {
    /// Handle used to cancel the consumer
    pub handle: ConsumerHandle,
    /// Messages routed to the consumed queue
    pub deliveries: mpsc::UnboundedReceiver<Delivery>,
}

/// Exchange/queue/bind/consume/publish primitives of a topic broker.
///
/// Every operation may fail; failures are returned to the caller and never
/// panic. Exchanges declared through this trait are topic exchanges.
#[async_trait]
pub trait Broker: Send + Sync {
    /// Assert a topic exchange. Idempotent.
    async fn declare_exchange(&self, name: &str, options: ExchangeOptions) -> Result<()>;

    /// Assert a queue and return its name. Idempotent.
    async fn declare_queue(&self, name: &str, options: QueueOptions) -> Result<String>;

    /// Bind `queue` to `exchange` with a (possibly wildcard) routing key.
    async fn bind_queue(&self, queue: &str, exchange: &str, routing_key: &str) -> Result<()>;

    /// Start consuming `queue` without acknowledgements.
    async fn consume(&self, queue: &str) -> Result<Consumer>;

    /// Cancel an active consumer.
    async fn cancel(&self, handle: &ConsumerHandle) -> Result<()>;

    /// Publish a message. No acknowledgement, no retry.
    async fn publish(&self, exchange: &str, routing_key: &str, payload: Bytes) -> Result<()>;
}
