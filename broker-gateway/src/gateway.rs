//! The shared broker gateway.
//!
//! One `BrokerGateway` exists per process. It owns the topic exchange every
//! session publishes to and binds against, and funnels all broker calls so
//! that failures are logged with context in one place.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use bytes::Bytes;

use crate::broker::{Broker, Consumer, ConsumerHandle, ExchangeOptions, QueueOptions};
use crate::error::{GatewayError, Result};

/// Configuration for the broker gateway.
#[derive(Debug, Clone)]
pub struct GatewayConfig {
    /// Name of the shared topic exchange
    /// Default: "drone"
    pub exchange_name: String,

    /// Options applied to every queue the gateway declares
    /// Default: auto-delete, non-durable
    pub queue_options: QueueOptions,
}

impl Default for GatewayConfig {
    fn default() -> Self {
        Self {
            exchange_name: "drone".to_string(),
            queue_options: QueueOptions::ephemeral(),
        }
    }
}

impl GatewayConfig {
    /// Create a GatewayConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_exchange(mut self, name: impl Into<String>) -> Self {
        self.exchange_name = name.into();
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.exchange_name.trim().is_empty() {
            return Err(GatewayError::Configuration(
                "Exchange name must not be empty".to_string(),
            ));
        }
        Ok(())
    }
}

/// Process-wide handle to the broker and its topic exchange.
///
/// Sessions share one gateway through an `Arc`. The only mutable state is the
/// exchange-asserted flag, so no lock is needed.
pub struct BrokerGateway {
    broker: Arc<dyn Broker>,
    config: GatewayConfig,
    exchange_ready: AtomicBool,
}

impl BrokerGateway {
    /// Create a gateway over any broker implementation.
    pub fn new(broker: Arc<dyn Broker>, config: GatewayConfig) -> Self {
        Self {
            broker,
            config,
            exchange_ready: AtomicBool::new(false),
        }
    }

    /// Name of the shared exchange.
    pub fn exchange_name(&self) -> &str {
        &self.config.exchange_name
    }

    /// Assert the shared topic exchange.
    ///
    /// The first successful assert is remembered; later calls return without
    /// a broker round-trip. A failure is returned to the caller only and the
    /// next call tries again.
    pub async fn ensure_exchange(&self) -> Result<()> {
        if self.exchange_ready.load(Ordering::Acquire) {
            return Ok(());
        }

        let name = self.exchange_name();
        match self
            .broker
            .declare_exchange(name, ExchangeOptions::default())
            .await
        {
            Ok(()) => {
                self.exchange_ready.store(true, Ordering::Release);
                tracing::debug!(exchange = name, "Topic exchange asserted");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(exchange = name, error = %e, "Failed to assert topic exchange");
                Err(e)
            }
        }
    }

    /// Publish to the shared exchange. Fire-and-forget.
    pub async fn publish(&self, routing_key: &str, payload: Bytes) -> Result<()> {
        self.ensure_exchange().await?;
        let size = payload.len();
        self.broker
            .publish(self.exchange_name(), routing_key, payload)
            .await
            .inspect_err(|e| {
                tracing::warn!(routing_key, error = %e, "Publish failed");
            })?;
        tracing::trace!(routing_key, bytes = size, "Published message");
        Ok(())
    }

    /// Declare a queue with the configured options.
    pub async fn declare_queue(&self, name: &str) -> Result<String> {
        self.broker
            .declare_queue(name, self.config.queue_options)
            .await
            .inspect_err(|e| {
                tracing::warn!(queue = name, error = %e, "Queue declaration failed");
            })
    }

    /// Bind a queue to the shared exchange.
    pub async fn bind(&self, queue: &str, routing_key: &str) -> Result<()> {
        self.broker
            .bind_queue(queue, self.exchange_name(), routing_key)
            .await
            .inspect_err(|e| {
                tracing::warn!(queue, routing_key, error = %e, "Queue bind failed");
            })
    }

    /// Start consuming a queue.
    pub async fn consume(&self, queue: &str) -> Result<Consumer> {
        self.broker.consume(queue).await.inspect_err(|e| {
            tracing::warn!(queue, error = %e, "Consume failed");
        })
    }

    /// Cancel a consumer.
    pub async fn cancel(&self, handle: &ConsumerHandle) -> Result<()> {
        self.broker.cancel(handle).await.inspect_err(|e| {
            tracing::warn!(consumer = %handle, error = %e, "Consumer cancel failed");
        })
    }
}
