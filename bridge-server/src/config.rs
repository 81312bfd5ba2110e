//! Server configuration.

use std::net::{IpAddr, Ipv4Addr, SocketAddr};

use broker_gateway::GatewayConfig;
use drone_stream::StreamConfig;

use crate::error::{Result, ServerError};

/// Which broker implementation the server talks to.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BrokerBackend {
    /// In-process topic broker; sessions only see each other's traffic
    Memory,
    /// RabbitMQ-compatible broker at `url`
    Amqp { url: String },
}

/// Configuration for the bridge server
#[derive(Debug, Clone)]
pub struct ServerConfig {
    /// Address the HTTP/WebSocket listener binds to
    /// Default: 0.0.0.0:3000
    pub listen_addr: SocketAddr,

    /// Broker backend
    /// Default: Memory
    pub broker: BrokerBackend,

    /// Shared exchange settings
    pub gateway: GatewayConfig,

    /// Per-session settings
    pub stream: StreamConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: SocketAddr::new(IpAddr::V4(Ipv4Addr::UNSPECIFIED), 3000),
            broker: BrokerBackend::Memory,
            gateway: GatewayConfig::default(),
            stream: StreamConfig::default(),
        }
    }
}

impl ServerConfig {
    /// Create a ServerConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        self.gateway
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;
        self.stream
            .validate()
            .map_err(|e| ServerError::Config(e.to_string()))?;

        if let BrokerBackend::Amqp { url } = &self.broker {
            if !(url.starts_with("amqp://") || url.starts_with("amqps://")) {
                return Err(ServerError::Config(format!(
                    "Broker URL must use the amqp:// or amqps:// scheme: {url}"
                )));
            }
        }

        Ok(())
    }

    pub fn with_listen_addr(mut self, addr: SocketAddr) -> Self {
        self.listen_addr = addr;
        self
    }

    pub fn with_broker(mut self, broker: BrokerBackend) -> Self {
        self.broker = broker;
        self
    }

    pub fn with_exchange(mut self, name: impl Into<String>) -> Self {
        self.gateway = self.gateway.with_exchange(name);
        self
    }

    pub fn with_admin_queue(mut self, name: impl Into<String>) -> Self {
        self.stream = self.stream.with_admin_queue(name);
        self
    }
}
