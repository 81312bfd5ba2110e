//! Error types for the broker gateway.

/// Errors returned by broker operations.
#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    /// The broker could not be reached or rejected the call at the transport level
    #[error("Broker unavailable: {0}")]
    Unavailable(String),

    /// The named exchange has not been declared
    #[error("Exchange not found: {0}")]
    ExchangeNotFound(String),

    /// The named queue has not been declared
    #[error("Queue not found: {0}")]
    QueueNotFound(String),

    /// No active consumer carries this tag
    #[error("Consumer not found: {0}")]
    ConsumerNotFound(String),

    /// Invalid gateway configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using GatewayError.
pub type Result<T> = std::result::Result<T, GatewayError>;
