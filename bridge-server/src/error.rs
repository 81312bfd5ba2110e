//! Error types for the bridge server.

use broker_gateway::GatewayError;

/// Errors that stop the server from starting.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    /// The listen address could not be bound
    #[error("Failed to bind listener: {0}")]
    Bind(String),

    /// Invalid server configuration
    #[error("Configuration error: {0}")]
    Config(String),

    /// The broker backend could not be set up
    #[error("Gateway error: {0}")]
    Gateway(#[from] GatewayError),
}

/// Convenience type alias for Results using ServerError.
pub type Result<T> = std::result::Result<T, ServerError>;
