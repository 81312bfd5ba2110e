//! Error types for the drone-stream crate.

use broker_gateway::GatewayError;

/// Errors returned by session operations.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    /// The broker rejected or could not complete a request
    #[error("Broker error: {0}")]
    Broker(#[from] GatewayError),

    /// A subscribe batch stopped part way; completed bindings stay registered
    #[error("Subscribe batch failed after {completed} of {planned} bindings: {source}")]
    PartialBatch {
        /// Bindings created before the failure
        completed: usize,
        /// Bindings the batch intended to create
        planned: usize,
        /// The broker failure that stopped the batch
        #[source]
        source: GatewayError,
    },

    /// The client request could not be used
    #[error("Malformed request: {0}")]
    MalformedRequest(String),

    /// Invalid stream configuration
    #[error("Configuration error: {0}")]
    Configuration(String),
}

/// Convenience type alias for Results using SessionError.
pub type Result<T> = std::result::Result<T, SessionError>;
