//! Configuration types for the drone-stream crate
//!
//! Controls the per-session side of the bridge: the shared admin queue and
//! the depth of each session's outbound event channel.

use crate::error::SessionError;

/// Configuration for device stream sessions
#[derive(Debug, Clone)]
pub struct StreamConfig {
    /// Fixed name of the queue shared by every admin session
    /// Default: "admin-drone"
    pub admin_queue_name: String,

    /// Capacity of each session's outbound event channel
    /// Default: 256
    pub outbound_buffer: usize,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            admin_queue_name: "admin-drone".to_string(),
            outbound_buffer: 256,
        }
    }
}

impl StreamConfig {
    /// Create a new StreamConfig with default values
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<(), SessionError> {
        if self.admin_queue_name.trim().is_empty() {
            return Err(SessionError::Configuration(
                "Admin queue name must not be empty".to_string(),
            ));
        }

        if self.outbound_buffer == 0 {
            return Err(SessionError::Configuration(
                "Outbound buffer must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }

    pub fn with_admin_queue(mut self, name: impl Into<String>) -> Self {
        self.admin_queue_name = name.into();
        self
    }

    pub fn with_outbound_buffer(mut self, size: usize) -> Self {
        self.outbound_buffer = size;
        self
    }
}
