//! Throttle error types

use thiserror::Error;

/// Errors that can occur while building or driving a throttle
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ThrottleError {
    #[error("max_per_interval must be at least 1")]
    ZeroCapacity,

    #[error("interval must be greater than zero after normalization (configured {interval_ms}ms)")]
    ZeroInterval { interval_ms: u64 },

    #[error("Work item panicked: {0}")]
    Panicked(String),

    #[error("Work item dropped before it settled")]
    Dropped,
}

impl ThrottleError {
    /// Check if this is a construction-time error
    pub fn is_config_error(&self) -> bool {
        matches!(self, ThrottleError::ZeroCapacity | ThrottleError::ZeroInterval { .. })
    }
}
