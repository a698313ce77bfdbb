//! Error types for the upnp-eventing crate.

use thiserror::Error;

/// Errors from subscription maintenance operations.
#[derive(Debug, Error)]
pub enum EventingError {
    /// Failed to renew a subscription
    #[error("Renewal failed: {0}")]
    RenewalFailed(String),

    /// Failed to unsubscribe
    #[error("Unsubscribe failed: {0}")]
    UnsubscribeFailed(String),

    /// A network error occurred
    #[error("Network error: {0}")]
    Network(String),
}

/// Convenience type alias for Results using EventingError.
pub type Result<T> = std::result::Result<T, EventingError>;
