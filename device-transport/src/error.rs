//! Error types for the device transport

use thiserror::Error;

/// Errors reported by a transport implementation
#[derive(Debug, Error, Clone, PartialEq)]
pub enum TransportError {
    /// Device could not be reached (at connect time or call time)
    #[error("Connection error: {0}")]
    Connection(String),

    /// The device exposes no attribute with this name
    #[error("Unknown attribute: {0}")]
    UnknownAttribute(String),

    /// The device exposes no command with this name
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    /// Subscription could not be created or cancelled
    #[error("Subscription error: {0}")]
    Subscription(String),

    /// The device answered with a failure
    #[error("Remote error: {0}")]
    Remote(String),

    /// The remote call exceeded the transport's own timeout
    #[error("Remote call timed out: {0}")]
    Timeout(String),
}
