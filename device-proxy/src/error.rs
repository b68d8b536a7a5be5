use std::time::Duration;

use device_transport::{DeviceName, TransportError};
use thiserror::Error;

/// Errors returned by the device proxy manager
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ProxyError {
    /// Device unreachable at session creation or call time
    #[error("Connection to device {device} failed: {reason}")]
    Connection { device: DeviceName, reason: String },

    /// Subscription target invalid or the transport refused it
    #[error("Subscription to {device}/{attribute} failed: {reason}")]
    Subscription {
        device: DeviceName,
        attribute: String,
        reason: String,
    },

    /// Device has no attribute with this name
    #[error("Device {device} has no attribute {attribute}")]
    UnknownAttribute {
        device: DeviceName,
        attribute: String,
    },

    /// Device has no command with this name
    #[error("Device {device} has no command {command}")]
    UnknownCommand { device: DeviceName, command: String },

    /// No event arrived for the attribute within the wait window
    #[error("No new event for {device}/{attribute} within {timeout:?}")]
    Timeout {
        device: DeviceName,
        attribute: String,
        timeout: Duration,
    },

    /// Value has no representation in the caller-facing value model
    #[error("Value cannot be represented: {reason}")]
    Serialization { reason: String },

    /// Device answered a remote call with a failure
    #[error("Device {device} reported an error: {reason}")]
    Remote { device: DeviceName, reason: String },

    /// Invalid configuration
    #[error("Configuration error: {0}")]
    Configuration(String),

    /// Reset completed but some subscriptions could not be cancelled
    #[error("Reset left {} subscription(s) unreleased", .failures.len())]
    ResetIncomplete { failures: Vec<String> },
}

impl ProxyError {
    /// Attach device context to a transport failure
    pub(crate) fn from_transport(device: &DeviceName, err: TransportError) -> Self {
        match err {
            TransportError::Connection(reason) => ProxyError::Connection {
                device: device.clone(),
                reason,
            },
            TransportError::UnknownAttribute(attribute) => ProxyError::UnknownAttribute {
                device: device.clone(),
                attribute,
            },
            TransportError::UnknownCommand(command) => ProxyError::UnknownCommand {
                device: device.clone(),
                command,
            },
            TransportError::Subscription(reason)
            | TransportError::Remote(reason)
            | TransportError::Timeout(reason) => ProxyError::Remote {
                device: device.clone(),
                reason,
            },
        }
    }

    /// Attach device and attribute context to a failed subscribe call
    pub(crate) fn subscription(device: &DeviceName, attribute: &str, err: TransportError) -> Self {
        match err {
            TransportError::UnknownAttribute(attribute) => ProxyError::UnknownAttribute {
                device: device.clone(),
                attribute,
            },
            TransportError::Connection(reason) => ProxyError::Connection {
                device: device.clone(),
                reason,
            },
            other => ProxyError::Subscription {
                device: device.clone(),
                attribute: attribute.to_string(),
                reason: other.to_string(),
            },
        }
    }

    /// Whether the failure is the wait-for-event timeout
    pub fn is_timeout(&self) -> bool {
        matches!(self, ProxyError::Timeout { .. })
    }
}

/// Result type for device proxy operations
pub type Result<T> = std::result::Result<T, ProxyError>;
