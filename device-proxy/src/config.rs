//! Configuration for the device proxy manager

use std::time::Duration;

use crate::error::{ProxyError, Result};

/// Number of events kept in the event history
pub const DEFAULT_EVENT_LOG_CAPACITY: usize = 100;

/// Number of error-flagged events kept for diagnostics
pub const DEFAULT_ERROR_LOG_CAPACITY: usize = 100;

/// Wait window used by `wait_for_next_event_default`
pub const DEFAULT_WAIT_TIMEOUT: Duration = Duration::from_secs(30);

/// Configuration for the DeviceProxyManager
#[derive(Debug, Clone, PartialEq)]
pub struct ProxyConfig {
    /// Maximum number of successful events kept in the event log
    /// Default: 100
    pub event_log_capacity: usize,

    /// Maximum number of error-flagged events kept for diagnostics
    /// Default: 100
    pub error_log_capacity: usize,

    /// Default wait window for blocking event waits
    /// Default: 30 seconds
    pub default_wait_timeout: Duration,
}

impl Default for ProxyConfig {
    fn default() -> Self {
        Self {
            event_log_capacity: DEFAULT_EVENT_LOG_CAPACITY,
            error_log_capacity: DEFAULT_ERROR_LOG_CAPACITY,
            default_wait_timeout: DEFAULT_WAIT_TIMEOUT,
        }
    }
}

impl ProxyConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Short wait window and small logs, for tests and interactive tools
    pub fn interactive() -> Self {
        Self {
            event_log_capacity: 20,
            error_log_capacity: 20,
            default_wait_timeout: Duration::from_secs(5),
        }
    }

    pub fn with_event_log_capacity(mut self, capacity: usize) -> Self {
        self.event_log_capacity = capacity;
        self
    }

    pub fn with_error_log_capacity(mut self, capacity: usize) -> Self {
        self.error_log_capacity = capacity;
        self
    }

    pub fn with_default_wait_timeout(mut self, timeout: Duration) -> Self {
        self.default_wait_timeout = timeout;
        self
    }

    /// Validate the configuration and return any issues
    pub fn validate(&self) -> Result<()> {
        if self.event_log_capacity == 0 {
            return Err(ProxyError::Configuration(
                "Event log capacity must be greater than 0".to_string(),
            ));
        }

        if self.error_log_capacity == 0 {
            return Err(ProxyError::Configuration(
                "Error log capacity must be greater than 0".to_string(),
            ));
        }

        if self.default_wait_timeout.is_zero() {
            return Err(ProxyError::Configuration(
                "Default wait timeout must be greater than 0".to_string(),
            ));
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = ProxyConfig::default();
        assert_eq!(config.event_log_capacity, 100);
        assert_eq!(config.default_wait_timeout, Duration::from_secs(30));
        assert!(config.validate().is_ok());
        assert!(ProxyConfig::interactive().validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_zero_values() {
        let config = ProxyConfig::default().with_event_log_capacity(0);
        assert!(matches!(config.validate(), Err(ProxyError::Configuration(_))));

        let config = ProxyConfig::default().with_error_log_capacity(0);
        assert!(config.validate().is_err());

        let config = ProxyConfig::default().with_default_wait_timeout(Duration::ZERO);
        assert!(config.validate().is_err());
    }
}
