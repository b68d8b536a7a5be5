//! # Device Proxy
//!
//! A sync-first session manager for remote control-system devices.
//!
//! ## Overview
//!
//! The manager sits between a request-handling layer and a remote-device
//! client library (the [`Transport`]). It keeps one live session per device,
//! manages attribute change-event subscriptions, caches the latest value of
//! every subscribed attribute, records a bounded history of observed events
//! and lets callers block until the next event arrives.
//!
//! ## Key Features
//!
//! - **Sync-First API**: every method blocks; no async runtime required
//! - **Connect Once**: the first reference to a device connects, concurrent first access included
//! - **Idempotent Subscriptions**: at most one live subscription per device attribute
//! - **Atomic Event Application**: cache, counter and history move together
//! - **Notify-Based Waits**: waiters wake on the event itself, not on a polling tick
//! - **Best-Effort Reset**: drops everything, reports what could not be released
//!
//! ## Usage
//!
//! ```rust,ignore
//! use device_proxy::DeviceProxyManager;
//! use std::time::Duration;
//!
//! let manager = DeviceProxyManager::new(transport);
//!
//! // Subscribe and wait for the next change
//! manager.subscribe("dev/1", "temp")?;
//! manager.wait_for_next_event("dev/1", "temp", Duration::from_secs(1))?;
//!
//! println!("latest: {:?}", manager.get_latest_event_value("dev/1", "temp"));
//! for record in manager.get_event_log() {
//!     println!("{} {}/{} = {}", record.timestamp, record.device, record.attribute, record.value);
//! }
//!
//! // Drop every session and subscription
//! let report = manager.reset();
//! assert!(report.is_clean());
//! ```
//!
//! ## Architecture
//!
//! 1. **DeviceRegistry**: name to session map with per-device slots and a reset barrier
//! 2. **DeviceSession**: connection, subscription table, latest values and counters
//! 3. **EventLog**: bounded FIFO of successful events, plus a second one for error events
//! 4. **EventWaiter**: per-attribute condition variable driven by the event counters
//! 5. **CommandFacade**: synchronous reads, writes, commands and pings

pub mod config;
pub mod convert;
pub mod error;
pub mod event_log;
mod facade;
pub mod logging;
pub mod manager;
pub mod registry;
pub mod session;
mod waiter;

// Re-export main types for convenience
pub use config::ProxyConfig;
pub use convert::{command_args, from_json, to_json, to_json_lossy};
pub use error::{ProxyError, Result};
pub use event_log::{BoundedLog, ErrorLog, ErrorRecord, EventLog, EventRecord};
pub use logging::{init_logging, init_logging_from_env, LoggingMode};
pub use manager::DeviceProxyManager;
pub use registry::ResetReport;
pub use session::DeviceSession;

// Re-export the transport contract
pub use device_transport::{
    AttrValue, AttributeReading, ChangeEvent, DevState, DeviceConnection, DeviceInfo, DeviceName,
    EventPayload, SubscriptionId, Transport, TransportError,
};

/// Prelude for convenient imports
pub mod prelude {
    pub use crate::{
        AttrValue, DevState, DeviceName, DeviceProxyManager, ProxyConfig, ProxyError,
        ResetReport, Result, Transport,
    };
}
