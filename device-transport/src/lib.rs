//! Transport contract for remote control-system devices
//!
//! This crate defines the boundary between the device-proxy session manager
//! and the client library that actually talks to remote devices. A
//! [`Transport`] opens one [`DeviceConnection`] per device; the connection
//! performs synchronous reads, writes, command invocations and pings, and
//! registers change-event subscriptions whose callbacks may fire on any
//! thread.
//!
//! Timeouts and retries for individual remote calls belong to the
//! implementation behind these traits; callers never retry on their own.
//!
//! With the `test-support` feature the [`memory`] module provides an
//! in-memory transport with simulated devices.

mod error;
mod event;
mod info;
mod name;
mod value;

#[cfg(feature = "test-support")]
pub mod memory;

pub use error::TransportError;
pub use event::{ChangeEvent, EventCallback, EventPayload, SubscriptionId};
pub use info::DeviceInfo;
pub use name::DeviceName;
pub use value::{AttrValue, AttributeReading, DevState};

use std::sync::Arc;
use std::time::Duration;

/// Result type for transport operations
pub type Result<T> = std::result::Result<T, TransportError>;

/// Opens connections to remote devices by name
pub trait Transport: Send + Sync {
    /// Establish a connection to the named device
    fn connect(&self, name: &DeviceName) -> Result<Arc<dyn DeviceConnection>>;
}

/// A live connection to one remote device
pub trait DeviceConnection: Send + Sync {
    /// Name of the device this connection talks to
    fn name(&self) -> &DeviceName;

    /// Register a change-event subscription for an attribute
    ///
    /// The callback is invoked for every change event until the returned
    /// handle is passed to [`DeviceConnection::unsubscribe`].
    fn subscribe_change_event(
        &self,
        attribute: &str,
        callback: EventCallback,
    ) -> Result<SubscriptionId>;

    /// Cancel a subscription created by `subscribe_change_event`
    fn unsubscribe(&self, id: SubscriptionId) -> Result<()>;

    /// Invoke a command with an optional argument
    fn invoke_command(&self, command: &str, args: Option<AttrValue>) -> Result<AttrValue>;

    fn read_attribute(&self, attribute: &str) -> Result<AttrValue>;

    /// Read several attributes in one round trip
    fn read_attributes(&self, attributes: &[String]) -> Result<Vec<AttributeReading>>;

    fn write_attribute(&self, attribute: &str, value: AttrValue) -> Result<()>;

    fn list_attributes(&self) -> Result<Vec<String>>;

    /// Round-trip time to the device
    fn ping(&self) -> Result<Duration>;

    fn info(&self) -> Result<DeviceInfo>;
}
