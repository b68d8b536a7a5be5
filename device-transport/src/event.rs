//! Change events delivered by the transport

use std::fmt;
use std::sync::Arc;

use crate::name::DeviceName;
use crate::value::AttrValue;

/// Opaque handle identifying one change-event subscription
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct SubscriptionId(pub u64);

impl fmt::Display for SubscriptionId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Either the new attribute value or the error stack reported instead
#[derive(Debug, Clone, PartialEq)]
pub enum EventPayload {
    Value(AttrValue),
    Error(Vec<String>),
}

/// A change event pushed by a device for a subscribed attribute
#[derive(Debug, Clone, PartialEq)]
pub struct ChangeEvent {
    pub device: DeviceName,
    pub attribute: String,
    pub payload: EventPayload,
}

impl ChangeEvent {
    pub fn value(device: DeviceName, attribute: impl Into<String>, value: AttrValue) -> Self {
        Self {
            device,
            attribute: attribute.into(),
            payload: EventPayload::Value(value),
        }
    }

    pub fn error(device: DeviceName, attribute: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            device,
            attribute: attribute.into(),
            payload: EventPayload::Error(errors),
        }
    }

    /// Whether the event carries an error indicator instead of a value
    pub fn is_error(&self) -> bool {
        matches!(self.payload, EventPayload::Error(_))
    }
}

/// Callback invoked by the transport for every change event
///
/// May be called from any thread, concurrently for different attributes.
pub type EventCallback = Arc<dyn Fn(ChangeEvent) + Send + Sync>;
