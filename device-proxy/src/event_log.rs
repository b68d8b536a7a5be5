//! Bounded history of observed events
//!
//! The manager keeps the most recent successful change events, oldest
//! evicted first, plus a separate history of error-flagged events for
//! diagnostics. Both are plain FIFO buffers; the manager owns the lock.

use std::collections::VecDeque;

use chrono::{DateTime, Utc};
use device_transport::{AttrValue, DeviceName};
use parking_lot::Mutex;
use serde::Serialize;

use crate::convert::serialize_lossy;

/// A successfully applied change event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct EventRecord {
    /// When the event was applied
    pub timestamp: DateTime<Utc>,
    pub device: DeviceName,
    pub attribute: String,
    #[serde(serialize_with = "serialize_lossy")]
    pub value: AttrValue,
}

impl EventRecord {
    pub fn new(device: DeviceName, attribute: impl Into<String>, value: AttrValue) -> Self {
        Self {
            timestamp: Utc::now(),
            device,
            attribute: attribute.into(),
            value,
        }
    }
}

/// An error-flagged change event
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ErrorRecord {
    pub timestamp: DateTime<Utc>,
    pub device: DeviceName,
    pub attribute: String,
    /// Error stack reported by the device, outermost first
    pub errors: Vec<String>,
}

impl ErrorRecord {
    pub fn new(device: DeviceName, attribute: impl Into<String>, errors: Vec<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            device,
            attribute: attribute.into(),
            errors,
        }
    }
}

/// Fixed-capacity FIFO; appending to a full log evicts the oldest entry
#[derive(Debug, Clone)]
pub struct BoundedLog<T> {
    records: VecDeque<T>,
    capacity: usize,
}

/// History of successfully applied events
pub type EventLog = BoundedLog<EventRecord>;

/// History of error-flagged events
pub type ErrorLog = BoundedLog<ErrorRecord>;

impl<T: Clone> BoundedLog<T> {
    /// Create an empty log. A zero capacity is raised to one.
    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            records: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Append a record, evicting the oldest one first when full
    pub fn append(&mut self, record: T) {
        if self.records.len() == self.capacity {
            self.records.pop_front();
        }
        self.records.push_back(record);
    }

    /// Independent copy of the records in arrival order
    pub fn snapshot(&self) -> Vec<T> {
        self.records.iter().cloned().collect()
    }

    pub fn reset(&mut self) {
        self.records.clear();
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// Most recently appended record
    pub fn last(&self) -> Option<&T> {
        self.records.back()
    }
}

/// Manager-wide event and error histories, each behind its own lock
#[derive(Debug)]
pub(crate) struct Journal {
    events: Mutex<EventLog>,
    errors: Mutex<ErrorLog>,
}

impl Journal {
    pub(crate) fn new(event_capacity: usize, error_capacity: usize) -> Self {
        Self {
            events: Mutex::new(EventLog::with_capacity(event_capacity)),
            errors: Mutex::new(ErrorLog::with_capacity(error_capacity)),
        }
    }

    pub(crate) fn record_event(&self, record: EventRecord) {
        self.events.lock().append(record);
    }

    pub(crate) fn record_error(&self, record: ErrorRecord) {
        self.errors.lock().append(record);
    }

    pub(crate) fn events(&self) -> Vec<EventRecord> {
        self.events.lock().snapshot()
    }

    pub(crate) fn errors(&self) -> Vec<ErrorRecord> {
        self.errors.lock().snapshot()
    }

    pub(crate) fn reset(&self) {
        self.events.lock().reset();
        self.errors.lock().reset();
    }
}
