//! Per-device session state
//!
//! A [`DeviceSession`] owns the connection to one device together with its
//! subscription table, the latest value seen per attribute and a
//! per-attribute event counter. Change-event callbacks are bound to the
//! session through a weak reference and a subscription ticket: once the
//! subscription is cancelled or the session is retired by a reset, late
//! callbacks find no matching ticket and are dropped.

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};

use device_transport::{
    AttrValue, ChangeEvent, DeviceConnection, DeviceName, EventCallback, EventPayload,
    SubscriptionId,
};
use parking_lot::{Condvar, Mutex, MutexGuard};
use tracing::{debug, info, trace, warn};

use crate::error::{ProxyError, Result};
use crate::event_log::{ErrorRecord, EventRecord, Journal};

/// Local record of one change-event subscription
#[derive(Debug, Clone, Copy)]
struct SubscriptionSlot {
    /// Identifies the callback allowed to apply events for this attribute
    ticket: u64,
    /// Transport handle; `None` while the subscribe call is in flight
    id: Option<SubscriptionId>,
}

/// Cached value, counter and wake-up signal for one attribute
#[derive(Default)]
pub(crate) struct AttributeState {
    pub(crate) latest: Option<AttrValue>,
    pub(crate) count: u64,
    pub(crate) signal: Arc<Condvar>,
}

#[derive(Default)]
pub(crate) struct SessionState {
    retired: bool,
    subscriptions: HashMap<String, SubscriptionSlot>,
    pub(crate) attributes: HashMap<String, AttributeState>,
}

impl SessionState {
    fn accepts(&self, attribute: &str, ticket: u64) -> bool {
        !self.retired
            && self
                .subscriptions
                .get(attribute)
                .map_or(false, |slot| slot.ticket == ticket)
    }

    pub(crate) fn count(&self, attribute: &str) -> u64 {
        self.attributes.get(attribute).map_or(0, |a| a.count)
    }

    /// Drop the attribute's entry if nothing refers to it any more
    ///
    /// An entry is idle when the attribute has no subscription, has never
    /// seen an event and no waiter holds its signal.
    pub(crate) fn release_idle(&mut self, attribute: &str) {
        if self.subscriptions.contains_key(attribute) {
            return;
        }
        let idle = self.attributes.get(attribute).map_or(false, |a| {
            a.count == 0 && a.latest.is_none() && Arc::strong_count(&a.signal) == 1
        });
        if idle {
            self.attributes.remove(attribute);
        }
    }
}

/// Live connection to one device plus its subscription bookkeeping
pub struct DeviceSession {
    name: DeviceName,
    generation: u64,
    pub(crate) connection: Arc<dyn DeviceConnection>,
    journal: Arc<Journal>,
    state: Mutex<SessionState>,
    /// Serializes subscribe/unsubscribe so each attribute has one remote subscription
    subscription_gate: Mutex<()>,
    next_ticket: AtomicU64,
    self_ref: Weak<DeviceSession>,
}

impl DeviceSession {
    pub(crate) fn new(
        name: DeviceName,
        generation: u64,
        connection: Arc<dyn DeviceConnection>,
        journal: Arc<Journal>,
    ) -> Arc<Self> {
        Arc::new_cyclic(|self_ref| Self {
            name,
            generation,
            connection,
            journal,
            state: Mutex::new(SessionState::default()),
            subscription_gate: Mutex::new(()),
            next_ticket: AtomicU64::new(1),
            self_ref: self_ref.clone(),
        })
    }

    pub fn name(&self) -> &DeviceName {
        &self.name
    }

    /// Registry generation this session was created in
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub(crate) fn lock_state(&self) -> MutexGuard<'_, SessionState> {
        self.state.lock()
    }

    /// Subscribe to change events for an attribute
    ///
    /// Idempotent: an existing subscription is reused and its handle
    /// returned, so each attribute has at most one live subscription.
    pub fn subscribe(&self, attribute: &str) -> Result<SubscriptionId> {
        let _gate = self.subscription_gate.lock();

        let ticket = {
            let mut state = self.state.lock();
            if state.retired {
                return Err(ProxyError::Subscription {
                    device: self.name.clone(),
                    attribute: attribute.to_string(),
                    reason: "session was reset".to_string(),
                });
            }
            if let Some(id) = state.subscriptions.get(attribute).and_then(|slot| slot.id) {
                debug!(device = %self.name, attribute, subscription = %id, "reusing existing subscription");
                return Ok(id);
            }

            // Registered before the remote call so events pushed during
            // subscription are not lost
            let ticket = self.next_ticket.fetch_add(1, Ordering::Relaxed);
            state
                .subscriptions
                .insert(attribute.to_string(), SubscriptionSlot { ticket, id: None });
            state.attributes.entry(attribute.to_string()).or_default();
            ticket
        };

        let result = self
            .connection
            .subscribe_change_event(attribute, self.callback(ticket));

        let mut state = self.state.lock();
        match result {
            Ok(id) => {
                if let Some(slot) = state.subscriptions.get_mut(attribute) {
                    slot.id = Some(id);
                }
                info!(
                    device = %self.name,
                    attribute,
                    subscription = %id,
                    "subscribed to change events"
                );
                Ok(id)
            }
            Err(err) => {
                state.subscriptions.remove(attribute);
                state.release_idle(attribute);
                warn!(device = %self.name, attribute, error = %err, "subscribe failed");
                Err(ProxyError::subscription(&self.name, attribute, err))
            }
        }
    }

    /// Cancel the subscription for an attribute; no-op when not subscribed
    ///
    /// The cached value and event counter are kept.
    pub fn unsubscribe(&self, attribute: &str) -> Result<()> {
        let _gate = self.subscription_gate.lock();

        let id = match self
            .state
            .lock()
            .subscriptions
            .get(attribute)
            .and_then(|slot| slot.id)
        {
            Some(id) => id,
            None => {
                trace!(device = %self.name, attribute, "unsubscribe without subscription");
                return Ok(());
            }
        };

        self.connection
            .unsubscribe(id)
            .map_err(|err| ProxyError::from_transport(&self.name, err))?;

        self.state.lock().subscriptions.remove(attribute);
        info!(device = %self.name, attribute, subscription = %id, "unsubscribed");
        Ok(())
    }

    pub fn is_subscribed(&self, attribute: &str) -> bool {
        self.state
            .lock()
            .subscriptions
            .get(attribute)
            .map_or(false, |slot| slot.id.is_some())
    }

    /// Attributes with a live subscription
    pub fn subscribed_attributes(&self) -> Vec<String> {
        let state = self.state.lock();
        let mut attributes: Vec<_> = state
            .subscriptions
            .iter()
            .filter(|(_, slot)| slot.id.is_some())
            .map(|(attr, _)| attr.clone())
            .collect();
        attributes.sort();
        attributes
    }

    /// Latest value delivered by a change event, if any
    pub fn latest_value(&self, attribute: &str) -> Option<AttrValue> {
        self.state
            .lock()
            .attributes
            .get(attribute)
            .and_then(|a| a.latest.clone())
    }

    /// Number of successful change events applied for an attribute
    pub fn event_count(&self, attribute: &str) -> u64 {
        self.state.lock().count(attribute)
    }

    fn callback(&self, ticket: u64) -> EventCallback {
        let session = self.self_ref.clone();
        Arc::new(move |event: ChangeEvent| match session.upgrade() {
            Some(session) => session.apply_event(ticket, event),
            None => trace!(
                device = %event.device,
                attribute = %event.attribute,
                "dropping event for discarded session"
            ),
        })
    }

    /// Apply a change event delivered by the transport
    ///
    /// Cache, counter and event log are updated under the session lock, then
    /// waiters on the attribute are woken. Never calls out to the device.
    fn apply_event(&self, ticket: u64, event: ChangeEvent) {
        let ChangeEvent {
            attribute, payload, ..
        } = event;

        let mut state = self.state.lock();
        if !state.accepts(&attribute, ticket) {
            trace!(device = %self.name, attribute = %attribute, "dropping event from stale subscription");
            return;
        }

        match payload {
            EventPayload::Value(value) => {
                let entry = state.attributes.entry(attribute.clone()).or_default();
                entry.latest = Some(value.clone());
                entry.count += 1;
                trace!(
                    device = %self.name,
                    attribute = %attribute,
                    count = entry.count,
                    value = %value,
                    "applied change event"
                );
                let signal = Arc::clone(&entry.signal);

                self.journal
                    .record_event(EventRecord::new(self.name.clone(), attribute, value));
                signal.notify_all();
            }
            EventPayload::Error(errors) => {
                warn!(
                    device = %self.name,
                    attribute = %attribute,
                    errors = ?errors,
                    "error event received"
                );
                self.journal
                    .record_error(ErrorRecord::new(self.name.clone(), attribute, errors));
            }
        }
    }

    /// Stop accepting events and hand back every live subscription handle
    ///
    /// Waits for an in-flight subscribe or unsubscribe to finish, so a
    /// handle being created is either returned here or never created.
    pub(crate) fn retire(&self) -> Vec<(String, SubscriptionId)> {
        let _gate = self.subscription_gate.lock();
        let mut state = self.state.lock();
        state.retired = true;

        let handles = state
            .subscriptions
            .drain()
            .filter_map(|(attr, slot)| slot.id.map(|id| (attr, id)))
            .collect();

        for attribute in state.attributes.values() {
            attribute.signal.notify_all();
        }
        handles
    }
}

impl fmt::Debug for DeviceSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DeviceSession")
            .field("name", &self.name)
            .field("generation", &self.generation)
            .field("subscriptions", &self.subscribed_attributes())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use device_transport::memory::{InMemoryTransport, SimulatedDevice};
    use device_transport::Transport;
    use std::thread;
    use std::time::Duration;

    fn session_with_device() -> (Arc<DeviceSession>, Arc<SimulatedDevice>, Arc<Journal>) {
        let transport = InMemoryTransport::new();
        let device = transport.add_device(
            SimulatedDevice::new("dev/1")
                .with_attribute("temp", 20.0)
                .with_attribute("pressure", 1.0),
        );
        let journal = Arc::new(Journal::new(100, 100));
        let connection = transport.connect(device.name()).unwrap();
        let session = DeviceSession::new(
            device.name().clone(),
            0,
            connection,
            Arc::clone(&journal),
        );
        (session, device, journal)
    }

    #[test]
    fn test_subscribe_is_idempotent() {
        let (session, device, _journal) = session_with_device();

        let first = session.subscribe("temp").unwrap();
        let second = session.subscribe("temp").unwrap();

        assert_eq!(first, second);
        assert_eq!(device.live_subscriptions("temp"), 1);
        assert!(session.is_subscribed("temp"));
    }

    #[test]
    fn test_events_update_cache_counter_and_log() {
        let (session, device, journal) = session_with_device();
        session.subscribe("temp").unwrap();

        device.push_value("temp", 21.5);
        device.push_value("temp", 22.0);

        assert_eq!(session.latest_value("temp"), Some(AttrValue::Double(22.0)));
        assert_eq!(session.event_count("temp"), 2);
        let values: Vec<_> = journal.events().into_iter().map(|r| r.value).collect();
        assert_eq!(values, vec![AttrValue::Double(21.5), AttrValue::Double(22.0)]);
    }

    #[test]
    fn test_error_events_do_not_touch_cache() {
        let (session, device, journal) = session_with_device();
        session.subscribe("temp").unwrap();

        device.push_value("temp", 21.0);
        device.push_error("temp", "API_AttributeFailed");

        assert_eq!(session.latest_value("temp"), Some(AttrValue::Double(21.0)));
        assert_eq!(session.event_count("temp"), 1);
        assert_eq!(journal.events().len(), 1);
        assert_eq!(journal.errors()[0].errors, vec!["API_AttributeFailed".to_string()]);
    }

    #[test]
    fn test_unsubscribe_without_subscription_is_noop() {
        let (session, _device, journal) = session_with_device();

        session.unsubscribe("temp").unwrap();

        assert!(!session.is_subscribed("temp"));
        assert_eq!(session.event_count("temp"), 0);
        assert_eq!(session.latest_value("temp"), None);
        assert!(journal.events().is_empty());
    }

    #[test]
    fn test_events_after_unsubscribe_are_ignored() {
        let (session, device, _journal) = session_with_device();
        session.subscribe("temp").unwrap();
        device.push_value("temp", 1.0);

        session.unsubscribe("temp").unwrap();
        device.push_value("temp", 2.0);

        assert_eq!(device.live_subscriptions("temp"), 0);
        assert_eq!(session.latest_value("temp"), Some(AttrValue::Double(1.0)));
        assert_eq!(session.event_count("temp"), 1);
    }

    #[test]
    fn test_failed_unsubscribe_keeps_subscription() {
        let (session, device, _journal) = session_with_device();
        session.subscribe("temp").unwrap();
        device.fail_unsubscribe(true);

        assert!(session.unsubscribe("temp").is_err());
        assert!(session.is_subscribed("temp"));

        device.push_value("temp", 5.0);
        assert_eq!(session.event_count("temp"), 1);
    }

    #[test]
    fn test_subscribe_unknown_attribute() {
        let (session, _device, _journal) = session_with_device();

        let err = session.subscribe("missing").unwrap_err();
        assert!(matches!(err, ProxyError::UnknownAttribute { .. }));
        assert!(!session.is_subscribed("missing"));
        assert!(!session.lock_state().attributes.contains_key("missing"));
    }

    #[test]
    fn test_retired_session_drops_late_events() {
        let (session, device, journal) = session_with_device();
        session.subscribe("temp").unwrap();

        let handles = session.retire();
        assert_eq!(handles.len(), 1);

        device.push_value("temp", 30.0);
        assert_eq!(session.event_count("temp"), 0);
        assert!(journal.events().is_empty());
        assert!(session.subscribe("temp").is_err());
    }

    #[test]
    fn test_concurrent_subscribe_creates_one_subscription() {
        let (session, device, _journal) = session_with_device();
        device.set_subscribe_delay(Duration::from_millis(20));

        let handles: Vec<_> = (0..8)
            .map(|_| {
                let session = Arc::clone(&session);
                thread::spawn(move || session.subscribe("pressure").unwrap())
            })
            .collect();
        let ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();

        assert!(ids.windows(2).all(|w| w[0] == w[1]));
        assert_eq!(device.live_subscriptions("pressure"), 1);
    }

    #[test]
    fn test_retire_waits_for_in_flight_subscribe() {
        let (session, device, _journal) = session_with_device();
        device.set_subscribe_delay(Duration::from_millis(100));

        let subscriber = {
            let session = Arc::clone(&session);
            thread::spawn(move || session.subscribe("temp"))
        };
        thread::sleep(Duration::from_millis(30));

        let handles = session.retire();
        let id = subscriber.join().unwrap().unwrap();

        assert_eq!(handles, vec![("temp".to_string(), id)]);
        assert!(session.subscribe("pressure").is_err());
    }
}
