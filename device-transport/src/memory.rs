//! In-memory transport with simulated devices
//!
//! Used by tests and demos in place of a real control-system client. Change
//! events are pushed explicitly with [`SimulatedDevice::push_value`] or
//! implicitly by writing an attribute, and are delivered on the calling
//! thread after every internal lock has been released.

use std::collections::{BTreeMap, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use tracing::{debug, trace};

use crate::{
    AttrValue, AttributeReading, ChangeEvent, DeviceConnection, DeviceInfo, DeviceName,
    EventCallback, Result, SubscriptionId, Transport, TransportError,
};

type CommandHandler = Arc<dyn Fn(Option<AttrValue>) -> Result<AttrValue> + Send + Sync>;

#[derive(Default)]
struct SimState {
    attributes: BTreeMap<String, AttrValue>,
    commands: HashMap<String, CommandHandler>,
    subscriptions: HashMap<SubscriptionId, (String, EventCallback)>,
}

/// A simulated remote device
pub struct SimulatedDevice {
    name: DeviceName,
    info: DeviceInfo,
    state: Mutex<SimState>,
    next_subscription: AtomicU64,
    reachable: AtomicBool,
    fail_unsubscribe: AtomicBool,
    subscribe_delay: Mutex<Duration>,
}

impl SimulatedDevice {
    pub fn new(name: impl Into<DeviceName>) -> Self {
        let name = name.into();
        let info = DeviceInfo {
            dev_class: "SimulatedDevice".to_string(),
            server_id: format!("SimulatedServer/{}", name),
            server_host: "localhost".to_string(),
            address: format!("sim://localhost/{}", name),
        };
        Self {
            name,
            info,
            state: Mutex::new(SimState::default()),
            next_subscription: AtomicU64::new(1),
            reachable: AtomicBool::new(true),
            fail_unsubscribe: AtomicBool::new(false),
            subscribe_delay: Mutex::new(Duration::ZERO),
        }
    }

    pub fn with_attribute(self, attribute: impl Into<String>, value: impl Into<AttrValue>) -> Self {
        self.state
            .lock()
            .attributes
            .insert(attribute.into(), value.into());
        self
    }

    pub fn with_command<F>(self, command: impl Into<String>, handler: F) -> Self
    where
        F: Fn(Option<AttrValue>) -> Result<AttrValue> + Send + Sync + 'static,
    {
        self.state
            .lock()
            .commands
            .insert(command.into(), Arc::new(handler));
        self
    }

    pub fn with_info(mut self, info: DeviceInfo) -> Self {
        self.info = info;
        self
    }

    pub fn name(&self) -> &DeviceName {
        &self.name
    }

    /// Make every call on this device fail with a connection error
    pub fn set_reachable(&self, reachable: bool) {
        self.reachable.store(reachable, Ordering::SeqCst);
    }

    /// Make `unsubscribe` fail while set
    pub fn fail_unsubscribe(&self, fail: bool) {
        self.fail_unsubscribe.store(fail, Ordering::SeqCst);
    }

    /// Delay every `subscribe_change_event` call by `delay`
    pub fn set_subscribe_delay(&self, delay: Duration) {
        *self.subscribe_delay.lock() = delay;
    }

    /// Number of live subscriptions for an attribute
    pub fn live_subscriptions(&self, attribute: &str) -> usize {
        self.state
            .lock()
            .subscriptions
            .values()
            .filter(|(attr, _)| attr == attribute)
            .count()
    }

    /// Number of live subscriptions across all attributes
    pub fn subscription_count(&self) -> usize {
        self.state.lock().subscriptions.len()
    }

    /// Current stored value of an attribute
    pub fn attribute(&self, attribute: &str) -> Option<AttrValue> {
        self.state.lock().attributes.get(attribute).cloned()
    }

    /// Store a new value and deliver a change event to every subscriber
    pub fn push_value(&self, attribute: &str, value: impl Into<AttrValue>) {
        let value = value.into();
        let callbacks = {
            let mut state = self.state.lock();
            state
                .attributes
                .insert(attribute.to_string(), value.clone());
            Self::callbacks_for(&state, attribute)
        };
        trace!(device = %self.name, attribute, subscribers = callbacks.len(), "pushing change event");
        for callback in callbacks {
            callback(ChangeEvent::value(self.name.clone(), attribute, value.clone()));
        }
    }

    /// Deliver an error-flagged event to every subscriber
    pub fn push_error(&self, attribute: &str, reason: impl Into<String>) {
        let reason = reason.into();
        let callbacks = Self::callbacks_for(&self.state.lock(), attribute);
        for callback in callbacks {
            callback(ChangeEvent::error(
                self.name.clone(),
                attribute,
                vec![reason.clone()],
            ));
        }
    }

    fn callbacks_for(state: &SimState, attribute: &str) -> Vec<EventCallback> {
        let mut subs: Vec<_> = state
            .subscriptions
            .iter()
            .filter(|(_, (attr, _))| attr == attribute)
            .collect();
        subs.sort_by_key(|(id, _)| **id);
        subs.into_iter().map(|(_, (_, cb))| Arc::clone(cb)).collect()
    }

    fn ensure_reachable(&self) -> Result<()> {
        if self.reachable.load(Ordering::SeqCst) {
            Ok(())
        } else {
            Err(TransportError::Connection(format!(
                "device {} is not exported",
                self.name
            )))
        }
    }
}

impl std::fmt::Debug for SimulatedDevice {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SimulatedDevice")
            .field("name", &self.name)
            .field("subscriptions", &self.subscription_count())
            .finish()
    }
}

/// Transport backed by simulated devices held in memory
#[derive(Default)]
pub struct InMemoryTransport {
    devices: RwLock<HashMap<DeviceName, Arc<SimulatedDevice>>>,
    connects: Mutex<HashMap<DeviceName, usize>>,
    connect_delay: Mutex<Duration>,
}

impl InMemoryTransport {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a device, returning a handle used to drive it
    pub fn add_device(&self, device: SimulatedDevice) -> Arc<SimulatedDevice> {
        let device = Arc::new(device);
        self.devices
            .write()
            .insert(device.name().clone(), Arc::clone(&device));
        device
    }

    pub fn device(&self, name: impl Into<DeviceName>) -> Option<Arc<SimulatedDevice>> {
        self.devices.read().get(&name.into()).cloned()
    }

    /// Number of successful `connect` calls made for a device
    pub fn connect_count(&self, name: impl Into<DeviceName>) -> usize {
        self.connects.lock().get(&name.into()).copied().unwrap_or(0)
    }

    /// Delay every `connect` call by `delay`
    pub fn set_connect_delay(&self, delay: Duration) {
        *self.connect_delay.lock() = delay;
    }
}

impl Transport for InMemoryTransport {
    fn connect(&self, name: &DeviceName) -> Result<Arc<dyn DeviceConnection>> {
        let delay = *self.connect_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let device = self.device(name).ok_or_else(|| {
            TransportError::Connection(format!("device {} not defined in the database", name))
        })?;
        device.ensure_reachable()?;

        let count = {
            let mut connects = self.connects.lock();
            let count = connects.entry(name.clone()).or_insert(0);
            *count += 1;
            *count
        };
        debug!(device = %name, connection = count, "simulated connection established");

        Ok(Arc::new(SimulatedConnection { device }))
    }
}

struct SimulatedConnection {
    device: Arc<SimulatedDevice>,
}

impl DeviceConnection for SimulatedConnection {
    fn name(&self) -> &DeviceName {
        self.device.name()
    }

    fn subscribe_change_event(
        &self,
        attribute: &str,
        callback: EventCallback,
    ) -> Result<SubscriptionId> {
        self.device.ensure_reachable()?;
        if !self.device.state.lock().attributes.contains_key(attribute) {
            return Err(TransportError::UnknownAttribute(attribute.to_string()));
        }

        let delay = *self.device.subscribe_delay.lock();
        if !delay.is_zero() {
            thread::sleep(delay);
        }

        let id = SubscriptionId(self.device.next_subscription.fetch_add(1, Ordering::SeqCst));
        self.device
            .state
            .lock()
            .subscriptions
            .insert(id, (attribute.to_string(), callback));
        Ok(id)
    }

    fn unsubscribe(&self, id: SubscriptionId) -> Result<()> {
        self.device.ensure_reachable()?;
        if self.device.fail_unsubscribe.load(Ordering::SeqCst) {
            return Err(TransportError::Subscription(format!(
                "failed to unsubscribe event {}",
                id
            )));
        }
        match self.device.state.lock().subscriptions.remove(&id) {
            Some(_) => Ok(()),
            None => Err(TransportError::Subscription(format!(
                "event {} is not subscribed",
                id
            ))),
        }
    }

    fn invoke_command(&self, command: &str, args: Option<AttrValue>) -> Result<AttrValue> {
        self.device.ensure_reachable()?;
        let handler = self
            .device
            .state
            .lock()
            .commands
            .get(command)
            .cloned()
            .ok_or_else(|| TransportError::UnknownCommand(command.to_string()))?;
        handler(args)
    }

    fn read_attribute(&self, attribute: &str) -> Result<AttrValue> {
        self.device.ensure_reachable()?;
        self.device
            .attribute(attribute)
            .ok_or_else(|| TransportError::UnknownAttribute(attribute.to_string()))
    }

    fn read_attributes(&self, attributes: &[String]) -> Result<Vec<AttributeReading>> {
        self.device.ensure_reachable()?;
        let state = self.device.state.lock();
        attributes
            .iter()
            .map(|name| {
                state
                    .attributes
                    .get(name)
                    .map(|value| AttributeReading::new(name.clone(), value.clone()))
                    .ok_or_else(|| TransportError::UnknownAttribute(name.clone()))
            })
            .collect()
    }

    fn write_attribute(&self, attribute: &str, value: AttrValue) -> Result<()> {
        self.device.ensure_reachable()?;
        let changed = {
            let state = self.device.state.lock();
            match state.attributes.get(attribute) {
                Some(current) => *current != value,
                None => return Err(TransportError::UnknownAttribute(attribute.to_string())),
            }
        };
        if changed {
            self.device.push_value(attribute, value);
        }
        Ok(())
    }

    fn list_attributes(&self) -> Result<Vec<String>> {
        self.device.ensure_reachable()?;
        Ok(self.device.state.lock().attributes.keys().cloned().collect())
    }

    fn ping(&self) -> Result<Duration> {
        self.device.ensure_reachable()?;
        Ok(Duration::from_micros(80))
    }

    fn info(&self) -> Result<DeviceInfo> {
        self.device.ensure_reachable()?;
        Ok(self.device.info.clone())
    }
}
