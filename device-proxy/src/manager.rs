//! Sync-first device proxy manager
//!
//! The single entry point the request layer talks to. Every method is
//! blocking and safe to call from any number of threads; construct one
//! manager per bridge and share it by reference (or `Arc`).

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use device_transport::{AttrValue, DeviceInfo, DeviceName, SubscriptionId, Transport};
use serde_json::Value;
use tracing::debug;

use crate::config::ProxyConfig;
use crate::convert::{command_args, to_json_lossy};
use crate::error::Result;
use crate::event_log::{ErrorRecord, EventRecord, Journal};
use crate::registry::{DeviceRegistry, ResetReport};
use crate::session::DeviceSession;

/// Session manager for remote control-system devices
///
/// Keeps one session per device, at most one change-event subscription per
/// attribute, the latest value and event count of every subscribed
/// attribute, and a bounded history of observed events.
///
/// # Example
///
/// ```rust,ignore
/// use device_proxy::DeviceProxyManager;
/// use std::time::Duration;
///
/// let manager = DeviceProxyManager::new(transport);
///
/// manager.subscribe("dev/1", "temp")?;
/// manager.wait_for_next_event("dev/1", "temp", Duration::from_secs(1))?;
///
/// if let Some(value) = manager.get_latest_event_value("dev/1", "temp") {
///     println!("temp is now {}", value);
/// }
/// ```
pub struct DeviceProxyManager {
    config: ProxyConfig,
    journal: Arc<Journal>,
    registry: DeviceRegistry,
}

impl DeviceProxyManager {
    /// Create a manager with the default configuration
    pub fn new(transport: Arc<dyn Transport>) -> Self {
        Self::build(transport, ProxyConfig::default())
    }

    /// Create a manager with a custom configuration
    ///
    /// Fails with [`ProxyError::Configuration`](crate::ProxyError::Configuration)
    /// if the configuration is invalid.
    pub fn with_config(transport: Arc<dyn Transport>, config: ProxyConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self::build(transport, config))
    }

    fn build(transport: Arc<dyn Transport>, config: ProxyConfig) -> Self {
        let journal = Arc::new(Journal::new(
            config.event_log_capacity,
            config.error_log_capacity,
        ));
        let registry = DeviceRegistry::new(transport, Arc::clone(&journal));

        debug!(
            event_log_capacity = config.event_log_capacity,
            error_log_capacity = config.error_log_capacity,
            "device proxy manager created"
        );

        Self {
            config,
            journal,
            registry,
        }
    }

    pub fn config(&self) -> &ProxyConfig {
        &self.config
    }

    /// Get the session for a device, connecting on first use
    pub fn get_or_create(&self, device: impl Into<DeviceName>) -> Result<Arc<DeviceSession>> {
        self.registry.get_or_create(&device.into())
    }

    /// Names of devices with a live session
    pub fn devices(&self) -> Vec<DeviceName> {
        self.registry.devices()
    }

    // ========================================================================
    // Subscriptions
    // ========================================================================

    /// Subscribe to change events for an attribute (idempotent)
    pub fn subscribe(
        &self,
        device: impl Into<DeviceName>,
        attribute: &str,
    ) -> Result<SubscriptionId> {
        self.registry.subscribe(&device.into(), attribute)
    }

    /// Cancel a subscription; no-op when there is none
    pub fn unsubscribe(&self, device: impl Into<DeviceName>, attribute: &str) -> Result<()> {
        self.registry.unsubscribe(&device.into(), attribute)
    }

    pub fn is_subscribed(&self, device: impl Into<DeviceName>, attribute: &str) -> bool {
        self.registry
            .get(&device.into())
            .map(|session| session.is_subscribed(attribute))
            .unwrap_or(false)
    }

    // ========================================================================
    // Remote operations
    // ========================================================================

    /// Invoke a command on a device
    pub fn run_command(
        &self,
        device: impl Into<DeviceName>,
        command: &str,
        args: Option<AttrValue>,
    ) -> Result<AttrValue> {
        self.get_or_create(device)?.run_command(command, args)
    }

    /// Invoke a command with a JSON argument and return a JSON result
    ///
    /// Missing, null and empty-string arguments call the command without
    /// an argument. A result with no JSON shape comes back as its text.
    pub fn run_command_json(
        &self,
        device: impl Into<DeviceName>,
        command: &str,
        args: Option<&Value>,
    ) -> Result<Value> {
        let result = self.run_command(device, command, command_args(args, false))?;
        Ok(to_json_lossy(&result))
    }

    /// Like [`run_command_json`](Self::run_command_json), but the argument
    /// is sent as its JSON text, for commands taking a JSON document
    pub fn run_command_json_encoded(
        &self,
        device: impl Into<DeviceName>,
        command: &str,
        args: Option<&Value>,
    ) -> Result<Value> {
        let result = self.run_command(device, command, command_args(args, true))?;
        Ok(to_json_lossy(&result))
    }

    pub fn read_attribute(&self, device: impl Into<DeviceName>, attribute: &str) -> Result<AttrValue> {
        self.get_or_create(device)?.read_attribute(attribute)
    }

    /// Read several attributes of one device in a single round trip
    pub fn read_attributes(
        &self,
        device: impl Into<DeviceName>,
        attributes: &[String],
    ) -> Result<BTreeMap<String, AttrValue>> {
        self.get_or_create(device)?.read_attributes(attributes)
    }

    pub fn write_attribute(
        &self,
        device: impl Into<DeviceName>,
        attribute: &str,
        value: impl Into<AttrValue>,
    ) -> Result<()> {
        self.get_or_create(device)?
            .write_attribute(attribute, value.into())
    }

    pub fn list_attributes(&self, device: impl Into<DeviceName>) -> Result<Vec<String>> {
        self.get_or_create(device)?.list_attributes()
    }

    /// Round-trip time to a device
    pub fn ping(&self, device: impl Into<DeviceName>) -> Result<Duration> {
        self.get_or_create(device)?.ping()
    }

    /// Ping several devices; each result stands on its own
    pub fn ping_many<I, D>(&self, devices: I) -> Vec<(DeviceName, Result<Duration>)>
    where
        I: IntoIterator<Item = D>,
        D: Into<DeviceName>,
    {
        devices
            .into_iter()
            .map(|device| {
                let name = device.into();
                let result = self.ping(&name);
                (name, result)
            })
            .collect()
    }

    pub fn get_device_info(&self, device: impl Into<DeviceName>) -> Result<DeviceInfo> {
        self.get_or_create(device)?.device_info()
    }

    // ========================================================================
    // Observed events
    // ========================================================================

    /// Latest value delivered by a change event, if any
    ///
    /// Never connects: a device without a session has no latest value.
    pub fn get_latest_event_value(
        &self,
        device: impl Into<DeviceName>,
        attribute: &str,
    ) -> Option<AttrValue> {
        self.registry
            .get(&device.into())
            .and_then(|session| session.latest_value(attribute))
    }

    /// Latest event value as JSON; `null` when none was observed
    pub fn get_latest_event_json(&self, device: impl Into<DeviceName>, attribute: &str) -> Value {
        self.get_latest_event_value(device, attribute)
            .map(|value| to_json_lossy(&value))
            .unwrap_or(Value::Null)
    }

    /// Number of successful events applied for an attribute
    pub fn event_count(&self, device: impl Into<DeviceName>, attribute: &str) -> u64 {
        self.registry
            .get(&device.into())
            .map(|session| session.event_count(attribute))
            .unwrap_or(0)
    }

    /// Snapshot of the event history, oldest first
    pub fn get_event_log(&self) -> Vec<EventRecord> {
        self.journal.events()
    }

    /// Snapshot of recent error-flagged events, oldest first
    pub fn recent_errors(&self) -> Vec<ErrorRecord> {
        self.journal.errors()
    }

    /// Block until the next change event for an attribute or time out
    ///
    /// Fails with [`ProxyError::Timeout`](crate::ProxyError::Timeout) when
    /// nothing arrives in time, which is always the case for an attribute
    /// that is not subscribed.
    pub fn wait_for_next_event(
        &self,
        device: impl Into<DeviceName>,
        attribute: &str,
        timeout: Duration,
    ) -> Result<()> {
        let session = self.get_or_create(device)?;
        session.wait_for_next(attribute, timeout)
    }

    /// [`wait_for_next_event`](Self::wait_for_next_event) with the configured default timeout
    pub fn wait_for_next_event_default(
        &self,
        device: impl Into<DeviceName>,
        attribute: &str,
    ) -> Result<()> {
        self.wait_for_next_event(device, attribute, self.config.default_wait_timeout)
    }

    // ========================================================================
    // Lifecycle
    // ========================================================================

    /// Cancel every subscription, drop every session and clear the logs
    ///
    /// Best-effort: unsubscribe failures are reported in the returned
    /// [`ResetReport`] and never stop the reset.
    pub fn reset(&self) -> ResetReport {
        self.registry.reset()
    }

    /// Registry generation; increases with every reset
    pub fn generation(&self) -> u64 {
        self.registry.generation()
    }
}

impl std::fmt::Debug for DeviceProxyManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DeviceProxyManager")
            .field("config", &self.config)
            .field("registry", &self.registry)
            .finish()
    }
}

impl Drop for DeviceProxyManager {
    fn drop(&mut self) {
        debug!(
            devices = self.registry.devices().len(),
            "DeviceProxyManager dropping; remote subscriptions are left to the transport"
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::ProxyError;
    use device_transport::memory::{InMemoryTransport, SimulatedDevice};
    use serde_json::json;

    fn manager() -> (DeviceProxyManager, Arc<InMemoryTransport>) {
        let transport = Arc::new(InMemoryTransport::new());
        transport.add_device(
            SimulatedDevice::new("dev/1")
                .with_attribute("temp", 20.0)
                .with_command("Echo", |args| Ok(args.unwrap_or(AttrValue::Null)))
                .with_command("Spectrum", |_| Ok(AttrValue::Double(f64::INFINITY))),
        );
        let manager = DeviceProxyManager::new(Arc::clone(&transport) as Arc<dyn Transport>);
        (manager, transport)
    }

    #[test]
    fn test_invalid_config_rejected() {
        let transport = Arc::new(InMemoryTransport::new());
        let result = DeviceProxyManager::with_config(
            transport,
            ProxyConfig::default().with_event_log_capacity(0),
        );
        assert!(matches!(result, Err(ProxyError::Configuration(_))));
    }

    #[test]
    fn test_queries_do_not_connect() {
        let (manager, transport) = manager();

        assert_eq!(manager.get_latest_event_value("dev/1", "temp"), None);
        assert_eq!(manager.get_latest_event_json("dev/1", "temp"), Value::Null);
        assert_eq!(manager.event_count("dev/1", "temp"), 0);
        assert!(!manager.is_subscribed("dev/1", "temp"));
        assert_eq!(transport.connect_count("dev/1"), 0);
        assert!(manager.devices().is_empty());
    }

    #[test]
    fn test_run_command_json() {
        let (manager, _transport) = manager();

        let echoed = manager
            .run_command_json("dev/1", "Echo", Some(&json!([1, 2, 3])))
            .unwrap();
        assert_eq!(echoed, json!([1, 2, 3]));

        let empty = manager.run_command_json("dev/1", "Echo", Some(&json!(""))).unwrap();
        assert_eq!(empty, Value::Null);

        let fallback = manager.run_command_json("dev/1", "Spectrum", None).unwrap();
        assert_eq!(fallback, json!("inf"));
    }

    #[test]
    fn test_run_command_json_encoded_sends_text() {
        let (manager, _transport) = manager();

        let echoed = manager
            .run_command_json_encoded("dev/1", "Echo", Some(&json!({"gain": 2})))
            .unwrap();
        assert_eq!(echoed, json!(r#"{"gain":2}"#));

        let none = manager
            .run_command_json_encoded("dev/1", "Echo", Some(&Value::Null))
            .unwrap();
        assert_eq!(none, Value::Null);
    }

    #[test]
    fn test_latest_event_json() {
        let (manager, transport) = manager();
        manager.subscribe("dev/1", "temp").unwrap();

        transport.device("dev/1").unwrap().push_value("temp", 21.5);

        assert_eq!(manager.get_latest_event_json("dev/1", "temp"), json!(21.5));
        assert_eq!(manager.event_count("dev/1", "temp"), 1);
        assert!(manager.is_subscribed("dev/1", "temp"));
    }

    #[test]
    fn test_default_wait_uses_config() {
        let transport = Arc::new(InMemoryTransport::new());
        transport.add_device(SimulatedDevice::new("dev/1").with_attribute("temp", 0.0));
        let manager = DeviceProxyManager::with_config(
            transport,
            ProxyConfig::default().with_default_wait_timeout(Duration::from_millis(30)),
        )
        .unwrap();

        let err = manager.wait_for_next_event_default("dev/1", "temp").unwrap_err();
        assert!(matches!(err, ProxyError::Timeout { timeout, .. } if timeout == Duration::from_millis(30)));
    }
}
