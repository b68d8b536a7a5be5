//! Synchronous remote operations routed through a device session
//!
//! Each call goes straight to the session's connection. Timeouts and retries
//! are left to the transport; failures come back as [`ProxyError`] with the
//! device name attached.

use std::collections::BTreeMap;
use std::time::Duration;

use device_transport::{AttrValue, DeviceInfo};
use tracing::debug;

use crate::error::{ProxyError, Result};
use crate::session::DeviceSession;

impl DeviceSession {
    /// Invoke a command, passing `args` as its single argument when present
    pub fn run_command(&self, command: &str, args: Option<AttrValue>) -> Result<AttrValue> {
        match &args {
            Some(args) => debug!(device = %self.name(), command, args = %args, "running command"),
            None => debug!(device = %self.name(), command, "running command without argument"),
        }
        self.connection
            .invoke_command(command, args)
            .map_err(|err| ProxyError::from_transport(self.name(), err))
    }

    pub fn read_attribute(&self, attribute: &str) -> Result<AttrValue> {
        self.connection
            .read_attribute(attribute)
            .map_err(|err| ProxyError::from_transport(self.name(), err))
    }

    /// Read several attributes of this device in one round trip
    pub fn read_attributes(&self, attributes: &[String]) -> Result<BTreeMap<String, AttrValue>> {
        let readings = self
            .connection
            .read_attributes(attributes)
            .map_err(|err| ProxyError::from_transport(self.name(), err))?;

        Ok(readings
            .into_iter()
            .map(|reading| (reading.name, reading.value))
            .collect())
    }

    pub fn write_attribute(&self, attribute: &str, value: AttrValue) -> Result<()> {
        debug!(device = %self.name(), attribute, value = %value, "writing attribute");
        self.connection
            .write_attribute(attribute, value)
            .map_err(|err| ProxyError::from_transport(self.name(), err))
    }

    pub fn list_attributes(&self) -> Result<Vec<String>> {
        self.connection
            .list_attributes()
            .map_err(|err| ProxyError::from_transport(self.name(), err))
    }

    /// Round-trip time to the device
    pub fn ping(&self) -> Result<Duration> {
        self.connection
            .ping()
            .map_err(|err| ProxyError::from_transport(self.name(), err))
    }

    pub fn device_info(&self) -> Result<DeviceInfo> {
        self.connection
            .info()
            .map_err(|err| ProxyError::from_transport(self.name(), err))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::event_log::Journal;
    use device_transport::memory::{InMemoryTransport, SimulatedDevice};
    use device_transport::{DevState, Transport, TransportError};
    use std::sync::Arc;

    fn session() -> (Arc<DeviceSession>, Arc<SimulatedDevice>) {
        let transport = InMemoryTransport::new();
        let device = transport.add_device(
            SimulatedDevice::new("sys/tg_test/1")
                .with_attribute("ampli", 1.5)
                .with_attribute("State", DevState::On)
                .with_command("DevShort", |args| match args {
                    Some(AttrValue::Long(v)) => Ok(AttrValue::Long(v)),
                    _ => Err(TransportError::Remote("API_IncompatibleCmdArgumentType".into())),
                })
                .with_command("Init", |_| Ok(AttrValue::Null)),
        );
        let session = DeviceSession::new(
            device.name().clone(),
            0,
            transport.connect(device.name()).unwrap(),
            Arc::new(Journal::new(10, 10)),
        );
        (session, device)
    }

    #[test]
    fn test_run_command() {
        let (session, _device) = session();

        assert_eq!(
            session.run_command("DevShort", Some(AttrValue::Long(3))).unwrap(),
            AttrValue::Long(3)
        );
        assert_eq!(session.run_command("Init", None).unwrap(), AttrValue::Null);
    }

    #[test]
    fn test_run_command_errors() {
        let (session, _device) = session();

        assert!(matches!(
            session.run_command("Missing", None),
            Err(ProxyError::UnknownCommand { .. })
        ));
        assert!(matches!(
            session.run_command("DevShort", Some(AttrValue::from("x"))),
            Err(ProxyError::Remote { .. })
        ));
    }

    #[test]
    fn test_read_attributes_returns_map() {
        let (session, _device) = session();

        let values = session
            .read_attributes(&["ampli".to_string(), "State".to_string()])
            .unwrap();
        assert_eq!(values["ampli"], AttrValue::Double(1.5));
        assert_eq!(values["State"], AttrValue::State(DevState::On));
    }

    #[test]
    fn test_write_then_read() {
        let (session, _device) = session();

        session.write_attribute("ampli", AttrValue::Double(9.0)).unwrap();
        assert_eq!(session.read_attribute("ampli").unwrap(), AttrValue::Double(9.0));
        assert!(matches!(
            session.write_attribute("nope", AttrValue::Null),
            Err(ProxyError::UnknownAttribute { .. })
        ));
    }

    #[test]
    fn test_ping_and_info_fail_when_unreachable() {
        let (session, device) = session();
        assert!(session.ping().is_ok());
        assert_eq!(session.device_info().unwrap().dev_class, "SimulatedDevice");

        device.set_reachable(false);
        assert!(matches!(session.ping(), Err(ProxyError::Connection { .. })));
        assert!(matches!(
            session.list_attributes(),
            Err(ProxyError::Connection { .. })
        ));
    }
}
