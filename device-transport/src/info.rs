//! Device descriptor returned by the transport

use serde::{Deserialize, Serialize};

/// Static information about a remote device and the server hosting it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    /// Device class name
    pub dev_class: String,
    /// Server instance, e.g. `TangoTest/test`
    pub server_id: String,
    /// Host the server runs on
    pub server_host: String,
    /// Network address of the device (object reference)
    pub address: String,
}
