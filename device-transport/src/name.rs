//! Device identity type

use serde::{Deserialize, Serialize};
use std::fmt;

/// Name of a remote device, e.g. `sys/tg_test/1`
///
/// Surrounding whitespace is trimmed so names taken from comma separated
/// lists or query strings compare equal to their canonical form.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct DeviceName(String);

impl DeviceName {
    pub fn new(name: impl Into<String>) -> Self {
        let name = name.into();
        let trimmed = name.trim();
        if trimmed.len() == name.len() {
            Self(name)
        } else {
            Self(trimmed.to_string())
        }
    }

    /// Get the name as a string slice
    pub fn as_str(&self) -> &str {
        &self.0
    }

    /// Full name of one of this device's attributes (`device/attribute`)
    pub fn attribute_path(&self, attribute: &str) -> String {
        format!("{}/{}", self.0, attribute)
    }
}

impl fmt::Display for DeviceName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for DeviceName {
    fn from(s: &str) -> Self {
        DeviceName::new(s)
    }
}

impl From<String> for DeviceName {
    fn from(s: String) -> Self {
        DeviceName::new(s)
    }
}

impl From<&DeviceName> for DeviceName {
    fn from(name: &DeviceName) -> Self {
        name.clone()
    }
}

impl AsRef<str> for DeviceName {
    fn as_ref(&self) -> &str {
        &self.0
    }
}
