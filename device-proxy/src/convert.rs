//! Conversion between device values and the caller-facing JSON model
//!
//! Request handlers speak JSON. Most device values map onto it directly,
//! but non-finite doubles and opaque encoded payloads do not. Those are
//! rendered as text by [`to_json_lossy`] so a remote result is always
//! returned to the caller, never dropped.

use device_transport::AttrValue;
use serde::Serialize;
use serde_json::{Number, Value};
use tracing::debug;

use crate::error::{ProxyError, Result};

/// Convert a device value to JSON, failing if it has no JSON shape
pub fn to_json(value: &AttrValue) -> Result<Value> {
    let json = match value {
        AttrValue::Null => Value::Null,
        AttrValue::Bool(v) => Value::Bool(*v),
        AttrValue::Long(v) => Value::from(*v),
        AttrValue::Double(v) => Number::from_f64(*v).map(Value::Number).ok_or_else(|| {
            ProxyError::Serialization {
                reason: format!("non-finite number {}", v),
            }
        })?,
        AttrValue::String(s) => Value::String(s.clone()),
        AttrValue::State(state) => Value::String(state.as_str().to_string()),
        AttrValue::Array(items) => Value::Array(items.iter().map(to_json).collect::<Result<_>>()?),
        AttrValue::Encoded { format, data } => {
            return Err(ProxyError::Serialization {
                reason: format!("encoded {} payload of {} bytes", format, data.len()),
            })
        }
    };
    Ok(json)
}

/// Convert a device value to JSON, falling back to its text form
pub fn to_json_lossy(value: &AttrValue) -> Value {
    match to_json(value) {
        Ok(json) => json,
        Err(err) => {
            debug!(error = %err, "using text representation");
            Value::String(value.to_string())
        }
    }
}

/// Convert a JSON request value into a device value
///
/// JSON objects have no counterpart in the device value model and are
/// passed on as their JSON text.
pub fn from_json(value: &Value) -> AttrValue {
    match value {
        Value::Null => AttrValue::Null,
        Value::Bool(v) => AttrValue::Bool(*v),
        Value::Number(n) => match n.as_i64() {
            Some(v) => AttrValue::Long(v),
            None => AttrValue::Double(n.as_f64().unwrap_or(f64::NAN)),
        },
        Value::String(s) => AttrValue::String(s.clone()),
        Value::Array(items) => AttrValue::Array(items.iter().map(from_json).collect()),
        Value::Object(_) => AttrValue::String(value.to_string()),
    }
}

/// Build a command argument from an optional JSON request field
///
/// Missing, null and empty-string arguments mean "call without argument".
/// With `encode_as_string` the argument is sent as its JSON text, for
/// commands that take a JSON document as a string argument.
pub fn command_args(args: Option<&Value>, encode_as_string: bool) -> Option<AttrValue> {
    match args {
        None | Some(Value::Null) => None,
        Some(Value::String(s)) if s.is_empty() => None,
        Some(value) if encode_as_string => Some(AttrValue::String(value.to_string())),
        Some(value) => Some(from_json(value)),
    }
}

pub(crate) fn serialize_lossy<S>(value: &AttrValue, serializer: S) -> std::result::Result<S::Ok, S::Error>
where
    S: serde::Serializer,
{
    to_json_lossy(value).serialize(serializer)
}
