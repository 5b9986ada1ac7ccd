//! Built-in serialization codecs

use serde_json::Value;

use crate::error::CodecError;

type CodecResult<T> = std::result::Result<T, CodecError>;

// =============================================================================
// str
// =============================================================================

pub(super) fn serialize_str(value: &Value) -> CodecResult<Vec<u8>> {
    match value {
        Value::String(s) => Ok(s.as_bytes().to_vec()),
        other => Err(format!("str format only stores strings, got {}", value_kind(other)).into()),
    }
}

pub(super) fn deserialize_str(bytes: &[u8]) -> CodecResult<Value> {
    let s = std::str::from_utf8(bytes)?;
    Ok(Value::String(s.to_owned()))
}

fn value_kind(value: &Value) -> &'static str {
    match value {
        Value::Null => "null",
        Value::Bool(_) => "a boolean",
        Value::Number(_) => "a number",
        Value::String(_) => "a string",
        Value::Array(_) => "an array",
        Value::Object(_) => "an object",
    }
}

// =============================================================================
// json
// =============================================================================

pub(super) fn serialize_json(value: &Value) -> CodecResult<Vec<u8>> {
    Ok(serde_json::to_vec(value)?)
}

pub(super) fn deserialize_json(bytes: &[u8]) -> CodecResult<Value> {
    Ok(serde_json::from_slice(bytes)?)
}

// =============================================================================
// msgpack
// =============================================================================

#[cfg(feature = "msgpack")]
pub(super) fn serialize_msgpack(value: &Value) -> CodecResult<Vec<u8>> {
    Ok(rmp_serde::to_vec(value)?)
}

#[cfg(feature = "msgpack")]
pub(super) fn deserialize_msgpack(bytes: &[u8]) -> CodecResult<Value> {
    Ok(rmp_serde::from_slice(bytes)?)
}
