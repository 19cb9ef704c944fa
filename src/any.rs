// created = "2026-10-17"
// modified = "2026-10-17"

//! JSON-like values stored in shared types.
//!
//! `Any` is what array elements, map values, embeds and formatting
//! attributes hold. It is immutable once inserted; strings, buffers and
//! containers are reference counted so cloning a value out of a document is
//! cheap.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use crate::error::DecodeError;
use crate::updates::varint::{Cursor, write_buf, write_signed, write_string, write_var_u64};

/// A JSON-compatible value, extended with `Undefined`, 64-bit integers and
/// binary buffers.
#[derive(Clone, Debug, PartialEq)]
pub enum Any {
    Null,
    Undefined,
    Bool(bool),
    Number(f64),
    BigInt(i64),
    String(Arc<str>),
    Buffer(Arc<[u8]>),
    Array(Arc<[Any]>),
    Map(Arc<HashMap<String, Any>>),
}

// Value tags, counted down from 127.
const TAG_UNDEFINED: u8 = 127;
const TAG_NULL: u8 = 126;
const TAG_INTEGER: u8 = 125;
const TAG_FLOAT32: u8 = 124;
const TAG_FLOAT64: u8 = 123;
const TAG_BIGINT: u8 = 122;
const TAG_FALSE: u8 = 121;
const TAG_TRUE: u8 = 120;
const TAG_STRING: u8 = 119;
const TAG_MAP: u8 = 118;
const TAG_ARRAY: u8 = 117;
const TAG_BUFFER: u8 = 116;

impl Any {
    /// Append the binary form of this value.
    pub fn encode(&self, buf: &mut Vec<u8>) {
        match self {
            Any::Undefined => buf.push(TAG_UNDEFINED),
            Any::Null => buf.push(TAG_NULL),
            Any::Bool(true) => buf.push(TAG_TRUE),
            Any::Bool(false) => buf.push(TAG_FALSE),
            Any::Number(n) => {
                let integral = n.fract() == 0.0
                    && n.abs() <= i32::MAX as f64
                    && !(*n == 0.0 && n.is_sign_negative());
                if integral {
                    buf.push(TAG_INTEGER);
                    let n = *n as i64;
                    write_signed(buf, n.unsigned_abs(), n < 0);
                } else {
                    buf.push(TAG_FLOAT64);
                    buf.extend_from_slice(&n.to_be_bytes());
                }
            }
            Any::BigInt(n) => {
                buf.push(TAG_BIGINT);
                buf.extend_from_slice(&n.to_be_bytes());
            }
            Any::String(s) => {
                buf.push(TAG_STRING);
                write_string(buf, s);
            }
            Any::Buffer(bytes) => {
                buf.push(TAG_BUFFER);
                write_buf(buf, bytes);
            }
            Any::Array(values) => {
                buf.push(TAG_ARRAY);
                write_var_u64(buf, values.len() as u64);
                for value in values.iter() {
                    value.encode(buf);
                }
            }
            Any::Map(entries) => {
                buf.push(TAG_MAP);
                write_var_u64(buf, entries.len() as u64);
                let mut keys: Vec<&String> = entries.keys().collect();
                keys.sort();
                for key in keys {
                    write_string(buf, key);
                    entries[key].encode(buf);
                }
            }
        }
    }

    /// Read one value.
    pub fn decode(cursor: &mut Cursor<'_>) -> Result<Any, DecodeError> {
        let tag = cursor.read_u8()?;
        let value = match tag {
            TAG_UNDEFINED => Any::Undefined,
            TAG_NULL => Any::Null,
            TAG_TRUE => Any::Bool(true),
            TAG_FALSE => Any::Bool(false),
            TAG_INTEGER => {
                let (magnitude, negative) = cursor.read_signed()?;
                let n = magnitude as f64;
                Any::Number(if negative { -n } else { n })
            }
            TAG_FLOAT32 => {
                let bytes = cursor.read_exact(4)?;
                Any::Number(f32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]) as f64)
            }
            TAG_FLOAT64 => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(cursor.read_exact(8)?);
                Any::Number(f64::from_be_bytes(bytes))
            }
            TAG_BIGINT => {
                let mut bytes = [0u8; 8];
                bytes.copy_from_slice(cursor.read_exact(8)?);
                Any::BigInt(i64::from_be_bytes(bytes))
            }
            TAG_STRING => Any::String(Arc::from(cursor.read_string()?)),
            TAG_BUFFER => Any::Buffer(Arc::from(cursor.read_buf()?)),
            TAG_ARRAY => {
                let len = cursor.read_var_u32()?;
                let mut values = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    values.push(Any::decode(cursor)?);
                }
                Any::Array(Arc::from(values))
            }
            TAG_MAP => {
                let len = cursor.read_var_u32()?;
                let mut entries = HashMap::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    let key = cursor.read_string()?.to_owned();
                    let value = Any::decode(cursor)?;
                    entries.insert(key, value);
                }
                Any::Map(Arc::new(entries))
            }
            other => return Err(DecodeError::UnknownAny(other)),
        };
        return Ok(value);
    }

    /// Convert into a `serde_json` value. `Undefined` becomes `null` and
    /// buffers become arrays of numbers.
    pub fn to_json(&self) -> serde_json::Value {
        use serde_json::Value;
        return match self {
            Any::Null | Any::Undefined => Value::Null,
            Any::Bool(b) => Value::Bool(*b),
            Any::Number(n) => {
                if n.fract() == 0.0 && n.abs() < 9.0e15 {
                    Value::from(*n as i64)
                } else {
                    serde_json::Number::from_f64(*n).map(Value::Number).unwrap_or(Value::Null)
                }
            }
            Any::BigInt(n) => Value::from(*n),
            Any::String(s) => Value::String(s.to_string()),
            Any::Buffer(bytes) => Value::Array(bytes.iter().map(|b| Value::from(*b)).collect()),
            Any::Array(values) => Value::Array(values.iter().map(Any::to_json).collect()),
            Any::Map(entries) => Value::Object(
                entries.iter().map(|(k, v)| (k.clone(), v.to_json())).collect(),
            ),
        };
    }

    /// Borrow the string payload, if this is a string.
    pub fn as_str(&self) -> Option<&str> {
        return match self {
            Any::String(s) => Some(s),
            _ => None,
        };
    }
}

impl From<&serde_json::Value> for Any {
    fn from(value: &serde_json::Value) -> Any {
        use serde_json::Value;
        return match value {
            Value::Null => Any::Null,
            Value::Bool(b) => Any::Bool(*b),
            Value::Number(n) => match n.as_i64() {
                Some(i) if i.unsigned_abs() <= (1u64 << 53) => Any::Number(i as f64),
                Some(i) => Any::BigInt(i),
                None => Any::Number(n.as_f64().unwrap_or(f64::NAN)),
            },
            Value::String(s) => Any::String(Arc::from(s.as_str())),
            Value::Array(values) => Any::Array(values.iter().map(Any::from).collect()),
            Value::Object(entries) => Any::Map(Arc::new(
                entries.iter().map(|(k, v)| (k.clone(), Any::from(v))).collect(),
            )),
        };
    }
}

impl From<serde_json::Value> for Any {
    fn from(value: serde_json::Value) -> Any {
        return Any::from(&value);
    }
}

impl fmt::Display for Any {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match self {
            Any::String(s) => f.write_str(s),
            Any::Undefined => f.write_str("undefined"),
            other => write!(f, "{}", other.to_json()),
        };
    }
}

// ============================================================================
// Conversions
// ============================================================================

impl From<bool> for Any {
    fn from(value: bool) -> Any {
        return Any::Bool(value);
    }
}

impl From<f64> for Any {
    fn from(value: f64) -> Any {
        return Any::Number(value);
    }
}

impl From<f32> for Any {
    fn from(value: f32) -> Any {
        return Any::Number(value as f64);
    }
}

impl From<i32> for Any {
    fn from(value: i32) -> Any {
        return Any::Number(value as f64);
    }
}

impl From<u32> for Any {
    fn from(value: u32) -> Any {
        return Any::Number(value as f64);
    }
}

impl From<i64> for Any {
    fn from(value: i64) -> Any {
        return Any::BigInt(value);
    }
}

impl From<&str> for Any {
    fn from(value: &str) -> Any {
        return Any::String(Arc::from(value));
    }
}

impl From<String> for Any {
    fn from(value: String) -> Any {
        return Any::String(Arc::from(value));
    }
}

impl From<Arc<str>> for Any {
    fn from(value: Arc<str>) -> Any {
        return Any::String(value);
    }
}

impl From<Vec<u8>> for Any {
    fn from(value: Vec<u8>) -> Any {
        return Any::Buffer(Arc::from(value));
    }
}

impl From<Vec<Any>> for Any {
    fn from(value: Vec<Any>) -> Any {
        return Any::Array(Arc::from(value));
    }
}

impl From<HashMap<String, Any>> for Any {
    fn from(value: HashMap<String, Any>) -> Any {
        return Any::Map(Arc::new(value));
    }
}

impl<T: Into<Any>> From<Option<T>> for Any {
    fn from(value: Option<T>) -> Any {
        return match value {
            Some(value) => value.into(),
            None => Any::Null,
        };
    }
}
