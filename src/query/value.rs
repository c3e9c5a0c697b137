//! Transport-safe cell values.
//!
//! Every value leaving the store passes through [`Value::from_sql`], which is
//! the single place where engine types are mapped onto something a JSON client
//! can read back without losing information.
use base64::{engine::general_purpose::STANDARD, Engine as _};
use rusqlite::types::ValueRef;
use serde::{Deserialize, Serialize};

/// Largest integer a JSON number can carry without rounding in IEEE-754
/// consumers.
pub const MAX_SAFE_INTEGER: i64 = (1 << 53) - 1;

/// Cell value tagged with explicit type information so the wire format stays
/// unambiguous for clients.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "t", content = "v", rename_all = "snake_case")]
pub enum Value {
    /// SQL NULL.
    Null,
    /// Integer within the JSON-safe range.
    Int(i64),
    /// Integer outside the JSON-safe range, as its decimal text.
    BigInt(String),
    /// Finite floating point value.
    Real(f64),
    /// UTF-8 text. Invalid sequences are replaced.
    Text(String),
    /// Binary payload.
    Blob(Opaque),
}

/// Base64-encoded binary payload with its original length.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Opaque {
    /// Length of the decoded bytes.
    pub len: usize,
    /// Standard base64 encoding of the bytes.
    pub base64: String,
}

impl Value {
    /// Converts a borrowed engine value.
    pub fn from_sql(value: ValueRef<'_>) -> Self {
        match value {
            ValueRef::Null => Value::Null,
            ValueRef::Integer(i) => Value::from(i),
            ValueRef::Real(f) => Value::from(f),
            ValueRef::Text(bytes) => Value::Text(String::from_utf8_lossy(bytes).into_owned()),
            ValueRef::Blob(bytes) => Value::from(bytes),
        }
    }

    /// Name of the value's type, used when a column has no declared type.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Int(_) | Value::BigInt(_) => "integer",
            Value::Real(_) => "real",
            Value::Text(_) => "text",
            Value::Blob(_) => "blob",
        }
    }

    /// Returns true for [`Value::Null`].
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Plain-text rendering for terminal output.
    pub fn display(&self) -> String {
        match self {
            Value::Null => "NULL".to_string(),
            Value::Int(i) => i.to_string(),
            Value::BigInt(s) | Value::Text(s) => s.clone(),
            Value::Real(f) => f.to_string(),
            Value::Blob(blob) => format!("<{} bytes>", blob.len),
        }
    }
}

impl From<i64> for Value {
    fn from(value: i64) -> Self {
        if (-MAX_SAFE_INTEGER..=MAX_SAFE_INTEGER).contains(&value) {
            Value::Int(value)
        } else {
            Value::BigInt(value.to_string())
        }
    }
}

impl From<f64> for Value {
    fn from(value: f64) -> Self {
        if value.is_finite() {
            Value::Real(value)
        } else {
            // JSON has no NaN or infinity.
            Value::Text(value.to_string())
        }
    }
}

impl From<&str> for Value {
    fn from(value: &str) -> Self {
        Value::Text(value.to_owned())
    }
}

impl From<String> for Value {
    fn from(value: String) -> Self {
        Value::Text(value)
    }
}

impl From<&[u8]> for Value {
    fn from(value: &[u8]) -> Self {
        Value::Blob(Opaque {
            len: value.len(),
            base64: STANDARD.encode(value),
        })
    }
}

impl<T> From<Option<T>> for Value
where
    T: Into<Value>,
{
    fn from(value: Option<T>) -> Self {
        value.map_or(Value::Null, Into::into)
    }
}
