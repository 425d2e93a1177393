//! Value types for the key-value store

use bytes::Bytes;

/// Represents the different types of values that can be stored
///
/// Only binary-safe strings exist today; commands match on this enum so that
/// adding a variant forces every executor to handle it.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    /// String value (binary-safe)
    String(Bytes),
}

impl Value {
    /// Create a string value
    pub fn string(bytes: impl Into<Bytes>) -> Self {
        Value::String(bytes.into())
    }

    /// Get the type name as reported by `TYPE`
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::String(_) => "string",
        }
    }

    /// Try to get as string bytes
    pub fn as_string(&self) -> Option<&Bytes> {
        match self {
            Value::String(b) => Some(b),
        }
    }
}
