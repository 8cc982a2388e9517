//! Record values stored by the engine
//!
//! A record is a flat mapping from field name to a scalar. Scalars are the
//! three kinds a browser object store round-trips without loss for this
//! workload: strings, 64-bit floats and booleans. Integers are stored as
//! numbers.

use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::EngineError;

/// A scalar field value.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Bool(bool),
    Number(f64),
    Text(String),
}

impl Value {
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Text(s) => Some(s),
            _ => None,
        }
    }

    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Name of the scalar kind, for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Bool(_) => "boolean",
            Value::Number(_) => "number",
            Value::Text(_) => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::Text(s) => f.write_str(s),
        }
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::Text(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::Text(s)
    }
}

impl From<&String> for Value {
    fn from(s: &String) -> Self {
        Value::Text(s.clone())
    }
}

impl From<f64> for Value {
    fn from(n: f64) -> Self {
        Value::Number(n)
    }
}

impl From<f32> for Value {
    fn from(n: f32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i64> for Value {
    fn from(n: i64) -> Self {
        Value::Number(n as f64)
    }
}

impl From<i32> for Value {
    fn from(n: i32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<u32> for Value {
    fn from(n: u32) -> Self {
        Value::Number(n as f64)
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

/// A stored record: field name to scalar value.
pub type Record = BTreeMap<String, Value>;

/// Build a record from `(field, value)` pairs.
pub fn record<K, V, I>(fields: I) -> Record
where
    K: Into<String>,
    V: Into<Value>,
    I: IntoIterator<Item = (K, V)>,
{
    fields
        .into_iter()
        .map(|(k, v)| (k.into(), v.into()))
        .collect()
}

/// Primary key of a record. Keys are strings and order lexicographically.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Key(String);

impl Key {
    pub fn new(key: impl Into<String>) -> Self {
        Key(key.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Extract a key from a field value. Only strings are valid keys.
    pub fn from_value(value: &Value) -> Result<Self, EngineError> {
        match value {
            Value::Text(s) => Ok(Key(s.clone())),
            other => Err(EngineError::data(format!(
                "a {} is not a valid key",
                other.type_name()
            ))),
        }
    }
}

impl fmt::Display for Key {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for Key {
    fn from(s: &str) -> Self {
        Key(s.to_string())
    }
}

impl From<String> for Key {
    fn from(s: String) -> Self {
        Key(s)
    }
}

impl From<Key> for Value {
    fn from(key: Key) -> Self {
        Value::Text(key.0)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn test_integer_values_are_numbers() {
        assert_eq!(Value::from(3), Value::Number(3.0));
        assert_eq!(Value::from(3i64), Value::from(3.0));
    }

    #[test]
    fn test_key_from_value() {
        assert_eq!(Key::from_value(&Value::from("u1")).unwrap(), Key::from("u1"));
        let err = Key::from_value(&Value::from(1.5)).unwrap_err();
        assert_eq!(err.kind(), crate::ErrorKind::Data);
    }

    #[test]
    fn test_record_json_shape() {
        let r = record([("ID", Value::from("1")), ("Price", Value::from(2.5))]);
        let json = serde_json::to_string(&r).unwrap();
        assert_eq!(json, r#"{"ID":"1","Price":2.5}"#);

        let back: Record = serde_json::from_str(&json).unwrap();
        assert_eq!(back, r);
    }

    #[test]
    fn test_keys_order_lexicographically() {
        let mut keys = vec![Key::from("p3"), Key::from("p1"), Key::from("p2")];
        keys.sort();
        assert_eq!(keys, vec![Key::from("p1"), Key::from("p2"), Key::from("p3")]);
    }
}
