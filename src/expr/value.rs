//! Runtime values for FragDB
//!
//! A [`Value`] is both the result of evaluating an expression and the decoded
//! content of a stored record field.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::{Error, Result};

/// A value produced by the evaluator or read from a record
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum Value {
    /// Double-precision floating point
    Double(f64),
    /// Signed 64-bit integer
    Long(i64),
    /// Text
    Str(String),
    /// Opaque bytes, shared with the caller's argument buffer
    Binary(#[serde(with = "bytes_serde")] Bytes),
}

mod bytes_serde {
    use bytes::Bytes;
    use serde::{Deserialize, Deserializer, Serializer};

    pub fn serialize<S: Serializer>(b: &Bytes, s: S) -> Result<S::Ok, S::Error> {
        s.serialize_bytes(b)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(d: D) -> Result<Bytes, D::Error> {
        Vec::<u8>::deserialize(d).map(Bytes::from)
    }
}

// Doubles compare bitwise so values can key hash maps
impl PartialEq for Value {
    fn eq(&self, other: &Self) -> bool {
        match (self, other) {
            (Value::Double(a), Value::Double(b)) => a.to_bits() == b.to_bits(),
            (Value::Long(a), Value::Long(b)) => a == b,
            (Value::Str(a), Value::Str(b)) => a == b,
            (Value::Binary(a), Value::Binary(b)) => a == b,
            _ => false,
        }
    }
}

impl Value {
    /// Long 1 or 0
    pub fn from_bool(b: bool) -> Self {
        Value::Long(if b { 1 } else { 0 })
    }

    /// Coerce to `f64`; strings and binaries are rejected
    pub fn get_double_value(&self, context: &str) -> Result<f64> {
        match self {
            Value::Double(d) => Ok(*d),
            Value::Long(l) => Ok(*l as f64),
            _ => Err(Error::ArgType {
                context: context.to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }

    /// Coerce to `i64`, truncating doubles
    pub fn get_long_value(&self, context: &str) -> Result<i64> {
        match self {
            Value::Long(l) => Ok(*l),
            Value::Double(d) => Ok(*d as i64),
            _ => Err(Error::ArgType {
                context: context.to_string(),
                found: self.type_name().to_string(),
            }),
        }
    }

    /// True when the value is numerically non-zero
    pub fn is_truthy(&self, context: &str) -> Result<bool> {
        Ok(self.get_double_value(context)? != 0.0)
    }

    /// Try to borrow as text
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::Str(s) => Some(s),
            _ => None,
        }
    }

    /// Check if this is a numeric value
    pub fn is_numeric(&self) -> bool {
        matches!(self, Value::Double(_) | Value::Long(_))
    }

    /// Get the type name of this value
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Double(_) => "DOUBLE",
            Value::Long(_) => "LONG",
            Value::Str(_) => "STRING",
            Value::Binary(_) => "BINARY",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Double(d) => write!(f, "{}", d),
            Value::Long(l) => write!(f, "{}", l),
            Value::Str(s) => write!(f, "{}", s),
            Value::Binary(b) => write!(f, "BINARY[{}]", b.len()),
        }
    }
}

impl From<f64> for Value {
    fn from(v: f64) -> Self {
        Value::Double(v)
    }
}

impl From<i64> for Value {
    fn from(v: i64) -> Self {
        Value::Long(v)
    }
}

impl From<String> for Value {
    fn from(v: String) -> Self {
        Value::Str(v)
    }
}

impl From<&str> for Value {
    fn from(v: &str) -> Self {
        Value::Str(v.to_string())
    }
}

impl From<Bytes> for Value {
    fn from(v: Bytes) -> Self {
        Value::Binary(v)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_numeric_coercion() {
        assert_eq!(Value::Long(3).get_double_value("t").unwrap(), 3.0);
        assert_eq!(Value::Double(2.9).get_long_value("t").unwrap(), 2);
        assert!(matches!(
            Value::Str("x".into()).get_double_value("t"),
            Err(Error::ArgType { .. })
        ));
        assert!(Value::Binary(Bytes::from_static(b"ab"))
            .get_long_value("t")
            .is_err());
    }

    #[test]
    fn test_equality_is_variant_strict() {
        assert_eq!(Value::Double(1.5), Value::Double(1.5));
        assert_ne!(Value::Long(1), Value::Double(1.0));
        assert_eq!(Value::from("a"), Value::Str("a".to_string()));
    }
}
