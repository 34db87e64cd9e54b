//! Field types for FragDB
//!
//! This module defines the column types a fragment schema may declare.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

use crate::error::Error;

/// Fragment field types
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum FieldType {
    /// 64-bit signed integer
    Long,
    /// Double-precision floating point
    Real,
    /// NUL-terminated text
    String,
    /// Opaque bytes (packed measure arrays)
    Blob,
}

impl FieldType {
    /// Get the encoded size in bytes (for fixed-size types)
    pub fn size(&self) -> Option<usize> {
        match self {
            FieldType::Long | FieldType::Real => Some(8),
            FieldType::String | FieldType::Blob => None,
        }
    }

    /// Check if this type is numeric
    pub fn is_numeric(&self) -> bool {
        matches!(self, FieldType::Long | FieldType::Real)
    }

    /// One-byte tag used by the on-disk fragment format
    pub(crate) fn tag(&self) -> u8 {
        match self {
            FieldType::Long => 1,
            FieldType::Real => 2,
            FieldType::String => 3,
            FieldType::Blob => 4,
        }
    }

    pub(crate) fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            1 => Some(FieldType::Long),
            2 => Some(FieldType::Real),
            3 => Some(FieldType::String),
            4 => Some(FieldType::Blob),
            _ => None,
        }
    }
}

impl FromStr for FieldType {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_lowercase().as_str() {
            "long" | "int" | "integer" | "bigint" => Ok(FieldType::Long),
            "real" | "double" | "float" => Ok(FieldType::Real),
            "string" | "varchar" | "text" => Ok(FieldType::String),
            "blob" | "binary" => Ok(FieldType::Blob),
            other => Err(Error::ParseError(format!("unknown field type '{}'", other))),
        }
    }
}

impl fmt::Display for FieldType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            FieldType::Long => write!(f, "LONG"),
            FieldType::Real => write!(f, "REAL"),
            FieldType::String => write!(f, "STRING"),
            FieldType::Blob => write!(f, "BLOB"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_type_parsing() {
        assert_eq!("long".parse::<FieldType>().unwrap(), FieldType::Long);
        assert_eq!("DOUBLE".parse::<FieldType>().unwrap(), FieldType::Real);
        assert_eq!("varchar".parse::<FieldType>().unwrap(), FieldType::String);
        assert!("decimal".parse::<FieldType>().is_err());
    }

    #[test]
    fn test_type_size() {
        assert_eq!(FieldType::Long.size(), Some(8));
        assert_eq!(FieldType::Blob.size(), None);
        for ty in [FieldType::Long, FieldType::Real, FieldType::String, FieldType::Blob] {
            assert_eq!(FieldType::from_tag(ty.tag()), Some(ty));
        }
    }
}
