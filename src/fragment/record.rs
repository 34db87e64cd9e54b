//! Record encoding for FragDB
//!
//! A record is an ordered list of byte fields. Each field carries the wire
//! encoding of its schema type:
//! - `Long`: 8 bytes little-endian `i64`
//! - `Real`: 8 bytes little-endian `f64`
//! - `String`: UTF-8 bytes followed by one NUL
//! - `Blob`: raw bytes

use byteorder::{ByteOrder, LittleEndian};
use bytes::{BufMut, Bytes, BytesMut};

use super::types::FieldType;
use crate::error::{Error, Result};
use crate::expr::Value;

/// One row of a fragment
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Record {
    fields: Vec<Bytes>,
}

impl Record {
    /// Create a record from already encoded fields
    pub fn new(fields: Vec<Bytes>) -> Self {
        Self { fields }
    }

    /// Create a record by encoding each value into its field type
    pub fn from_values(values: &[Value], types: &[FieldType]) -> Result<Self> {
        if values.len() != types.len() {
            return Err(Error::exec(format!(
                "record expects {} values, got {}",
                types.len(),
                values.len()
            )));
        }
        let fields = values
            .iter()
            .zip(types)
            .map(|(v, ty)| encode_value(v, *ty))
            .collect::<Result<Vec<_>>>()?;
        Ok(Self { fields })
    }

    /// Raw bytes of field `i`
    pub fn field(&self, i: usize) -> Option<&Bytes> {
        self.fields.get(i)
    }

    /// Byte length of field `i` (0 when absent)
    pub fn field_length(&self, i: usize) -> usize {
        self.fields.get(i).map_or(0, |f| f.len())
    }

    pub fn fields(&self) -> &[Bytes] {
        &self.fields
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Total encoded size of the record
    pub fn size_bytes(&self) -> usize {
        self.fields.iter().map(|f| f.len()).sum()
    }

    /// Decode field `i` as `field_type`
    pub fn value(&self, i: usize, field_type: FieldType) -> Result<Value> {
        let raw = self
            .fields
            .get(i)
            .ok_or_else(|| Error::exec(format!("record has no field {}", i)))?;
        decode_value(raw, field_type)
    }
}

/// Encode a value into the wire form of `field_type`
///
/// Numeric values convert between Long and Real. A Binary value is accepted
/// as raw field bytes when its length fits the target type.
pub fn encode_value(value: &Value, field_type: FieldType) -> Result<Bytes> {
    let mismatch = || Error::TypeMismatch {
        from: value.type_name().to_string(),
        to: field_type.to_string(),
    };

    match (field_type, value) {
        (FieldType::Long, Value::Long(_) | Value::Double(_)) => {
            let mut buf = [0u8; 8];
            LittleEndian::write_i64(&mut buf, value.get_long_value("LONG field")?);
            Ok(Bytes::copy_from_slice(&buf))
        }
        (FieldType::Real, Value::Long(_) | Value::Double(_)) => {
            let mut buf = [0u8; 8];
            LittleEndian::write_f64(&mut buf, value.get_double_value("REAL field")?);
            Ok(Bytes::copy_from_slice(&buf))
        }
        (FieldType::Long | FieldType::Real, Value::Binary(b)) if b.len() == 8 => Ok(b.clone()),
        (FieldType::String, Value::Str(s)) => {
            let mut buf = BytesMut::with_capacity(s.len() + 1);
            buf.put_slice(s.as_bytes());
            buf.put_u8(0);
            Ok(buf.freeze())
        }
        (FieldType::Blob, Value::Binary(b)) => Ok(b.clone()),
        (FieldType::Blob, Value::Str(s)) => Ok(Bytes::copy_from_slice(s.as_bytes())),
        _ => Err(mismatch()),
    }
}

/// Decode raw field bytes of type `field_type`
pub fn decode_value(raw: &Bytes, field_type: FieldType) -> Result<Value> {
    match field_type {
        FieldType::Long => {
            check_width(raw, field_type)?;
            Ok(Value::Long(LittleEndian::read_i64(raw)))
        }
        FieldType::Real => {
            check_width(raw, field_type)?;
            Ok(Value::Double(LittleEndian::read_f64(raw)))
        }
        FieldType::String => {
            let text = raw.strip_suffix(&[0u8]).unwrap_or(&raw[..]);
            let s = std::str::from_utf8(text)
                .map_err(|e| Error::exec(format!("invalid UTF-8 in string field: {}", e)))?;
            Ok(Value::Str(s.to_string()))
        }
        FieldType::Blob => Ok(Value::Binary(raw.clone())),
    }
}

fn check_width(raw: &Bytes, field_type: FieldType) -> Result<()> {
    if raw.len() != 8 {
        return Err(Error::exec(format!(
            "{} field has {} bytes, expected 8",
            field_type,
            raw.len()
        )));
    }
    Ok(())
}
