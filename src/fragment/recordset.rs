//! Fragments (record sets)
//!
//! A fragment is a named, schema-typed list of records held entirely in
//! memory. This module also owns the binary image used by the file backend.

use byteorder::{LittleEndian, ReadBytesExt, WriteBytesExt};
use bytes::Bytes;
use std::io::{Cursor, Read, Write};

use super::record::Record;
use super::schema::{Field, Schema};
use super::types::FieldType;
use crate::error::{Error, Result};
use crate::expr::Value;

const MAGIC: &[u8; 4] = b"FRAG";
const FORMAT_VERSION: u8 = 1;

/// A materialised fragment
#[derive(Debug, Clone, PartialEq)]
pub struct Fragment {
    name: String,
    schema: Schema,
    records: Vec<Record>,
    /// Intermediate result not meant to be registered
    tmp: bool,
}

impl Fragment {
    pub fn new(name: impl Into<String>, schema: Schema) -> Self {
        Self {
            name: name.into(),
            schema,
            records: Vec::new(),
            tmp: false,
        }
    }

    /// Mark the fragment as temporary
    pub fn with_tmp(mut self, tmp: bool) -> Self {
        self.tmp = tmp;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = name.into();
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn is_tmp(&self) -> bool {
        self.tmp
    }

    pub fn records(&self) -> &[Record] {
        &self.records
    }

    pub fn row_count(&self) -> usize {
        self.records.len()
    }

    pub fn field_count(&self) -> usize {
        self.schema.field_count()
    }

    /// Reserve room for exactly `additional` more rows
    pub fn reserve_exact(&mut self, additional: usize) {
        self.records.reserve_exact(additional);
    }

    /// Append an encoded record
    pub fn push_record(&mut self, record: Record) -> Result<()> {
        if record.field_count() != self.schema.field_count() {
            return Err(Error::exec(format!(
                "fragment '{}' has {} fields, record has {}",
                self.name,
                self.schema.field_count(),
                record.field_count()
            )));
        }
        self.records.push(record);
        Ok(())
    }

    /// Encode and append one row of values
    pub fn push_values(&mut self, values: &[Value]) -> Result<()> {
        let record = Record::from_values(values, &self.schema.field_types())?;
        self.records.push(record);
        Ok(())
    }

    /// Decode the value at (`row`, `field`)
    pub fn value(&self, row: usize, field: usize) -> Result<Value> {
        let record = self.records.get(row).ok_or_else(|| {
            Error::exec(format!("row {} out of range in fragment '{}'", row, self.name))
        })?;
        let ty = self
            .schema
            .get_field_by_index(field)
            .map(|f| f.field_type)
            .ok_or_else(|| Error::FieldNotFound(format!("#{}", field), self.name.clone()))?;
        record.value(field, ty)
    }

    /// Index of a named field
    pub fn field_index(&self, name: &str) -> Result<usize> {
        self.schema
            .field_index(name)
            .ok_or_else(|| Error::FieldNotFound(name.to_string(), self.name.clone()))
    }

    /// Index of the identifier column
    pub fn id_field_index(&self) -> Result<usize> {
        self.schema.id_field_index().ok_or_else(|| {
            Error::exec(format!("fragment '{}' has no identifier column", self.name))
        })
    }

    /// Decoded identifier column
    pub fn ids(&self) -> Result<Vec<i64>> {
        let idx = self.id_field_index()?;
        (0..self.records.len())
            .map(|row| self.value(row, idx)?.get_long_value("identifier"))
            .collect()
    }

    /// Sum of the encoded sizes of all records
    pub fn size_bytes(&self) -> usize {
        self.records.iter().map(|r| r.size_bytes()).sum()
    }

    /// Rearrange rows so that row `i` becomes the old row `order[i]`
    pub fn reorder(&mut self, order: &[usize]) -> Result<()> {
        if order.len() != self.records.len() {
            return Err(Error::exec("row permutation has the wrong length"));
        }
        let mut seen = vec![false; order.len()];
        for &i in order {
            match seen.get_mut(i) {
                Some(slot) if !*slot => *slot = true,
                _ => {
                    return Err(Error::exec(format!(
                        "invalid row index {} in permutation",
                        i
                    )))
                }
            }
        }
        self.records = order.iter().map(|&i| self.records[i].clone()).collect();
        Ok(())
    }

    /// Serialize to the on-disk image
    pub fn to_bytes(&self) -> Result<Vec<u8>> {
        let mut buf = Vec::with_capacity(64 + self.size_bytes());
        buf.write_all(MAGIC)?;
        buf.write_u8(FORMAT_VERSION)?;
        write_chunk(&mut buf, self.name.as_bytes())?;
        buf.write_u8(self.tmp as u8)?;

        buf.write_u32::<LittleEndian>(self.schema.field_count() as u32)?;
        for field in self.schema.fields() {
            write_chunk(&mut buf, field.name.as_bytes())?;
            buf.write_u8(field.field_type.tag())?;
            buf.write_u8(field.identifier as u8)?;
        }

        buf.write_u64::<LittleEndian>(self.records.len() as u64)?;
        for record in &self.records {
            for field in record.fields() {
                write_chunk(&mut buf, field)?;
            }
        }
        Ok(buf)
    }

    /// Deserialize from the on-disk image
    pub fn from_bytes(data: &[u8]) -> Result<Self> {
        let mut cur = Cursor::new(data);
        let mut magic = [0u8; 4];
        cur.read_exact(&mut magic)?;
        if &magic != MAGIC {
            return Err(Error::Api("not a fragment image".to_string()));
        }
        let version = cur.read_u8()?;
        if version != FORMAT_VERSION {
            return Err(Error::Api(format!("unsupported fragment version {}", version)));
        }

        let name = read_string(&mut cur)?;
        let tmp = cur.read_u8()? != 0;

        let nfields = cur.read_u32::<LittleEndian>()? as usize;
        let mut schema = Schema::new();
        for _ in 0..nfields {
            let fname = read_string(&mut cur)?;
            let tag = cur.read_u8()?;
            let ty = FieldType::from_tag(tag)
                .ok_or_else(|| Error::Api(format!("unknown field type tag {}", tag)))?;
            let identifier = cur.read_u8()? != 0;
            schema.add_field(Field::new(fname, ty, 0).identifier(identifier));
        }

        let nrows = cur.read_u64::<LittleEndian>()? as usize;
        let mut records = Vec::with_capacity(nrows.min(data.len()));
        for _ in 0..nrows {
            let fields = (0..nfields)
                .map(|_| read_chunk(&mut cur).map(Bytes::from))
                .collect::<Result<Vec<_>>>()?;
            records.push(Record::new(fields));
        }

        Ok(Self {
            name,
            schema,
            records,
            tmp,
        })
    }
}

fn write_chunk(buf: &mut Vec<u8>, data: &[u8]) -> Result<()> {
    buf.write_u32::<LittleEndian>(data.len() as u32)?;
    buf.write_all(data)?;
    Ok(())
}

fn read_chunk(cur: &mut Cursor<&[u8]>) -> Result<Vec<u8>> {
    let len = cur.read_u32::<LittleEndian>()? as usize;
    let remaining = cur.get_ref().len() - cur.position() as usize;
    if len > remaining {
        return Err(Error::Api("truncated fragment image".to_string()));
    }
    let mut data = vec![0u8; len];
    cur.read_exact(&mut data)?;
    Ok(data)
}

fn read_string(cur: &mut Cursor<&[u8]>) -> Result<String> {
    String::from_utf8(read_chunk(cur)?)
        .map_err(|e| Error::Api(format!("invalid UTF-8 in fragment image: {}", e)))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Fragment {
        let schema = Schema::from_pairs([
            ("id", FieldType::Long),
            ("v", FieldType::Real),
            ("label", FieldType::String),
        ]);
        let mut frag = Fragment::new("f", schema);
        for (id, v) in [(1, 10.0), (2, 20.0), (3, 30.0)] {
            frag.push_values(&[Value::Long(id), Value::Double(v), Value::Str(format!("r{}", id))])
                .unwrap();
        }
        frag
    }

    #[test]
    fn test_fragment_access() {
        let frag = sample();
        assert_eq!(frag.row_count(), 3);
        assert_eq!(frag.id_field_index().unwrap(), 0);
        assert_eq!(frag.ids().unwrap(), vec![1, 2, 3]);
        assert_eq!(frag.value(1, 1).unwrap(), Value::Double(20.0));
        assert!(matches!(frag.field_index("w"), Err(Error::FieldNotFound(..))));
        assert!(frag.value(5, 0).is_err());
    }

    #[test]
    fn test_reorder() {
        let mut frag = sample();
        frag.reorder(&[2, 0, 1]).unwrap();
        assert_eq!(frag.ids().unwrap(), vec![3, 1, 2]);
        assert!(frag.reorder(&[0, 0, 1]).is_err());
        assert!(frag.reorder(&[0, 1, 7]).is_err());
        // A rejected permutation leaves the rows untouched
        assert_eq!(frag.ids().unwrap(), vec![3, 1, 2]);
        assert_eq!(frag.row_count(), 3);
    }

    #[test]
    fn test_disk_image() {
        let frag = sample().with_tmp(true);
        let bytes = frag.to_bytes().unwrap();
        let loaded = Fragment::from_bytes(&bytes).unwrap();
        assert_eq!(loaded, frag);

        assert!(Fragment::from_bytes(b"NOPE").is_err());
        assert!(Fragment::from_bytes(&bytes[..bytes.len() - 2]).is_err());
    }
}
