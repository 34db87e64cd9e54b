//! Fragment schema definitions
//!
//! A schema is the ordered list of field names and types of a fragment. One
//! `Long` field is the identifier column used to align fragments.

use super::types::FieldType;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Field definition in a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Field {
    /// Field name
    pub name: String,
    /// Field type
    pub field_type: FieldType,
    /// Field position (0-indexed)
    pub position: usize,
    /// Is this the identifier column?
    pub identifier: bool,
}

impl Field {
    /// Create a new field
    pub fn new(name: impl Into<String>, field_type: FieldType, position: usize) -> Self {
        Self {
            name: name.into(),
            field_type,
            position,
            identifier: false,
        }
    }

    /// Set identifier flag
    pub fn identifier(mut self, identifier: bool) -> Self {
        self.identifier = identifier;
        self
    }
}

/// Fragment schema
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Schema {
    /// Ordered list of fields
    fields: Vec<Field>,
    /// Field name to index mapping
    name_to_index: HashMap<String, usize>,
}

impl PartialEq for Schema {
    fn eq(&self, other: &Self) -> bool {
        self.fields == other.fields
    }
}

impl Schema {
    /// Create a new empty schema
    pub fn new() -> Self {
        Self::default()
    }

    /// Create a schema from a list of fields
    pub fn from_fields(fields: Vec<Field>) -> Self {
        let mut schema = Self::new();
        for field in fields {
            schema.add_field(field);
        }
        schema
    }

    /// Build a schema from parallel name/type lists
    pub fn from_pairs<'a>(pairs: impl IntoIterator<Item = (&'a str, FieldType)>) -> Self {
        let mut schema = Self::new();
        for (name, ty) in pairs {
            schema.add_field(Field::new(name, ty, 0));
        }
        schema
    }

    /// Add a field to the schema
    pub fn add_field(&mut self, mut field: Field) {
        field.position = self.fields.len();
        self.name_to_index.insert(field.name.clone(), field.position);
        self.fields.push(field);
    }

    /// Get field by name
    pub fn get_field(&self, name: &str) -> Option<&Field> {
        self.name_to_index.get(name).map(|&idx| &self.fields[idx])
    }

    /// Get field by index
    pub fn get_field_by_index(&self, index: usize) -> Option<&Field> {
        self.fields.get(index)
    }

    /// Get field index by name
    pub fn field_index(&self, name: &str) -> Option<usize> {
        self.name_to_index.get(name).copied()
    }

    /// Index of the identifier column: the flagged field, else the first Long
    pub fn id_field_index(&self) -> Option<usize> {
        self.fields
            .iter()
            .position(|f| f.identifier)
            .or_else(|| {
                self.fields
                    .iter()
                    .position(|f| f.field_type == FieldType::Long)
            })
    }

    /// Get all fields
    pub fn fields(&self) -> &[Field] {
        &self.fields
    }

    /// Get number of fields
    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    /// Get field names
    pub fn field_names(&self) -> Vec<&str> {
        self.fields.iter().map(|f| f.name.as_str()).collect()
    }

    /// Get field types
    pub fn field_types(&self) -> Vec<FieldType> {
        self.fields.iter().map(|f| f.field_type).collect()
    }
}
