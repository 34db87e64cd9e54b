//! Fragment data model
//!
//! Typed byte records grouped into named, schema-described fragments.

pub mod record;
pub mod recordset;
pub mod schema;
pub mod types;

pub use record::{decode_value, encode_value, Record};
pub use recordset::Fragment;
pub use schema::{Field, Schema};
pub use types::FieldType;
