//! Catalog records and the `MetaDb` interface

use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::fragment::{Fragment, Schema};

/// Catalog entry for a database
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DbDef {
    pub name: String,
    /// Fragment names in registration order
    pub fragments: Vec<String>,
    /// Rows across all registered fragments
    pub row_count: u64,
    /// Encoded bytes across all registered fragments
    pub size_bytes: u64,
}

impl DbDef {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            fragments: Vec::new(),
            row_count: 0,
            size_bytes: 0,
        }
    }
}

/// Catalog entry for a fragment
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FragDef {
    pub name: String,
    pub db: String,
    /// Storage device the fragment was written to
    pub device: Option<String>,
    pub schema: Schema,
    pub row_count: u64,
    pub size_bytes: u64,
}

impl FragDef {
    /// Describe a materialised fragment
    pub fn describe(db: &str, device: Option<&str>, frag: &Fragment) -> Self {
        Self {
            name: frag.name().to_string(),
            db: db.to_string(),
            device: device.map(str::to_string),
            schema: frag.schema().clone(),
            row_count: frag.row_count() as u64,
            size_bytes: frag.size_bytes() as u64,
        }
    }
}

/// Persistent catalog of databases and fragments
pub trait MetaDb: Send + Sync {
    /// Look up a database
    fn find_db(&self, name: &str) -> Result<DbDef>;

    /// Register a new database
    fn add_db(&self, name: &str) -> Result<DbDef>;

    /// Unregister a database and all of its fragments
    fn remove_db(&self, name: &str) -> Result<DbDef>;

    /// Replace the stored statistics of a database
    fn update_db(&self, db: &DbDef) -> Result<()>;

    /// List database names in sorted order
    fn list_dbs(&self) -> Result<Vec<String>>;

    /// Look up a fragment
    fn find_frag(&self, db: &str, name: &str) -> Result<FragDef>;

    /// Register a fragment in its database
    fn add_frag(&self, frag: FragDef) -> Result<()>;

    /// Unregister a fragment
    fn remove_frag(&self, db: &str, name: &str) -> Result<FragDef>;

    /// Persist pending changes
    fn flush(&self) -> Result<()> {
        Ok(())
    }
}
