//! Storage backends
//!
//! This module contains the fragment store the engine talks to:
//! - The `IoStore` trait
//! - An in-memory backend
//! - A file backend writing one image per fragment

pub mod file;
pub mod memory;

pub use file::FileStore;
pub use memory::MemoryStore;

use std::sync::Arc;

use crate::error::{Error, Result};
use crate::fragment::Fragment;

/// Backend that holds fragment contents
///
/// Databases are containers; a fragment is addressed by `(db, name)`.
pub trait IoStore: Send + Sync {
    /// Create the container for a database
    fn put_db(&self, db: &str) -> Result<()>;

    /// Delete a database and every fragment stored in it
    fn delete_db(&self, db: &str) -> Result<()>;

    /// Store (or replace) a fragment
    fn put_frag(&self, db: &str, frag: &Fragment) -> Result<()>;

    /// Load a fragment
    fn get_frag(&self, db: &str, name: &str) -> Result<Arc<Fragment>>;

    /// Delete a fragment
    fn delete_frag(&self, db: &str, name: &str) -> Result<()>;
}

/// Check that a database or fragment name is safe to use as a path component
pub fn validate_name(name: &str) -> Result<()> {
    if name.is_empty() {
        return Err(Error::NullParam("name".to_string()));
    }
    if !name
        .chars()
        .all(|c| c.is_ascii_alphanumeric() || c == '_' || c == '-')
    {
        return Err(Error::ParseError(format!("invalid name '{}'", name)));
    }
    Ok(())
}
