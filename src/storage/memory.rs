//! In-memory fragment store

use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use tracing::debug;

use super::{validate_name, IoStore};
use crate::error::{Error, Result};
use crate::fragment::Fragment;

type Databases = HashMap<String, HashMap<String, Arc<Fragment>>>;

/// Fragment store kept entirely in process memory
#[derive(Debug, Default)]
pub struct MemoryStore {
    dbs: RwLock<Databases>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> Result<std::sync::RwLockReadGuard<'_, Databases>> {
        self.dbs
            .read()
            .map_err(|_| Error::Api("memory store lock poisoned".to_string()))
    }

    fn write(&self) -> Result<std::sync::RwLockWriteGuard<'_, Databases>> {
        self.dbs
            .write()
            .map_err(|_| Error::Api("memory store lock poisoned".to_string()))
    }
}

impl IoStore for MemoryStore {
    fn put_db(&self, db: &str) -> Result<()> {
        validate_name(db)?;
        self.write()?.entry(db.to_string()).or_default();
        Ok(())
    }

    fn delete_db(&self, db: &str) -> Result<()> {
        self.write()?
            .remove(db)
            .map(|_| ())
            .ok_or_else(|| Error::Api(format!("database '{}' is not stored", db)))
    }

    fn put_frag(&self, db: &str, frag: &Fragment) -> Result<()> {
        validate_name(frag.name())?;
        let mut dbs = self.write()?;
        let frags = dbs
            .get_mut(db)
            .ok_or_else(|| Error::Api(format!("database '{}' is not stored", db)))?;
        debug!(db, frag = frag.name(), rows = frag.row_count(), "storing fragment in memory");
        frags.insert(frag.name().to_string(), Arc::new(frag.clone()));
        Ok(())
    }

    fn get_frag(&self, db: &str, name: &str) -> Result<Arc<Fragment>> {
        self.read()?
            .get(db)
            .and_then(|frags| frags.get(name))
            .cloned()
            .ok_or_else(|| Error::Api(format!("fragment '{}.{}' is not stored", db, name)))
    }

    fn delete_frag(&self, db: &str, name: &str) -> Result<()> {
        self.write()?
            .get_mut(db)
            .and_then(|frags| frags.remove(name))
            .map(|_| ())
            .ok_or_else(|| Error::Api(format!("fragment '{}.{}' is not stored", db, name)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::fragment::{FieldType, Schema};

    #[test]
    fn test_memory_store_lifecycle() {
        let store = MemoryStore::new();
        let mut frag = Fragment::new("f1", Schema::from_pairs([("id", FieldType::Long)]));
        frag.push_values(&[Value::Long(1)]).unwrap();

        assert!(store.put_frag("db", &frag).is_err());
        store.put_db("db").unwrap();
        store.put_frag("db", &frag).unwrap();
        assert_eq!(store.get_frag("db", "f1").unwrap().row_count(), 1);

        store.delete_frag("db", "f1").unwrap();
        assert!(matches!(store.get_frag("db", "f1"), Err(Error::Api(_))));
        store.delete_db("db").unwrap();
        assert!(store.delete_db("db").is_err());
    }
}
