//! Fragment catalog for FragDB
//!
//! This module keeps database and fragment metadata behind one `RwLock` and
//! optionally persists it as JSON.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::sync::{RwLock, RwLockReadGuard, RwLockWriteGuard};

use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use super::meta::{DbDef, FragDef, MetaDb};
use crate::error::{Error, Result};

/// Serializable catalog contents
#[derive(Debug, Default, Serialize, Deserialize)]
struct CatalogData {
    dbs: BTreeMap<String, DbDef>,
    /// Keyed by `db.frag`
    frags: BTreeMap<String, FragDef>,
}

fn frag_key(db: &str, name: &str) -> String {
    format!("{}.{}", db, name)
}

/// In-process catalog
#[derive(Debug, Default)]
pub struct MetaCatalog {
    data: RwLock<CatalogData>,
    /// Where `flush` writes the catalog, if anywhere
    path: Option<PathBuf>,
}

impl MetaCatalog {
    /// Create a new empty catalog
    pub fn new() -> Self {
        Self::default()
    }

    /// Open a catalog persisted at `path`, starting empty when the file is
    /// missing
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let mut catalog = if path.exists() {
            Self::load_from_disk(&path)?
        } else {
            Self::new()
        };
        catalog.path = Some(path);
        Ok(catalog)
    }

    /// Save catalog to disk
    pub fn save_to_disk(&self, path: &Path) -> Result<()> {
        let json = serde_json::to_string_pretty(&*self.read()?)
            .map_err(|e| Error::MetaDb(e.to_string()))?;
        std::fs::write(path, json)?;
        debug!(path = %path.display(), "catalog saved");
        Ok(())
    }

    /// Load catalog from disk
    pub fn load_from_disk(path: &Path) -> Result<Self> {
        let json = std::fs::read_to_string(path)?;
        let data: CatalogData =
            serde_json::from_str(&json).map_err(|e| Error::MetaDb(e.to_string()))?;
        info!(
            path = %path.display(),
            dbs = data.dbs.len(),
            frags = data.frags.len(),
            "catalog loaded"
        );
        Ok(Self {
            data: RwLock::new(data),
            path: None,
        })
    }

    fn read(&self) -> Result<RwLockReadGuard<'_, CatalogData>> {
        self.data
            .read()
            .map_err(|_| Error::MetaDb("catalog lock poisoned".to_string()))
    }

    fn write(&self) -> Result<RwLockWriteGuard<'_, CatalogData>> {
        self.data
            .write()
            .map_err(|_| Error::MetaDb("catalog lock poisoned".to_string()))
    }
}

impl MetaDb for MetaCatalog {
    fn find_db(&self, name: &str) -> Result<DbDef> {
        self.read()?
            .dbs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))
    }

    fn add_db(&self, name: &str) -> Result<DbDef> {
        let mut data = self.write()?;
        if data.dbs.contains_key(name) {
            return Err(Error::AlreadyExists(name.to_string()));
        }
        let def = DbDef::new(name);
        data.dbs.insert(name.to_string(), def.clone());
        Ok(def)
    }

    fn remove_db(&self, name: &str) -> Result<DbDef> {
        let mut data = self.write()?;
        let def = data
            .dbs
            .remove(name)
            .ok_or_else(|| Error::DatabaseNotFound(name.to_string()))?;
        for frag in &def.fragments {
            data.frags.remove(&frag_key(name, frag));
        }
        Ok(def)
    }

    fn update_db(&self, db: &DbDef) -> Result<()> {
        let mut data = self.write()?;
        let slot = data
            .dbs
            .get_mut(&db.name)
            .ok_or_else(|| Error::DatabaseNotFound(db.name.clone()))?;
        *slot = db.clone();
        Ok(())
    }

    fn list_dbs(&self) -> Result<Vec<String>> {
        Ok(self.read()?.dbs.keys().cloned().collect())
    }

    fn find_frag(&self, db: &str, name: &str) -> Result<FragDef> {
        let data = self.read()?;
        if !data.dbs.contains_key(db) {
            return Err(Error::DatabaseNotFound(db.to_string()));
        }
        data.frags
            .get(&frag_key(db, name))
            .cloned()
            .ok_or_else(|| Error::FragmentNotFound(frag_key(db, name)))
    }

    fn add_frag(&self, frag: FragDef) -> Result<()> {
        let mut data = self.write()?;
        let key = frag_key(&frag.db, &frag.name);
        if data.frags.contains_key(&key) {
            return Err(Error::AlreadyExists(key));
        }
        let db = data
            .dbs
            .get_mut(&frag.db)
            .ok_or_else(|| Error::DatabaseNotFound(frag.db.clone()))?;
        db.fragments.push(frag.name.clone());
        db.row_count += frag.row_count;
        db.size_bytes += frag.size_bytes;
        data.frags.insert(key, frag);
        Ok(())
    }

    fn remove_frag(&self, db: &str, name: &str) -> Result<FragDef> {
        let mut data = self.write()?;
        let frag = data
            .frags
            .remove(&frag_key(db, name))
            .ok_or_else(|| Error::FragmentNotFound(frag_key(db, name)))?;
        if let Some(def) = data.dbs.get_mut(db) {
            def.fragments.retain(|f| f != name);
            def.row_count = def.row_count.saturating_sub(frag.row_count);
            def.size_bytes = def.size_bytes.saturating_sub(frag.size_bytes);
        }
        Ok(frag)
    }

    fn flush(&self) -> Result<()> {
        match &self.path {
            Some(path) => self.save_to_disk(path),
            None => Ok(()),
        }
    }
}
