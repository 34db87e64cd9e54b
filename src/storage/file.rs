//! File-backed fragment store
//!
//! Each database is a directory under the data directory and each fragment
//! is one binary image file `<name>.frag` inside it.

use std::fs;
use std::io::ErrorKind as IoErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::{debug, info};

use super::{validate_name, IoStore};
use crate::error::{Error, Result};
use crate::fragment::Fragment;

const FRAGMENT_EXT: &str = "frag";

/// Fragment store rooted at a data directory
#[derive(Debug, Clone)]
pub struct FileStore {
    data_dir: PathBuf,
}

impl FileStore {
    /// Open a store, creating the data directory when missing
    pub fn new(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref().to_path_buf();
        fs::create_dir_all(&data_dir)?;
        Ok(Self { data_dir })
    }

    pub fn data_dir(&self) -> &Path {
        &self.data_dir
    }

    fn db_path(&self, db: &str) -> Result<PathBuf> {
        validate_name(db)?;
        Ok(self.data_dir.join(db))
    }

    fn frag_path(&self, db: &str, name: &str) -> Result<PathBuf> {
        validate_name(name)?;
        Ok(self.db_path(db)?.join(format!("{}.{}", name, FRAGMENT_EXT)))
    }
}

impl IoStore for FileStore {
    fn put_db(&self, db: &str) -> Result<()> {
        let path = self.db_path(db)?;
        fs::create_dir_all(&path)?;
        info!(db, path = %path.display(), "created database directory");
        Ok(())
    }

    fn delete_db(&self, db: &str) -> Result<()> {
        let path = self.db_path(db)?;
        match fs::remove_dir_all(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(Error::Api(format!("database '{}' is not stored", db)))
            }
            Err(e) => Err(e.into()),
        }
    }

    fn put_frag(&self, db: &str, frag: &Fragment) -> Result<()> {
        let dir = self.db_path(db)?;
        if !dir.is_dir() {
            return Err(Error::Api(format!("database '{}' is not stored", db)));
        }
        let path = self.frag_path(db, frag.name())?;
        let image = frag.to_bytes()?;

        // Write then rename so readers never see a partial image
        let tmp = path.with_extension("tmp");
        fs::write(&tmp, &image)?;
        fs::rename(&tmp, &path)?;
        debug!(db, frag = frag.name(), bytes = image.len(), "wrote fragment image");
        Ok(())
    }

    fn get_frag(&self, db: &str, name: &str) -> Result<Arc<Fragment>> {
        let path = self.frag_path(db, name)?;
        let data = match fs::read(&path) {
            Ok(data) => data,
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                return Err(Error::Api(format!("fragment '{}.{}' is not stored", db, name)))
            }
            Err(e) => return Err(e.into()),
        };
        Ok(Arc::new(Fragment::from_bytes(&data)?))
    }

    fn delete_frag(&self, db: &str, name: &str) -> Result<()> {
        let path = self.frag_path(db, name)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == IoErrorKind::NotFound => {
                Err(Error::Api(format!("fragment '{}.{}' is not stored", db, name)))
            }
            Err(e) => Err(e.into()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::expr::Value;
    use crate::fragment::{FieldType, Schema};
    use bytes::Bytes;
    use tempfile::tempdir;

    #[test]
    fn test_file_store_lifecycle() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();

        let schema = Schema::from_pairs([("id", FieldType::Long), ("m", FieldType::Blob)]);
        let mut frag = Fragment::new("f1", schema);
        frag.push_values(&[Value::Long(1), Value::Binary(Bytes::from_static(b"\x00\x01"))])
            .unwrap();

        assert!(store.put_frag("db", &frag).is_err());
        store.put_db("db").unwrap();
        store.put_frag("db", &frag).unwrap();
        assert!(dir.path().join("db").join("f1.frag").exists());

        let loaded = store.get_frag("db", "f1").unwrap();
        assert_eq!(*loaded, frag);

        store.delete_frag("db", "f1").unwrap();
        assert!(matches!(store.get_frag("db", "f1"), Err(Error::Api(_))));
        store.delete_db("db").unwrap();
        assert!(!dir.path().join("db").exists());
    }

    #[test]
    fn test_rejects_path_names() {
        let dir = tempdir().unwrap();
        let store = FileStore::new(dir.path()).unwrap();
        assert!(store.put_db("../outside").is_err());
        assert!(store.get_frag("db", "a/b").is_err());
    }
}
