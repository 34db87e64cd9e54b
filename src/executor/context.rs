//! Engine context
//!
//! The shared, process-wide state every session runs against: catalog,
//! storage backend, function registry and fragment producers.

use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;

use tracing::info;

use super::producer::{FragmentProducer, TextProducer};
use crate::catalog::{MetaCatalog, MetaDb};
use crate::error::{Error, Result};
use crate::expr::FunctionRegistry;
use crate::query::{BinaryArg, QueryContext};
use crate::storage::{FileStore, IoStore, MemoryStore};

/// Catalog file name inside a data directory
pub const CATALOG_FILE: &str = "catalog.json";

/// Name of the producer used when a query names none
pub const DEFAULT_PRODUCER: &str = "text";

/// Shared engine state
pub struct EngineContext {
    catalog: Arc<dyn MetaDb>,
    storage: Arc<dyn IoStore>,
    registry: FunctionRegistry,
    producers: HashMap<String, Arc<dyn FragmentProducer>>,
    /// Extra symbol-table slots per evaluation
    headroom: usize,
}

impl EngineContext {
    /// Create a context over the given collaborators
    pub fn new(catalog: Arc<dyn MetaDb>, storage: Arc<dyn IoStore>) -> Self {
        let mut producers: HashMap<String, Arc<dyn FragmentProducer>> = HashMap::new();
        producers.insert(DEFAULT_PRODUCER.to_string(), Arc::new(TextProducer));
        Self {
            catalog,
            storage,
            registry: FunctionRegistry::builtin(),
            producers,
            headroom: 0,
        }
    }

    /// Context with an in-memory catalog and store
    pub fn in_memory() -> Self {
        Self::new(Arc::new(MetaCatalog::new()), Arc::new(MemoryStore::new()))
    }

    /// Context persisted under `data_dir`
    pub fn open(data_dir: impl AsRef<Path>) -> Result<Self> {
        let data_dir = data_dir.as_ref();
        let storage = FileStore::new(data_dir)?;
        let catalog = MetaCatalog::open(data_dir.join(CATALOG_FILE))?;
        info!(data_dir = %data_dir.display(), "engine opened");
        Ok(Self::new(Arc::new(catalog), Arc::new(storage)))
    }

    /// Register a producer under `name`, replacing any previous one
    pub fn with_producer(mut self, name: impl Into<String>, producer: Arc<dyn FragmentProducer>) -> Self {
        self.producers.insert(name.into(), producer);
        self
    }

    /// Set the symbol-table headroom
    pub fn with_headroom(mut self, headroom: usize) -> Self {
        self.headroom = headroom;
        self
    }

    pub fn catalog(&self) -> &dyn MetaDb {
        self.catalog.as_ref()
    }

    pub fn storage(&self) -> &dyn IoStore {
        self.storage.as_ref()
    }

    pub fn registry(&self) -> &FunctionRegistry {
        &self.registry
    }

    pub fn headroom(&self) -> usize {
        self.headroom
    }

    /// Look up a producer by name
    pub fn producer(&self, name: &str) -> Result<Arc<dyn FragmentProducer>> {
        self.producers
            .get(name)
            .cloned()
            .ok_or_else(|| Error::Api(format!("no fragment producer named '{}'", name)))
    }

    /// Evaluation settings for one query
    pub fn query_context<'a>(&'a self, args: &'a [BinaryArg]) -> QueryContext<'a> {
        QueryContext::new(&self.registry, args).with_headroom(self.headroom)
    }
}

impl std::fmt::Debug for EngineContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineContext")
            .field("functions", &self.registry.len())
            .field("producers", &self.producers.keys().collect::<Vec<_>>())
            .field("headroom", &self.headroom)
            .finish()
    }
}
