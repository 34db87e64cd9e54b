//! Query inputs and row selections
//!
//! A [`Selection`] addresses rows of the input fragments. With one input it
//! is a list of row indices; with several inputs that were joined
//! positionally, entry `k` names row `offsets[i] + rows[k]` of input `i`.

use std::sync::Arc;

use crate::expr::FunctionRegistry;
use crate::fragment::Fragment;
use crate::query::args::BinaryArg;

/// One input fragment of a query
#[derive(Debug, Clone)]
pub struct Source {
    pub fragment: Arc<Fragment>,
    /// Alias given with `from_alias`
    pub alias: Option<String>,
    /// Database the fragment was loaded from
    pub db: Option<String>,
}

impl Source {
    pub fn new(fragment: Arc<Fragment>) -> Self {
        Self {
            fragment,
            alias: None,
            db: None,
        }
    }

    pub fn with_alias(mut self, alias: Option<String>) -> Self {
        self.alias = alias;
        self
    }

    pub fn with_db(mut self, db: Option<String>) -> Self {
        self.db = db;
        self
    }

    /// Whether a qualified reference prefix names this source
    pub fn answers_to(&self, prefix: &str) -> bool {
        if self.alias.as_deref() == Some(prefix) || self.fragment.name() == prefix {
            return true;
        }
        match (&self.db, prefix.split_once('.')) {
            (Some(db), Some((p_db, p_frag))) => db == p_db && self.fragment.name() == p_frag,
            _ => false,
        }
    }
}

/// Rows chosen from the inputs
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Selection {
    offsets: Vec<usize>,
    rows: Vec<usize>,
}

impl Selection {
    /// Select every row of a single input
    pub fn full(row_count: usize) -> Self {
        Self {
            offsets: vec![0],
            rows: (0..row_count).collect(),
        }
    }

    /// Build a selection from per-input offsets and the kept deltas
    pub fn new(offsets: Vec<usize>, rows: Vec<usize>) -> Self {
        Self { offsets, rows }
    }

    /// Number of selected rows
    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    /// Row of input `source` for selected entry `k`
    pub fn row(&self, source: usize, k: usize) -> usize {
        self.offsets[source] + self.rows[k]
    }

    pub fn offsets(&self) -> &[usize] {
        &self.offsets
    }

    pub fn rows(&self) -> &[usize] {
        &self.rows
    }

    /// Replace the selected entries, keeping offsets
    pub fn set_rows(&mut self, rows: Vec<usize>) {
        self.rows = rows;
    }
}

/// Shared evaluation settings of one query
#[derive(Debug, Clone, Copy)]
pub struct QueryContext<'a> {
    pub registry: &'a FunctionRegistry,
    pub args: &'a [BinaryArg],
    /// Extra symbol-table slots beyond the bound variables
    pub headroom: usize,
}

impl<'a> QueryContext<'a> {
    pub fn new(registry: &'a FunctionRegistry, args: &'a [BinaryArg]) -> Self {
        Self {
            registry,
            args,
            headroom: 0,
        }
    }

    pub fn with_headroom(mut self, headroom: usize) -> Self {
        self.headroom = headroom;
        self
    }
}
