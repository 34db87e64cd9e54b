//! Session dispatcher for FragDB
//!
//! This module parses a query, dispatches it to the matching operation and
//! returns results. A session belongs to one connection and owns the
//! running statement opened by `create_frag`.

use serde::Serialize;
use std::path::PathBuf;
use std::sync::Arc;

use tracing::{debug, info, warn};

use super::context::{EngineContext, DEFAULT_PRODUCER};
use super::producer::{DimensionDescriptor, ProducerRequest};
use crate::catalog::FragDef;
use crate::error::{Error, Result};
use crate::expr::Value;
use crate::fragment::{Field, FieldType, Fragment, Schema};
use crate::query::insert::{build_record, build_records};
use crate::query::{
    execute_select, BinaryArg, Limit, Operation, QueryArgs, RunningStatement, SelectRequest,
    Source,
};
use crate::storage::validate_name;

/// Query result
#[derive(Debug, Serialize)]
pub struct QueryResult {
    /// Column names
    pub columns: Vec<String>,
    /// Result rows
    pub rows: Vec<Vec<Value>>,
    /// Number of rows written by the operation
    pub affected_rows: usize,
    /// Message
    pub message: Option<String>,
}

impl QueryResult {
    /// Create a new empty result
    pub fn empty() -> Self {
        Self {
            columns: Vec::new(),
            rows: Vec::new(),
            affected_rows: 0,
            message: None,
        }
    }

    /// Create a result with a message
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
            ..Self::empty()
        }
    }

    /// Create a result with affected rows count
    pub fn with_affected_rows(count: usize, message: impl Into<String>) -> Self {
        Self {
            affected_rows: count,
            message: Some(message.into()),
            ..Self::empty()
        }
    }

    /// Decode a fragment into a row result
    pub fn from_fragment(frag: &Fragment) -> Result<Self> {
        let columns = frag
            .schema()
            .field_names()
            .into_iter()
            .map(str::to_string)
            .collect();
        let rows = (0..frag.row_count())
            .map(|row| {
                (0..frag.field_count())
                    .map(|field| frag.value(row, field))
                    .collect::<Result<Vec<_>>>()
            })
            .collect::<Result<Vec<_>>>()?;
        Ok(Self {
            columns,
            rows,
            ..Self::empty()
        })
    }
}

/// Split `db.frag`, falling back to `default_db` for a bare name
fn qualified(name: &str, default_db: Option<&str>) -> Result<(String, String)> {
    let (db, frag) = match name.split_once('.') {
        Some((db, frag)) => (db.to_string(), frag.to_string()),
        None => (
            default_db
                .ok_or_else(|| Error::NullParam("db_name".to_string()))?
                .to_string(),
            name.to_string(),
        ),
    };
    validate_name(&db)?;
    validate_name(&frag)?;
    Ok((db, frag))
}

/// Per-connection query session
pub struct Session {
    engine: Arc<EngineContext>,
    statement: Option<RunningStatement>,
}

impl Session {
    pub fn new(engine: Arc<EngineContext>) -> Self {
        Self {
            engine,
            statement: None,
        }
    }

    pub fn engine(&self) -> &EngineContext {
        &self.engine
    }

    /// The statement opened by `create_frag`, if any
    pub fn running_statement(&self) -> Option<&RunningStatement> {
        self.statement.as_ref()
    }

    /// Parse and execute one query
    pub fn execute(&mut self, query: &str, args: &[BinaryArg]) -> Result<QueryResult> {
        let parsed = QueryArgs::parse(query)?;
        let op = parsed.operation()?;
        debug!(%op, binary_args = args.len(), "dispatching query");

        let result = match op {
            Operation::CreateDb => self.create_db(&parsed),
            Operation::DropDb => self.drop_db(&parsed),
            Operation::CreateFrag => self.create_frag(&parsed),
            Operation::Insert | Operation::MultiInsert => self.insert(op, &parsed, args),
            Operation::CreateFragSelect => self.create_frag_select(&parsed, args),
            Operation::CreateFragFromFile => self.create_frag_from_file(&parsed),
            Operation::Select => self.select(&parsed, args),
            Operation::DropFrag => self.drop_frag(&parsed),
        };

        if let Err(e) = &result {
            warn!(%op, error = %e, "query failed");
            if matches!(op, Operation::Insert | Operation::MultiInsert) {
                if let Some(stmt) = self.statement.take() {
                    warn!(frag = stmt.frag_name(), "running statement discarded");
                }
            }
        }
        result
    }

    fn target(&self, args: &QueryArgs) -> Result<(String, String)> {
        qualified(args.require("frag_name")?, args.get("db_name"))
    }

    fn ensure_new_fragment(&self, db: &str, name: &str) -> Result<()> {
        let catalog = self.engine.catalog();
        catalog.find_db(db)?;
        match catalog.find_frag(db, name) {
            Ok(_) => Err(Error::AlreadyExists(format!("{}.{}", db, name))),
            Err(Error::FragmentNotFound(_)) => Ok(()),
            Err(e) => Err(e),
        }
    }

    /// Register a fragment and write it to storage
    ///
    /// The catalog entry is claimed first, so a name taken by another
    /// session fails before any image is written.
    fn store(&self, frag: &Fragment, db: &str, device: Option<&str>) -> Result<()> {
        let storage = self.engine.storage();
        let catalog = self.engine.catalog();

        catalog.add_frag(FragDef::describe(db, device, frag))?;
        if let Err(e) = storage.put_frag(db, frag) {
            if let Err(cleanup) = catalog.remove_frag(db, frag.name()) {
                warn!(error = %cleanup, "could not release catalog entry of unstored fragment");
            }
            return Err(e);
        }
        catalog.flush()?;
        info!(
            db,
            frag = frag.name(),
            rows = frag.row_count(),
            bytes = frag.size_bytes(),
            "fragment stored"
        );
        Ok(())
    }

    fn create_db(&mut self, args: &QueryArgs) -> Result<QueryResult> {
        let name = args.require("db_name")?;
        validate_name(name)?;
        let catalog = self.engine.catalog();
        catalog.add_db(name)?;
        if let Err(e) = self.engine.storage().put_db(name) {
            catalog.remove_db(name)?;
            return Err(e);
        }
        catalog.flush()?;
        info!(db = name, "database created");
        Ok(QueryResult::with_message(format!("Database '{}' created", name)))
    }

    fn drop_db(&mut self, args: &QueryArgs) -> Result<QueryResult> {
        let name = args.require("db_name")?;
        let catalog = self.engine.catalog();
        let def = catalog.find_db(name)?;
        if self.statement.as_ref().map_or(false, |s| s.db() == name) {
            return Err(Error::exec(format!(
                "database '{}' has a statement in progress",
                name
            )));
        }
        self.engine.storage().delete_db(name)?;
        catalog.remove_db(name)?;
        catalog.flush()?;
        info!(db = name, fragments = def.fragments.len(), "database dropped");
        Ok(QueryResult::with_message(format!(
            "Database '{}' dropped ({} fragment(s))",
            name,
            def.fragments.len()
        )))
    }

    fn create_frag(&mut self, args: &QueryArgs) -> Result<QueryResult> {
        if let Some(open) = &self.statement {
            return Err(Error::exec(format!(
                "statement for '{}.{}' is still open",
                open.db(),
                open.frag_name()
            )));
        }

        let (db, name) = self.target(args)?;
        self.ensure_new_fragment(&db, &name)?;

        let fields = args.require_multi("field")?;
        let types = args.require_multi("field_type")?;
        if fields.len() != types.len() {
            return Err(Error::exec(format!(
                "{} field names but {} field types",
                fields.len(),
                types.len()
            )));
        }
        let mut schema = Schema::new();
        for (field, ty) in fields.iter().zip(&types) {
            schema.add_field(Field::new(field.clone(), ty.parse::<FieldType>()?, 0));
        }

        let runs = args.get_usize("run")?.unwrap_or(1);
        let device = args.get("device").map(str::to_string);
        let stmt = RunningStatement::open(db.clone(), name.clone(), device, schema, runs);

        if runs == 0 {
            let frag = stmt.finish();
            self.store(&frag, &db, args.get("device"))?;
            return Ok(QueryResult::with_message(format!(
                "Fragment '{}.{}' created empty",
                db, name
            )));
        }

        info!(db = %db, frag = %name, runs, "statement opened");
        self.statement = Some(stmt);
        Ok(QueryResult::with_message(format!(
            "Fragment '{}.{}' opened for {} run(s)",
            db, name, runs
        )))
    }

    fn insert(&mut self, op: Operation, args: &QueryArgs, binary: &[BinaryArg]) -> Result<QueryResult> {
        let engine = Arc::clone(&self.engine);
        let ctx = engine.query_context(binary);
        let stmt = self
            .statement
            .as_mut()
            .ok_or_else(|| Error::exec("no open statement; run create_frag first"))?;

        let fields = args.multi("field")?;
        let values = args.require_multi("value")?;
        let records = match op {
            Operation::MultiInsert => build_records(stmt.schema(), &fields, &values, &ctx)?,
            _ => vec![build_record(stmt.schema(), &fields, &values, &ctx)?],
        };
        let count = records.len();

        if !stmt.append(records, args.flag("final_statement"))? {
            return Ok(QueryResult::with_affected_rows(
                count,
                format!("{} row(s) buffered (run {} of {})", count, stmt.current_run(), stmt.total_runs()),
            ));
        }

        let stmt = match self.statement.take() {
            Some(stmt) => stmt,
            None => return Err(Error::exec("running statement vanished")),
        };
        let db = stmt.db().to_string();
        let device = stmt.device().map(str::to_string);
        let frag = stmt.finish();
        self.store(&frag, &db, device.as_deref())?;
        Ok(QueryResult::with_affected_rows(
            count,
            format!("Fragment '{}.{}' stored with {} row(s)", db, frag.name(), frag.row_count()),
        ))
    }

    /// Resolve and load the `from` fragments
    fn load_sources(&self, args: &QueryArgs) -> Result<Vec<Source>> {
        let from = args.require_multi("from")?;
        let aliases = args.multi("from_alias")?;
        if !aliases.is_empty() && aliases.len() != from.len() {
            return Err(Error::exec(format!(
                "{} aliases given for {} input fragments",
                aliases.len(),
                from.len()
            )));
        }

        let default_db = args.get("db_name");
        let mut sources = Vec::with_capacity(from.len());
        for (i, entry) in from.iter().enumerate() {
            let (db, name) = qualified(entry, default_db)?;
            self.engine.catalog().find_frag(&db, &name)?;
            let frag = self.engine.storage().get_frag(&db, &name)?;
            sources.push(
                Source::new(frag)
                    .with_alias(aliases.get(i).cloned())
                    .with_db(Some(db)),
            );
        }
        Ok(sources)
    }

    fn select_request(args: &QueryArgs, name: String) -> Result<SelectRequest> {
        Ok(SelectRequest {
            name,
            fields: args.require_multi("field")?,
            aliases: args.multi("field_alias")?,
            where_clause: args.get("where").map(str::to_string),
            group: args.multi("group")?,
            order: args.get("order").map(str::to_string),
            limit: Limit::parse(&args.multi("limit")?)?,
            sequential_id: args.get_i64("sequential_id")?,
        })
    }

    fn create_frag_select(&mut self, args: &QueryArgs, binary: &[BinaryArg]) -> Result<QueryResult> {
        let (db, name) = self.target(args)?;
        self.ensure_new_fragment(&db, &name)?;
        let sources = self.load_sources(args)?;
        let request = Self::select_request(args, name)?;

        let frag = execute_select(&request, &sources, &self.engine.query_context(binary))?;
        self.store(&frag, &db, args.get("device"))?;
        Ok(QueryResult::with_affected_rows(
            frag.row_count(),
            format!("Fragment '{}.{}' created with {} row(s)", db, frag.name(), frag.row_count()),
        ))
    }

    fn select(&mut self, args: &QueryArgs, binary: &[BinaryArg]) -> Result<QueryResult> {
        let sources = self.load_sources(args)?;
        let name = args.get("frag_name").unwrap_or("result").to_string();
        let request = Self::select_request(args, name)?;
        let frag = execute_select(&request, &sources, &self.engine.query_context(binary))?
            .with_tmp(true);
        QueryResult::from_fragment(&frag)
    }

    fn create_frag_from_file(&mut self, args: &QueryArgs) -> Result<QueryResult> {
        let (db, name) = self.target(args)?;
        self.ensure_new_fragment(&db, &name)?;

        let producer = self
            .engine
            .producer(args.get("producer").unwrap_or(DEFAULT_PRODUCER))?;
        let request = ProducerRequest {
            src_path: PathBuf::from(args.require("src_path")?),
            measure: args.require("measure")?.to_string(),
            nrows: args.get_usize("nrows")?,
            id_start: args.get_i64("id_start")?.unwrap_or(1),
            dims: dimensions(args)?,
        };

        let mut frag = producer.produce(&request)?;
        frag.set_name(name);
        self.store(&frag, &db, args.get("device"))?;
        Ok(QueryResult::with_affected_rows(
            frag.row_count(),
            format!("Fragment '{}.{}' imported with {} row(s)", db, frag.name(), frag.row_count()),
        ))
    }

    fn drop_frag(&mut self, args: &QueryArgs) -> Result<QueryResult> {
        let (db, name) = self.target(args)?;
        let catalog = self.engine.catalog();
        catalog.find_frag(&db, &name)?;
        self.engine.storage().delete_frag(&db, &name)?;
        catalog.remove_frag(&db, &name)?;
        catalog.flush()?;
        info!(db = %db, frag = %name, "fragment dropped");
        Ok(QueryResult::with_message(format!("Fragment '{}.{}' dropped", db, name)))
    }
}

/// Zip the `dim_*` multi-values into descriptors
fn dimensions(args: &QueryArgs) -> Result<Vec<DimensionDescriptor>> {
    let types = args.multi("dim_type")?;
    let column = |key: &str| -> Result<Vec<String>> {
        let values = args.multi(key)?;
        if !values.is_empty() && values.len() != types.len() {
            return Err(Error::exec(format!(
                "'{}' has {} entries, 'dim_type' has {}",
                key,
                values.len(),
                types.len()
            )));
        }
        Ok(values)
    };
    let indexes = column("dim_index")?;
    let starts = column("dim_start")?;
    let ends = column("dim_end")?;

    let num = |values: &[String], i: usize, key: &str, default: i64| -> Result<i64> {
        match values.get(i) {
            Some(v) => v
                .parse()
                .map_err(|_| Error::ParseError(format!("'{}' must be an integer, got '{}'", key, v))),
            None => Ok(default),
        }
    };

    types
        .iter()
        .enumerate()
        .map(|(i, ty)| {
            Ok(DimensionDescriptor {
                dim_type: ty.clone(),
                index: num(&indexes, i, "dim_index", i as i64 + 1)?.max(0) as usize,
                start: num(&starts, i, "dim_start", 1)?,
                end: num(&ends, i, "dim_end", 0)?,
            })
        })
        .collect()
}
