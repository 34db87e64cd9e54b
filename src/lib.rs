//! FragDB - query-execution core of a fragment-oriented array database
//!
//! This library provides the components that run queries over fragments:
//! - Expression language (lexer, parser, AST, symbol table, evaluator)
//! - Fragment data model (typed byte records, schemas)
//! - Storage backends and the catalog
//! - Query operators (filter, join, group, project, order, insert)
//! - Session dispatcher and TCP server

pub mod catalog;
pub mod error;
pub mod executor;
pub mod expr;
pub mod fragment;
pub mod query;
pub mod server;
pub mod storage;

pub use error::{Error, ErrorKind, Result};
