//! Catalog module
//!
//! This module contains the MetaDB interface and the in-process catalog that
//! implements it.

pub mod catalog;
pub mod meta;

pub use catalog::MetaCatalog;
pub use meta::{DbDef, FragDef, MetaDb};
