//! Query operators
//!
//! This module contains the row-oriented operators that run over fragments:
//! - Argument surface (`key=value;...` and positional binary arguments)
//! - Variable binding
//! - WHERE evaluation and positional join
//! - GROUP BY, ORDER BY, LIMIT/OFFSET
//! - SELECT projection
//! - INSERT row building and running statements

pub mod args;
pub mod binding;
pub mod filter;
pub mod group;
pub mod insert;
pub mod order;
pub mod project;
pub mod select;
pub mod source;
pub mod statement;

pub use args::{BinaryArg, Operation, QueryArgs};
pub use binding::{Binding, RowBinder};
pub use filter::filter;
pub use group::{group_rows, Group};
pub use order::{order_fragment, order_selection, Limit};
pub use project::{project, Projection};
pub use select::{execute_select, SelectRequest};
pub use source::{QueryContext, Selection, Source};
pub use statement::RunningStatement;
