//! Expression language
//!
//! This module contains the embedded interpreter:
//! - Runtime values
//! - Expression text front-end (lexer, parser, AST)
//! - Function registry and symbol table
//! - Tree-walking evaluator

pub mod ast;
pub mod eval;
pub mod functions;
pub mod lexer;
pub mod parser;
pub mod symtable;
pub mod token;
pub mod value;

pub use ast::{BinaryOperator, Node, UnaryOperator};
pub use eval::{evaluate, is_aggregating, Emission, GroupEvaluator};
pub use functions::{Accumulator, Arity, FunctionDef, FunctionKind, FunctionRegistry};
pub use parser::parse_expression;
pub use symtable::{Symbol, SymbolTable};
pub use value::Value;
