//! Error types for FragDB
//!
//! Every operator returns a [`Result`]. Variants are grouped by the kind of
//! failure so the dispatcher can report a stable [`ErrorKind`] to clients.

use thiserror::Error;

/// Broad failure class reported to the protocol layer
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// A required argument was missing or empty
    NullParam,
    /// Allocation or capacity failure
    Memory,
    /// Malformed expression, name or argument string
    Parse,
    /// Semantic violation during execution
    Exec,
    /// Catalog failure
    MetaDb,
    /// Storage backend failure
    Api,
    /// Operating system I/O failure
    Io,
}

/// The main error type for FragDB
#[derive(Error, Debug)]
pub enum Error {
    // ========== Precondition Errors ==========
    #[error("Missing parameter: {0}")]
    NullParam(String),

    #[error("Memory error: {0}")]
    Memory(String),

    // ========== Parse Errors ==========
    #[error("Lexer error: unexpected character '{0}' at position {1}")]
    UnexpectedCharacter(char, usize),

    #[error("Lexer error: unterminated string literal starting at position {0}")]
    UnterminatedString(usize),

    #[error("Lexer error: invalid number format at position {0}")]
    InvalidNumber(usize),

    #[error("Parse error: unexpected token '{found}', expected {expected}")]
    UnexpectedToken { expected: String, found: String },

    #[error("Parse error: {0}")]
    ParseError(String),

    // ========== Evaluation Errors ==========
    #[error("Execution error: unknown symbol '{0}'")]
    UnknownSymbol(String),

    #[error("Execution error: function '{name}' requires {required} argument(s), got {given}")]
    ArgCount {
        name: String,
        required: String,
        given: usize,
    },

    #[error("Execution error: {context} expects a numeric argument, got {found}")]
    ArgType { context: String, found: String },

    #[error("Execution error: symbol table is full (capacity {0})")]
    SymtableFull(usize),

    #[error("Execution error: division by zero")]
    DivisionByZero,

    // ========== Fragment Errors ==========
    #[error("Execution error: field '{0}' not found in fragment '{1}'")]
    FieldNotFound(String, String),

    #[error("Execution error: cannot convert {from} to {to}")]
    TypeMismatch { from: String, to: String },

    #[error("Execution error: {0}")]
    ExecutionError(String),

    // ========== Collaborator Errors ==========
    #[error("MetaDB error: {0}")]
    MetaDb(String),

    #[error("MetaDB error: database '{0}' not found")]
    DatabaseNotFound(String),

    #[error("MetaDB error: fragment '{0}' not found")]
    FragmentNotFound(String),

    #[error("MetaDB error: '{0}' already exists")]
    AlreadyExists(String),

    #[error("Storage API error: {0}")]
    Api(String),

    // ========== I/O Errors ==========
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl Error {
    /// Classify this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::NullParam(_) => ErrorKind::NullParam,
            Error::Memory(_) => ErrorKind::Memory,
            Error::UnexpectedCharacter(..)
            | Error::UnterminatedString(_)
            | Error::InvalidNumber(_)
            | Error::UnexpectedToken { .. }
            | Error::ParseError(_) => ErrorKind::Parse,
            Error::UnknownSymbol(_)
            | Error::ArgCount { .. }
            | Error::ArgType { .. }
            | Error::SymtableFull(_)
            | Error::DivisionByZero
            | Error::FieldNotFound(..)
            | Error::TypeMismatch { .. }
            | Error::ExecutionError(_) => ErrorKind::Exec,
            Error::MetaDb(_)
            | Error::DatabaseNotFound(_)
            | Error::FragmentNotFound(_)
            | Error::AlreadyExists(_) => ErrorKind::MetaDb,
            Error::Api(_) => ErrorKind::Api,
            Error::IoError(_) => ErrorKind::Io,
        }
    }

    /// Shorthand for an execution error
    pub(crate) fn exec(msg: impl Into<String>) -> Self {
        Error::ExecutionError(msg.into())
    }
}

/// Result type alias for FragDB operations
pub type Result<T> = std::result::Result<T, Error>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::UnknownSymbol("oph_foo".to_string());
        assert_eq!(err.to_string(), "Execution error: unknown symbol 'oph_foo'");

        let err = Error::UnexpectedCharacter('@', 5);
        assert_eq!(
            err.to_string(),
            "Lexer error: unexpected character '@' at position 5"
        );
    }

    #[test]
    fn test_error_kind() {
        assert_eq!(Error::SymtableFull(3).kind(), ErrorKind::Exec);
        assert_eq!(Error::InvalidNumber(0).kind(), ErrorKind::Parse);
        assert_eq!(Error::Api("down".into()).kind(), ErrorKind::Api);
        assert_eq!(
            Error::DatabaseNotFound("db".into()).kind(),
            ErrorKind::MetaDb
        );
    }
}
