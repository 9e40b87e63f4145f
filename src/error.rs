//! Error types for the scriptrunner host
//!
//! Two failure domains never share a type: compile-time problems are reported as
//! [`Diagnostic`](crate::compiler::Diagnostic) values and run-time problems inside
//! compiled code as [`Exception`](crate::runtime::Exception) chains. [`Error`] covers
//! everything else: front-end errors before they are turned into diagnostics, and the
//! host-level conditions that are neither (a unit that fails to load after a
//! successful compile, a task runtime that cannot start).

use thiserror::Error;

use crate::loader::LoadError;

/// Host errors
#[derive(Error, Debug)]
pub enum Error {
    /// Lexical error encountered while scanning
    ///
    /// **Triggered by:** Characters the dialect does not use, unterminated strings,
    /// unknown escape sequences, out-of-range numbers
    /// **Example:** `(print "hello)`
    #[error("Lexical error at line {line}, column {col}: {message}")]
    LexicalError {
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Error description
        message: String,
    },

    /// Syntax error encountered during parsing
    ///
    /// **Triggered by:** Unbalanced parentheses, malformed special forms
    /// **Example:** `(defclass Script (deps)` (missing closing parenthesis)
    #[error("Syntax error at line {line}, column {col}: {message}")]
    SyntaxError {
        /// Line number where error occurred
        line: usize,
        /// Column number where error occurred
        col: usize,
        /// Error description
        message: String,
    },

    /// A binary unit that compiled successfully could not be loaded
    #[error(transparent)]
    Load(#[from] LoadError),

    /// Writing the binary image failed
    #[error("Emit failed: {0}")]
    Emit(String),

    /// The task runtime backing the invoker could not be started
    #[error("Failed to start task runtime: {0}")]
    RuntimeInit(#[from] std::io::Error),
}

impl Error {
    /// Line and column of a front-end error, if it has one
    pub fn location(&self) -> Option<(usize, usize)> {
        match self {
            Error::LexicalError { line, col, .. } | Error::SyntaxError { line, col, .. } => {
                Some((*line, *col))
            }
            _ => None,
        }
    }

    /// Bare message of a front-end error, without the location prefix
    pub fn message(&self) -> String {
        match self {
            Error::LexicalError { message, .. } | Error::SyntaxError { message, .. } => {
                message.clone()
            }
            other => other.to_string(),
        }
    }
}

/// Result type for scriptrunner operations
pub type Result<T> = std::result::Result<T, Error>;
