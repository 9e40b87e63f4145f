//! # Scriptrunner - compile, load and invoke scripts at run time
//!
//! Scriptrunner hosts dynamically supplied code. A program hands it the text of a
//! source unit written in a small S-expression dialect; the host compiles the text
//! against a set of reference libraries into a binary unit, loads the unit, builds
//! its exported type with a [`DependencyBag`] of named values and live host objects,
//! and calls the type's parameterless `process` method.
//!
//! Failures are reported in two separate domains:
//!
//! - **Compilation** - a list of [`Diagnostic`]s with stable identifiers such as
//!   `SR3001`. No binary is produced when any of them is an error.
//! - **Execution** - an [`ExecutionOutcome`] whose failure carries the whole cause
//!   chain of the exception, outermost first.
//!
//! ## Quick Start
//!
//! ```rust
//! use scriptrunner::{DependencyBag, ReferenceSet, ScriptHost, SourceUnit, Value};
//!
//! # fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let source = SourceUnit::new(
//!     r#"
//!     (defclass Script (deps)
//!       (defmethod process ()
//!         (str "Message: " (. deps message))))
//!     "#,
//! );
//!
//! let host = ScriptHost::new(ReferenceSet::standard())?;
//! let bag = DependencyBag::new().with("message", "HELLO!");
//! let report = host.run(&source, &bag)?;
//!
//! assert!(report.is_success());
//! let outcome = report.outcome.as_ref().unwrap();
//! assert_eq!(outcome.result(), Some(&Value::from("Message: HELLO!")));
//! # Ok(())
//! # }
//! ```
//!
//! ## Stages
//!
//! ```text
//! Source → Scanner → Parser → Shape check → Codegen → Image → Loader → Invoker
//! ```
//!
//! - [`Compiler`] - source unit to binary image plus diagnostics
//! - [`LoadContext`] - binary image to a resident unit and its exported type
//! - [`Invoker`] - constructs the exported type and calls its entry method
//! - [`ScriptHost`] - all three behind one call
//! - [`Report`] - the fixed text form of both failure domains
//!
//! ## The dialect
//!
//! ```text
//! (defclass Script (deps)                 ; exported type, one constructor parameter
//!   (field greeting "Hi")                 ; field with initializer
//!   (init (print "constructed"))          ; constructor body
//!   (defmethod process ()                 ; public entry method
//!     (define obj (. deps testObject))    ; dynamic member read
//!     (await (call obj write1 greeting))  ; dynamic call, awaited
//!     (call self helper 2))
//!   (defmethod- helper (n) (* n 21)))     ; private method
//! ```
//!
//! Member reads and calls on dependencies are bound at run time and need the
//! `runtime.dynamic` reference; library functions such as `str`, `print` and
//! `delay` bind at compile time to the first reference that provides them.

// Allow specific clippy warnings that are intentional design choices
#![allow(clippy::new_without_default)] // Option builders mirror their constructors
#![allow(clippy::result_large_err)] // Exceptions carry their cause chain by value

/// Version of the scriptrunner host
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

pub mod compiler;
pub mod error;
pub mod lexer;
pub mod loader;
pub mod parser;
pub mod pipeline;
pub mod references;
pub mod report;
pub mod runtime;

// Re-export main types
pub use compiler::{
    codes, CompilationResult, CompileOptions, Compiler, Diagnostic, Severity, SourceUnit,
    DEFAULT_ENTRY_METHOD,
};
pub use error::{Error, Result};
pub use lexer::{SExprScanner, Token, TokenKind};
pub use loader::{ExportedType, LoadContext, LoadError, LoadedUnit};
pub use parser::{SExprParser, Span, SyntaxTree};
pub use pipeline::{RunReport, ScriptHost};
pub use references::{Builtin, Library, Reference, ReferenceSet};
pub use report::Report;
pub use runtime::{
    CauseFrame, DependencyBag, Exception, ExceptionKind, ExecutionOutcome, HostObject,
    InvokeOptions, Invoker, OutcomeSummary, Task, Value,
};

/// Type alias for the S-expression scanner (lexer).
/// Converts raw source text into tokens for the parser.
pub type Scanner = SExprScanner;

/// Type alias for the S-expression parser.
/// Converts tokens into the syntax tree of a source unit.
pub type Parser = SExprParser;
