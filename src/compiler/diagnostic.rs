//! Compile-time diagnostics

use serde::{Deserialize, Serialize};
use std::fmt;

use crate::parser::Span;

/// Diagnostic identifiers
pub mod codes {
    /// Lexical error
    pub const LEXICAL_ERROR: &str = "SR1001";
    /// Syntax error
    pub const SYNTAX_ERROR: &str = "SR1002";
    /// No exported type
    pub const NO_EXPORTED_TYPE: &str = "SR2001";
    /// More than one exported type
    pub const MULTIPLE_EXPORTED_TYPES: &str = "SR2002";
    /// Constructor must take exactly one dependency parameter
    pub const CONSTRUCTOR_SHAPE: &str = "SR2003";
    /// Entry method not found
    pub const ENTRY_METHOD_MISSING: &str = "SR2004";
    /// Entry method is not public
    pub const ENTRY_METHOD_NOT_PUBLIC: &str = "SR2005";
    /// Entry method takes parameters
    pub const ENTRY_METHOD_HAS_PARAMETERS: &str = "SR2006";
    /// Duplicate member in a type
    pub const DUPLICATE_MEMBER: &str = "SR2007";
    /// Duplicate type name
    pub const DUPLICATE_TYPE: &str = "SR2008";
    /// Unresolved name
    pub const UNRESOLVED_NAME: &str = "SR3001";
    /// Function not found in any referenced library
    pub const UNRESOLVED_FUNCTION: &str = "SR3002";
    /// Dynamic operation without the dynamic-binding runtime
    pub const DYNAMIC_RUNTIME_MISSING: &str = "SR3003";
    /// Wrong number of arguments
    pub const ARGUMENT_COUNT: &str = "SR3004";
    /// Unknown member of `self`
    pub const UNKNOWN_SELF_MEMBER: &str = "SR3005";
    /// Operator applied to a literal of the wrong type
    pub const LITERAL_TYPE: &str = "SR3006";
    /// Local variable defined but never read
    pub const UNUSED_LOCAL: &str = "SR4001";
    /// Unreachable expression
    pub const UNREACHABLE_CODE: &str = "SR4002";
    /// Duplicate reference identifier
    pub const DUPLICATE_REFERENCE: &str = "SR4003";
}

/// Diagnostic severity
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub enum Severity {
    /// Informational; never fails a compilation
    Info,
    /// Fails a compilation only when escalated
    Warning,
    /// Always fails a compilation
    Error,
}

impl fmt::Display for Severity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Severity::Info => "info",
            Severity::Warning => "warning",
            Severity::Error => "error",
        };
        f.write_str(name)
    }
}

/// A message produced by the compiler
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Diagnostic {
    /// Stable identifier, e.g. `SR3001`
    pub id: String,
    /// Severity before escalation
    pub severity: Severity,
    /// Human readable message
    pub message: String,
    /// Source position, when the diagnostic refers to one
    pub location: Option<Span>,
    /// Set when a warning was escalated to an error by the compile options
    pub is_warning_as_error: bool,
}

impl Diagnostic {
    /// Creates a diagnostic
    pub fn new(
        id: &str,
        severity: Severity,
        message: impl Into<String>,
        location: Option<Span>,
    ) -> Self {
        Diagnostic {
            id: id.to_string(),
            severity,
            message: message.into(),
            location,
            is_warning_as_error: false,
        }
    }

    /// Error at a position
    pub fn error(id: &str, message: impl Into<String>, location: Span) -> Self {
        Diagnostic::new(id, Severity::Error, message, Some(location))
    }

    /// Warning at a position
    pub fn warning(id: &str, message: impl Into<String>, location: Span) -> Self {
        Diagnostic::new(id, Severity::Warning, message, Some(location))
    }

    /// True when this diagnostic prevents a binary from being emitted
    pub fn is_failure(&self) -> bool {
        self.severity == Severity::Error
            || (self.severity == Severity::Warning && self.is_warning_as_error)
    }
}

impl fmt::Display for Diagnostic {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.id, self.message)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_failure_classification() {
        let span = Span::new(1, 1);
        assert!(Diagnostic::error(codes::UNRESOLVED_NAME, "x", span).is_failure());

        let mut warning = Diagnostic::warning(codes::UNUSED_LOCAL, "y", span);
        assert!(!warning.is_failure());
        warning.is_warning_as_error = true;
        assert!(warning.is_failure());

        let info = Diagnostic::new(codes::DUPLICATE_REFERENCE, Severity::Info, "z", None);
        assert!(!info.is_failure());
    }

    #[test]
    fn test_display_is_id_and_message() {
        let d = Diagnostic::error(codes::SYNTAX_ERROR, "Expected ')'", Span::new(3, 7));
        assert_eq!(d.to_string(), "SR1002: Expected ')'");
    }
}
