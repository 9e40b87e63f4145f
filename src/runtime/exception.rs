//! Run-time failures raised inside compiled code
//!
//! An [`Exception`] is the only failure type that crosses the invocation boundary.
//! Exceptions nest through their `cause`; the invoker flattens the nesting into an
//! ordered list of [`CauseFrame`]s, outermost first.

use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

/// Exception types raised by the runtime itself
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExceptionKind {
    /// A member or method name could not be resolved on a dynamic target
    MemberNotFound,
    /// Member access or call on `null`
    NullReference,
    /// An operation received a value of the wrong type
    TypeMismatch,
    /// Wrong number or shape of arguments
    ArgumentError,
    /// Integer division or remainder by zero
    DivideByZero,
    /// Integer arithmetic overflow
    Overflow,
    /// Index outside a collection
    IndexOutOfRange,
    /// Call depth limit exceeded
    StackOverflow,
    /// Invocation deadline expired
    Timeout,
    /// The entry method could not be resolved on the loaded type
    EntryPointNotFound,
    /// A task could not be driven to completion
    TaskFailed,
    /// Bytecode did something the verifier should have rejected
    InvalidProgram,
}

impl ExceptionKind {
    /// Type name reported in cause chains
    pub fn as_str(&self) -> &'static str {
        match self {
            ExceptionKind::MemberNotFound => "MemberNotFound",
            ExceptionKind::NullReference => "NullReference",
            ExceptionKind::TypeMismatch => "TypeMismatch",
            ExceptionKind::ArgumentError => "ArgumentError",
            ExceptionKind::DivideByZero => "DivideByZero",
            ExceptionKind::Overflow => "Overflow",
            ExceptionKind::IndexOutOfRange => "IndexOutOfRange",
            ExceptionKind::StackOverflow => "StackOverflow",
            ExceptionKind::Timeout => "Timeout",
            ExceptionKind::EntryPointNotFound => "EntryPointNotFound",
            ExceptionKind::TaskFailed => "TaskFailed",
            ExceptionKind::InvalidProgram => "InvalidProgram",
        }
    }
}

impl fmt::Display for ExceptionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A run-time failure with an optional inner cause
#[derive(Error, Debug, Clone, PartialEq)]
#[error("{type_name}: {message}")]
pub struct Exception {
    type_name: String,
    message: String,
    #[source]
    cause: Option<Box<Exception>>,
}

impl Exception {
    /// Creates an exception with a script- or host-defined type name
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        Exception {
            type_name: type_name.into(),
            message: message.into(),
            cause: None,
        }
    }

    /// Creates an exception of one of the runtime's own kinds
    pub fn of(kind: ExceptionKind, message: impl Into<String>) -> Self {
        Exception::new(kind.as_str(), message)
    }

    /// Wraps `cause` as the inner exception
    pub fn with_cause(mut self, cause: Exception) -> Self {
        self.cause = Some(Box::new(cause));
        self
    }

    /// Member lookup failure on a dynamic target
    pub fn member_not_found(target_type: &str, member: &str) -> Self {
        Exception::of(
            ExceptionKind::MemberNotFound,
            format!(
                "'{}' does not contain a definition for '{}'",
                target_type, member
            ),
        )
    }

    /// Value of the wrong type
    pub fn type_mismatch(expected: &str, got: &str) -> Self {
        Exception::of(
            ExceptionKind::TypeMismatch,
            format!("Expected {}, got {}", expected, got),
        )
    }

    /// Type name of the outermost exception
    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    /// Message of the outermost exception
    pub fn message(&self) -> &str {
        &self.message
    }

    /// Inner exception, if any
    pub fn cause(&self) -> Option<&Exception> {
        self.cause.as_deref()
    }

    /// True if this exception is of the given runtime kind
    pub fn is(&self, kind: ExceptionKind) -> bool {
        self.type_name == kind.as_str()
    }

    /// Scripts may handle everything except an expired deadline
    pub fn is_catchable(&self) -> bool {
        !self.is(ExceptionKind::Timeout)
    }

    /// Flattens the cause chain, outermost first
    pub fn chain(&self) -> Vec<CauseFrame> {
        let mut frames = Vec::new();
        let mut current = Some(self);
        while let Some(exception) = current {
            frames.push(CauseFrame {
                type_name: exception.type_name.clone(),
                message: exception.message.clone(),
            });
            current = exception.cause();
        }
        frames
    }

    /// Number of exceptions in the chain, including this one
    pub fn depth(&self) -> usize {
        std::iter::successors(Some(self), |e| e.cause()).count()
    }
}

/// One entry of a flattened cause chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CauseFrame {
    /// Exception type name
    pub type_name: String,
    /// Exception message
    pub message: String,
}

impl CauseFrame {
    /// Creates a frame
    pub fn new(type_name: impl Into<String>, message: impl Into<String>) -> Self {
        CauseFrame {
            type_name: type_name.into(),
            message: message.into(),
        }
    }
}

impl fmt::Display for CauseFrame {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.type_name, self.message)
    }
}
