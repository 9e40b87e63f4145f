//! Text reports for the two failure domains

use std::fmt;

use crate::compiler::CompilationResult;
use crate::runtime::ExecutionOutcome;

/// Headline of a compilation that produced a binary
pub const COMPILATION_SUCCEEDED: &str = "Compilation successful";
/// Headline of a compilation that did not
pub const COMPILATION_FAILED: &str = "Compilation failed";
/// Headline of a successful invocation
pub const EXECUTION_SUCCEEDED: &str = "Execution successful";
/// Headline of a failed invocation
pub const EXECUTION_FAILED: &str = "Execution failed";

/// A headline followed by detail lines
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Report {
    lines: Vec<String>,
}

impl Report {
    /// `Compilation failed` and one `"{id}: {message}"` line per failing
    /// diagnostic, or `Compilation successful`
    pub fn compilation(result: &CompilationResult) -> Self {
        if result.is_success() {
            return Report {
                lines: vec![COMPILATION_SUCCEEDED.to_string()],
            };
        }
        let mut lines = vec![COMPILATION_FAILED.to_string()];
        lines.extend(result.errors().map(|d| d.to_string()));
        Report { lines }
    }

    /// `Execution failed` and one `"{typeName}: {message}"` line per cause,
    /// outermost first, or `Execution successful`
    pub fn execution(outcome: &ExecutionOutcome) -> Self {
        match outcome {
            ExecutionOutcome::Success { .. } => Report {
                lines: vec![EXECUTION_SUCCEEDED.to_string()],
            },
            ExecutionOutcome::Failure { cause_chain } => {
                let mut lines = vec![EXECUTION_FAILED.to_string()];
                lines.extend(cause_chain.iter().map(|frame| frame.to_string()));
                Report { lines }
            }
        }
    }

    /// First line
    pub fn headline(&self) -> &str {
        self.lines.first().map(String::as_str).unwrap_or_default()
    }

    /// Lines after the headline
    pub fn details(&self) -> &[String] {
        self.lines.get(1..).unwrap_or_default()
    }

    /// All lines
    pub fn lines(&self) -> &[String] {
        &self.lines
    }
}

impl fmt::Display for Report {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.lines.join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{codes, Diagnostic, Severity};
    use crate::parser::Span;
    use crate::runtime::{CauseFrame, Value};

    #[test]
    fn test_compilation_report_lists_only_failing_diagnostics() {
        let mut escalated = Diagnostic::warning(codes::UNUSED_LOCAL, "unused x", Span::new(2, 3));
        escalated.is_warning_as_error = true;
        let result = CompilationResult::Failure {
            diagnostics: vec![
                Diagnostic::new(codes::DUPLICATE_REFERENCE, Severity::Info, "dup", None),
                Diagnostic::error(codes::UNRESOLVED_NAME, "no y", Span::new(1, 1)),
                Diagnostic::warning(codes::UNREACHABLE_CODE, "dead", Span::new(4, 1)),
                escalated,
            ],
        };

        let report = Report::compilation(&result);
        assert_eq!(report.headline(), COMPILATION_FAILED);
        assert_eq!(report.details(), &["SR3001: no y", "SR4001: unused x"]);
    }

    #[test]
    fn test_compilation_success() {
        let result = CompilationResult::Success {
            binary: Vec::new(),
            diagnostics: Vec::new(),
        };
        assert_eq!(Report::compilation(&result).to_string(), COMPILATION_SUCCEEDED);
    }

    #[test]
    fn test_execution_report_orders_causes() {
        let outcome = ExecutionOutcome::Failure {
            cause_chain: vec![
                CauseFrame::new("Outer", "a"),
                CauseFrame::new("Inner", "b"),
            ],
        };
        assert_eq!(
            Report::execution(&outcome).to_string(),
            "Execution failed\nOuter: a\nInner: b"
        );

        let success = ExecutionOutcome::Success {
            result: Value::Null,
        };
        assert_eq!(Report::execution(&success).lines(), &[EXECUTION_SUCCEEDED]);
    }
}
