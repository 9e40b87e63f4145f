//! Compile, load and invoke in one place
//!
//! [`ScriptHost`] owns one compiler, one load context and one invoker over a fixed
//! reference set. Each stage is also callable on its own.

use uuid::Uuid;

use crate::compiler::{CompilationResult, CompileOptions, Compiler, SourceUnit};
use crate::loader::{ExportedType, LoadContext};
use crate::references::ReferenceSet;
use crate::report::Report;
use crate::runtime::{DependencyBag, ExecutionOutcome, InvokeOptions, Invoker};
use crate::Result;

/// Everything one run produced
#[derive(Debug, Clone)]
pub struct RunReport {
    /// Library name the source was compiled as
    pub library_name: String,
    /// Compiler output
    pub compilation: CompilationResult,
    /// Invocation outcome; `None` when compilation failed
    pub outcome: Option<ExecutionOutcome>,
}

impl RunReport {
    /// True when the source compiled and the entry method completed
    pub fn is_success(&self) -> bool {
        self.compilation.is_success()
            && self
                .outcome
                .as_ref()
                .map(ExecutionOutcome::is_success)
                .unwrap_or(false)
    }

    /// Compilation report
    pub fn compilation_report(&self) -> Report {
        Report::compilation(&self.compilation)
    }

    /// Execution report, when the unit was invoked
    pub fn execution_report(&self) -> Option<Report> {
        self.outcome.as_ref().map(Report::execution)
    }
}

/// The compile-load-invoke pipeline
pub struct ScriptHost {
    refs: ReferenceSet,
    compiler: Compiler,
    loader: LoadContext,
    invoker: Invoker,
}

impl ScriptHost {
    /// Host over `refs` with default options
    pub fn new(refs: ReferenceSet) -> Result<Self> {
        Self::with_options(refs, CompileOptions::default(), InvokeOptions::default())
    }

    /// Host over `refs` with explicit options
    pub fn with_options(
        refs: ReferenceSet,
        compile_options: CompileOptions,
        invoke_options: InvokeOptions,
    ) -> Result<Self> {
        if compile_options.entry_method != invoke_options.entry_method {
            tracing::warn!(
                compile = %compile_options.entry_method,
                invoke = %invoke_options.entry_method,
                "compile and invoke options name different entry methods"
            );
        }
        Ok(ScriptHost {
            loader: LoadContext::new(&refs),
            compiler: Compiler::new(compile_options),
            invoker: Invoker::new(invoke_options)?,
            refs,
        })
    }

    /// Reference set every stage uses
    pub fn references(&self) -> &ReferenceSet {
        &self.refs
    }

    /// Compiles `source` under a freshly generated library name
    pub fn compile(&self, source: &SourceUnit) -> Result<(String, CompilationResult)> {
        let library_name = format!("script_{}", Uuid::new_v4().simple());
        let result = self.compiler.compile(source, &self.refs, &library_name)?;
        Ok((library_name, result))
    }

    /// Loads a binary produced by [`compile`](Self::compile)
    pub fn load(&self, binary: &[u8]) -> Result<ExportedType> {
        Ok(self.loader.load(binary)?)
    }

    /// Invokes a loaded type
    pub fn invoke(&self, entry: &ExportedType, bag: &DependencyBag) -> ExecutionOutcome {
        self.invoker.invoke(entry, bag)
    }

    /// Units loaded by this host that are still resident
    pub fn live_units(&self) -> usize {
        self.loader.live_units()
    }

    /// Runs all stages; a compilation failure skips loading and invocation
    ///
    /// `Err` is returned only for conditions outside both failure domains, such as
    /// a compiled image that cannot be loaded.
    pub fn run(&self, source: &SourceUnit, bag: &DependencyBag) -> Result<RunReport> {
        let (library_name, compilation) = self.compile(source)?;

        for diagnostic in compilation.diagnostics() {
            tracing::debug!(
                library = %library_name,
                id = %diagnostic.id,
                severity = %diagnostic.severity,
                escalated = diagnostic.is_warning_as_error,
                "{}",
                diagnostic.message
            );
        }

        let Some(binary) = compilation.binary() else {
            tracing::info!(library = %library_name, "compilation failed; nothing to run");
            return Ok(RunReport {
                library_name,
                compilation,
                outcome: None,
            });
        };

        let entry = self.load(binary)?;
        let outcome = self.invoke(&entry, bag);
        drop(entry);

        Ok(RunReport {
            library_name,
            compilation,
            outcome: Some(outcome),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::report::{COMPILATION_FAILED, EXECUTION_SUCCEEDED};

    #[test]
    fn test_run_reports_both_stages() {
        let host = ScriptHost::new(ReferenceSet::standard()).unwrap();
        let report = host
            .run(
                &SourceUnit::new(
                    "(defclass Script (deps) (defmethod process () (. deps message)))",
                ),
                &DependencyBag::new().with("message", "HELLO!"),
            )
            .unwrap();

        assert!(report.is_success());
        assert!(report.library_name.starts_with("script_"));
        assert_eq!(report.execution_report().unwrap().headline(), EXECUTION_SUCCEEDED);
        assert_eq!(host.live_units(), 0);
    }

    #[test]
    fn test_compilation_failure_skips_invocation() {
        let host = ScriptHost::new(ReferenceSet::standard()).unwrap();
        let report = host
            .run(&SourceUnit::new("(defclass Script"), &DependencyBag::new())
            .unwrap();

        assert!(!report.is_success());
        assert!(report.outcome.is_none());
        assert_eq!(report.compilation_report().headline(), COMPILATION_FAILED);
    }
}
