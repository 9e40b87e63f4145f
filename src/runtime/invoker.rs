//! Construct-and-invoke boundary
//!
//! The invoker is where run-time failures stop. Whatever a constructor, entry
//! method, builtin or host object raises comes back as an [`ExecutionOutcome`]
//! carrying the full cause chain; nothing inside compiled code can make `invoke`
//! panic or return early.

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use std::time::{Duration, Instant};
use tokio::runtime::{Builder, Runtime};

use super::bag::DependencyBag;
use super::exception::{CauseFrame, Exception, ExceptionKind};
use super::machine::Machine;
use super::value::{Instance, Value};
use crate::compiler::DEFAULT_ENTRY_METHOD;
use crate::loader::ExportedType;
use crate::Result;

/// Default limit on nested method calls
pub const DEFAULT_MAX_CALL_DEPTH: usize = 256;

/// Invocation options
#[derive(Debug, Clone)]
pub struct InvokeOptions {
    /// Name of the public parameterless method to call
    pub entry_method: String,
    /// Deadline for construction, the call and any awaited tasks
    pub timeout: Option<Duration>,
    /// Maximum depth of nested method calls
    pub max_call_depth: usize,
}

impl Default for InvokeOptions {
    fn default() -> Self {
        Self {
            entry_method: DEFAULT_ENTRY_METHOD.to_string(),
            timeout: None,
            max_call_depth: DEFAULT_MAX_CALL_DEPTH,
        }
    }
}

impl InvokeOptions {
    /// Entry method name
    pub fn entry_method(mut self, name: impl Into<String>) -> Self {
        self.entry_method = name.into();
        self
    }

    /// Invocation deadline
    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// Call depth limit
    pub fn max_call_depth(mut self, depth: usize) -> Self {
        self.max_call_depth = depth;
        self
    }
}

/// Result of one invocation
#[derive(Debug, Clone, PartialEq)]
pub enum ExecutionOutcome {
    /// The entry method completed
    Success {
        /// Value it produced, after awaiting
        result: Value,
    },
    /// Something raised an exception
    Failure {
        /// Flattened causes, outermost first
        cause_chain: Vec<CauseFrame>,
    },
}

impl ExecutionOutcome {
    /// True on success
    pub fn is_success(&self) -> bool {
        matches!(self, ExecutionOutcome::Success { .. })
    }

    /// Produced value on success
    pub fn result(&self) -> Option<&Value> {
        match self {
            ExecutionOutcome::Success { result } => Some(result),
            ExecutionOutcome::Failure { .. } => None,
        }
    }

    /// Cause chain; empty on success
    pub fn cause_chain(&self) -> &[CauseFrame] {
        match self {
            ExecutionOutcome::Success { .. } => &[],
            ExecutionOutcome::Failure { cause_chain } => cause_chain,
        }
    }

    /// Outermost failure, if any
    pub fn outermost(&self) -> Option<&CauseFrame> {
        self.cause_chain().first()
    }
}

/// Serializable view of an outcome, for hosts that log outcomes as JSON
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OutcomeSummary {
    /// True on success
    pub success: bool,
    /// Display form of the produced value
    pub result: Option<String>,
    /// Cause chain, outermost first
    pub cause_chain: Vec<CauseFrame>,
}

impl From<&ExecutionOutcome> for OutcomeSummary {
    fn from(outcome: &ExecutionOutcome) -> Self {
        OutcomeSummary {
            success: outcome.is_success(),
            result: outcome.result().map(|v| v.to_string()),
            cause_chain: outcome.cause_chain().to_vec(),
        }
    }
}

/// Constructs entry types and calls their entry method
///
/// Tasks are driven by a private current-thread runtime, so `invoke` blocks and
/// must not be called from inside another tokio runtime.
pub struct Invoker {
    options: InvokeOptions,
    runtime: Runtime,
}

impl Invoker {
    /// Creates an invoker with its own current-thread task runtime
    pub fn new(options: InvokeOptions) -> Result<Self> {
        let runtime = Builder::new_current_thread().enable_time().build()?;
        Ok(Invoker { options, runtime })
    }

    /// Options in effect
    pub fn options(&self) -> &InvokeOptions {
        &self.options
    }

    /// Constructs `entry` with `bag` and calls its entry method
    pub fn invoke(&self, entry: &ExportedType, bag: &DependencyBag) -> ExecutionOutcome {
        let started = Instant::now();
        match self.run(entry, bag) {
            Ok(result) => {
                tracing::info!(
                    type_name = %entry.name(),
                    method = %self.options.entry_method,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    "invocation succeeded"
                );
                ExecutionOutcome::Success { result }
            }
            Err(exception) => {
                tracing::warn!(
                    type_name = %entry.name(),
                    method = %self.options.entry_method,
                    elapsed_ms = started.elapsed().as_millis() as u64,
                    error = %exception,
                    depth = exception.depth(),
                    "invocation failed"
                );
                ExecutionOutcome::Failure {
                    cause_chain: exception.chain(),
                }
            }
        }
    }

    fn run(
        &self,
        entry: &ExportedType,
        bag: &DependencyBag,
    ) -> std::result::Result<Value, Exception> {
        let mut machine = Machine::new(
            &self.runtime,
            self.options.timeout,
            self.options.max_call_depth,
        );
        let instance = machine.construct(entry, bag)?;
        let result = self.call_entry(&mut machine, entry, &instance);
        instance.release_fields();
        result
    }

    fn call_entry(
        &self,
        machine: &mut Machine<'_>,
        entry: &ExportedType,
        instance: &Arc<Instance>,
    ) -> std::result::Result<Value, Exception> {
        let name = &self.options.entry_method;
        let index = entry
            .method(name)
            .filter(|(_, method)| method.public && method.arity == 0)
            .map(|(index, _)| index)
            .ok_or_else(|| {
                Exception::of(
                    ExceptionKind::EntryPointNotFound,
                    format!(
                        "Type '{}' does not define a public parameterless method '{}'",
                        entry.name(),
                        name
                    ),
                )
            })?;

        let result = match machine.call(instance, index, Vec::new())? {
            Value::Task(task) => machine.wait(&task)?,
            other => other,
        };
        machine.drain()?;
        Ok(result)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::compiler::{CompileOptions, Compiler, SourceUnit};
    use crate::loader::LoadContext;
    use crate::references::ReferenceSet;

    fn load(source: &str) -> ExportedType {
        let refs = ReferenceSet::standard();
        let result = Compiler::new(CompileOptions::default())
            .compile(&SourceUnit::new(source), &refs, "invoker_test")
            .unwrap();
        assert!(result.is_success(), "{:?}", result.diagnostics());
        LoadContext::new(&refs).load(result.binary().unwrap()).unwrap()
    }

    fn invoke(source: &str, bag: DependencyBag) -> ExecutionOutcome {
        Invoker::new(InvokeOptions::default())
            .unwrap()
            .invoke(&load(source), &bag)
    }

    #[test]
    fn test_returns_entry_value() {
        let outcome = invoke(
            "(defclass Script (deps) (defmethod process () (+ (. deps n) 1)))",
            DependencyBag::new().with("n", 41),
        );
        assert_eq!(outcome.result(), Some(&Value::Int(42)));
        assert!(outcome.cause_chain().is_empty());
    }

    #[test]
    fn test_missing_entry_method_is_structured_failure() {
        let entry =
            load("(defclass Script (deps) (defmethod process () 1) (defmethod- hidden () 2))");
        let invoker = Invoker::new(InvokeOptions::default().entry_method("hidden")).unwrap();
        let outcome = invoker.invoke(&entry, &DependencyBag::new());
        assert_eq!(outcome.cause_chain().len(), 1);
        assert_eq!(outcome.outermost().unwrap().type_name, "EntryPointNotFound");
    }

    #[test]
    fn test_try_catch_and_rethrow_with_cause() {
        let outcome = invoke(
            r#"
            (defclass Script (deps)
              (defmethod process ()
                (try
                  (. deps missing)
                  (catch e (throw (error "Wrapped" "lookup failed" e))))))
            "#,
            DependencyBag::new(),
        );
        let chain = outcome.cause_chain();
        assert_eq!(chain.len(), 2);
        assert_eq!(chain[0], CauseFrame::new("Wrapped", "lookup failed"));
        assert_eq!(chain[1].type_name, "MemberNotFound");
    }

    #[test]
    fn test_recursion_limit() {
        let entry = load(
            "(defclass Script (deps)
               (defmethod process () (call self down 0))
               (defmethod- down (n) (call self down (+ n 1))))",
        );
        let invoker = Invoker::new(InvokeOptions::default().max_call_depth(32)).unwrap();
        let outcome = invoker.invoke(&entry, &DependencyBag::new());
        assert_eq!(outcome.outermost().unwrap().type_name, "StackOverflow");
    }

    #[test]
    fn test_outcome_summary_serializes() {
        let outcome = invoke(
            r#"(defclass Script (deps) (defmethod process () (throw "bad")))"#,
            DependencyBag::new(),
        );
        let summary = OutcomeSummary::from(&outcome);
        let json = serde_json::to_string(&summary).unwrap();
        assert!(json.contains("\"type_name\":\"Exception\""));
        assert!(!summary.success);
    }
}
