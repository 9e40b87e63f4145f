//! Runtime execution for compiled script units
//!
//! Values, the dependency bag, host objects and tasks are the data compiled code
//! works with. The [`Invoker`] drives the bytecode machine and turns failures into
//! cause chains.

mod bag;
mod exception;
mod host;
mod invoker;
mod machine;
mod task;
mod value;

pub use bag::DependencyBag;
pub use exception::{CauseFrame, Exception, ExceptionKind};
pub use host::HostObject;
pub use invoker::{
    ExecutionOutcome, InvokeOptions, Invoker, OutcomeSummary, DEFAULT_MAX_CALL_DEPTH,
};
pub use task::{Task, TaskFuture};
pub use value::{Instance, Value};
