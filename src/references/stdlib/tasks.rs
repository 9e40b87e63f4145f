//! Task functions - delays and task combinators

use futures_util::future::join_all;
use std::time::Duration;

use super::arg_count;
use crate::references::{Builtin, Library};
use crate::runtime::{Exception, ExceptionKind, Task, Value};

/// Register all task functions
pub fn register(library: &mut Library) {
    library.register(DelayBuiltin);
    library.register(CompletedBuiltin);
    library.register(AllBuiltin);
}

/// delay - Task that completes after the given number of milliseconds
pub struct DelayBuiltin;

impl Builtin for DelayBuiltin {
    fn name(&self) -> &str {
        "delay"
    }

    fn description(&self) -> &str {
        "Create a task that completes after a delay in milliseconds"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let [millis] = args else {
            return Err(arg_count("delay", "1", args.len()));
        };
        let millis = u64::try_from(millis.as_int()?).map_err(|_| {
            Exception::of(ExceptionKind::ArgumentError, "delay expects a non-negative duration")
        })?;

        Ok(Value::Task(Task::new(async move {
            tokio::time::sleep(Duration::from_millis(millis)).await;
            Ok(Value::Null)
        })))
    }

    fn arity(&self) -> Option<(usize, usize)> {
        Some((1, 1))
    }
}

/// completed - Task that has already produced a value
pub struct CompletedBuiltin;

impl Builtin for CompletedBuiltin {
    fn name(&self) -> &str {
        "completed"
    }

    fn description(&self) -> &str {
        "Create an already completed task"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let value = match args {
            [] => Value::Null,
            [value] => value.clone(),
            _ => return Err(arg_count("completed", "0 or 1", args.len())),
        };
        Ok(Value::Task(Task::completed(value)))
    }

    fn arity(&self) -> Option<(usize, usize)> {
        Some((0, 1))
    }
}

/// all - Task that waits for every argument task and yields their results
pub struct AllBuiltin;

impl Builtin for AllBuiltin {
    fn name(&self) -> &str {
        "all"
    }

    fn description(&self) -> &str {
        "Wait for all tasks; fails with the first failure in argument order"
    }

    fn call(&self, args: &[Value]) -> Result<Value, Exception> {
        let tasks = args
            .iter()
            .map(|arg| match arg {
                Value::Task(task) => Ok(task.clone()),
                other => Err(Exception::type_mismatch("task", &other.type_name())),
            })
            .collect::<Result<Vec<_>, _>>()?;

        Ok(Value::Task(Task::new(async move {
            let results = join_all(tasks.iter().map(|t| t.wait())).await;
            let values = results.into_iter().collect::<Result<Vec<_>, _>>()?;
            Ok(Value::array(values))
        })))
    }
}
