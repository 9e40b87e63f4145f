//! Asynchronous completion handles
//!
//! A [`Task`] wraps a future produced by a builtin or a host object. Futures are lazy:
//! nothing runs until the invoker blocks on the task, either through an `await` form,
//! because the entry method returned it, or while draining unawaited tasks at the end
//! of an invocation.

use futures_util::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::fmt;
use std::future::Future;
use std::sync::Arc;

use super::exception::Exception;
use super::value::Value;

/// Boxed future driven by a task
pub type TaskFuture = BoxFuture<'static, Result<Value, Exception>>;

enum TaskState {
    Pending(Shared<TaskFuture>),
    Completed(Result<Value, Exception>),
}

/// Shared handle to an asynchronous operation
///
/// Any number of waiters may await the same task concurrently; the underlying
/// future is polled once on their behalf and each receives a clone of its result.
#[derive(Clone)]
pub struct Task {
    state: Arc<Mutex<TaskState>>,
}

impl Task {
    /// Wraps a future; it is not polled until the task is awaited
    pub fn new<F>(future: F) -> Self
    where
        F: Future<Output = Result<Value, Exception>> + Send + 'static,
    {
        let future: TaskFuture = future.boxed();
        Task::from_state(TaskState::Pending(future.shared()))
    }

    /// A task that has already produced `value`
    pub fn completed(value: Value) -> Self {
        Task::from_state(TaskState::Completed(Ok(value)))
    }

    /// A task that has already failed
    pub fn failed(exception: Exception) -> Self {
        Task::from_state(TaskState::Completed(Err(exception)))
    }

    fn from_state(state: TaskState) -> Self {
        Task {
            state: Arc::new(Mutex::new(state)),
        }
    }

    /// True once the task has produced a result
    pub fn is_completed(&self) -> bool {
        matches!(*self.state.lock(), TaskState::Completed(_))
    }

    /// Result of a completed task
    pub fn result(&self) -> Option<Result<Value, Exception>> {
        match &*self.state.lock() {
            TaskState::Completed(result) => Some(result.clone()),
            TaskState::Pending(_) => None,
        }
    }

    /// Drives the task to completion; later waits return the stored result
    pub async fn wait(&self) -> Result<Value, Exception> {
        let shared = match &*self.state.lock() {
            TaskState::Completed(result) => return result.clone(),
            TaskState::Pending(shared) => shared.clone(),
        };

        let result = shared.await;

        let mut state = self.state.lock();
        // Abandoned while this waiter was suspended
        if let TaskState::Completed(stored) = &*state {
            return stored.clone();
        }
        *state = TaskState::Completed(result.clone());
        result
    }

    /// Records `exception` as the result of a task whose wait was abandoned
    pub(crate) fn abandon(&self, exception: Exception) {
        let mut state = self.state.lock();
        if !matches!(*state, TaskState::Completed(_)) {
            *state = TaskState::Completed(Err(exception));
        }
    }

    /// True when both handles refer to the same operation
    pub fn ptr_eq(&self, other: &Task) -> bool {
        Arc::ptr_eq(&self.state, &other.state)
    }
}

impl fmt::Debug for Task {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let status = match &*self.state.lock() {
            TaskState::Pending(_) => "pending",
            TaskState::Completed(Ok(_)) => "completed",
            TaskState::Completed(Err(_)) => "failed",
        };
        write!(f, "Task({})", status)
    }
}
